//! Streamer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use framecast_core::frame::FrameGeometry;
use framecast_core::session::StreamSettings;
use framecast_core::transfer::TransferMode;

/// Top-level configuration for the streamer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Frame geometry and source.
    pub video: VideoConfig,
    /// Transfer mode and timing.
    pub stream: StreamConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port the responder listens on.
    pub listen_port: u16,
    /// Initiator connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Frame geometry and source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Path to the looping raw YUV 4:2:0 frame file (producer role).
    pub source: String,
}

/// Transfer mode and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Transfer primitive: "message" or "write".
    pub mode: TransferMode,
    /// Paced producer target in frames per second (message mode;
    /// 0 = uncapped).
    pub target_fps: u32,
    /// FPS report window in seconds (consumer role).
    pub fps_window_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            video: VideoConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 7430,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            source: "frames.yuv".into(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::Message,
            target_fps: 1,
            fps_window_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CastConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The stream parameters this configuration describes.
    pub fn settings(&self) -> StreamSettings {
        StreamSettings {
            geometry: FrameGeometry::new(self.video.width, self.video.height),
            mode: self.stream.mode,
            target_fps: self.stream.target_fps,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = CastConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen_port"));
        assert!(text.contains("mode = \"message\""));
        assert!(text.contains("width"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = CastConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: CastConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.video.width, 1920);
        assert_eq!(parsed.stream.mode, TransferMode::Message);
        assert_eq!(parsed.stream.fps_window_secs, 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: CastConfig = toml::from_str(
            r#"
            [stream]
            mode = "write"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.stream.mode, TransferMode::Write);
        assert_eq!(parsed.network.listen_port, 7430);
        assert_eq!(parsed.video.height, 1080);
    }

    #[test]
    fn settings_match_video_section() {
        let cfg = CastConfig::default();
        let settings = cfg.settings();
        assert_eq!(settings.geometry.frame_len(), 3_110_400);
        assert_eq!(settings.target_fps, 1);
    }
}
