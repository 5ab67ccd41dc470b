//! Display sinks for received frames.
//!
//! The engine hands each decoded planar frame to a [`DisplaySink`];
//! the actual pixel-blit / window-management calls live behind this
//! seam. The in-crate [`TraceSink`] is the headless implementation
//! used by default and in tests.

use tracing::{debug, trace};

use crate::error::CastError;
use crate::frame::FrameGeometry;

/// Consumer-side renderer seam.
///
/// `present` is a pass-through: it trusts the fixed frame geometry
/// negotiated at setup and performs no validation beyond what the
/// concrete sink needs.
pub trait DisplaySink: Send {
    /// Acquire rendering resources for the fixed resolution. A
    /// failure here is fatal before streaming starts.
    fn open(&mut self, geometry: FrameGeometry) -> Result<(), CastError>;

    /// Render one planar YUV 4:2:0 frame.
    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<(), CastError>;

    /// Release rendering resources.
    fn close(&mut self);
}

// ── TraceSink ────────────────────────────────────────────────────

/// Headless sink: counts frames and logs them at trace level.
#[derive(Debug, Default)]
pub struct TraceSink {
    frames: u64,
    opened: bool,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented since `open`.
    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}

impl DisplaySink for TraceSink {
    fn open(&mut self, geometry: FrameGeometry) -> Result<(), CastError> {
        debug!(%geometry, "trace sink open");
        self.opened = true;
        self.frames = 0;
        Ok(())
    }

    fn present(&mut self, frame: &[u8], geometry: FrameGeometry) -> Result<(), CastError> {
        if !self.opened {
            return Err(CastError::Display("sink not open".into()));
        }
        self.frames += 1;
        trace!(
            frame = self.frames,
            bytes = frame.len(),
            %geometry,
            "frame presented"
        );
        Ok(())
    }

    fn close(&mut self) {
        debug!(frames = self.frames, "trace sink closed");
        self.opened = false;
    }
}

// ── Tests ────────────────────────────────────────────────────────
