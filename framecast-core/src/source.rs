//! Looping frame sources.
//!
//! The producer reads fixed-size raw frames from a rewindable byte
//! stream. End-of-stream is never surfaced: the source seeks back to
//! the start (discarding any partial tail) and keeps going. Any other
//! read failure is fatal.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::error::CastError;

/// A producer-side supplier of raw frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Fill `dest` with exactly one frame.
    async fn read_frame(&mut self, dest: &mut [u8]) -> Result<(), CastError>;
}

// ── LoopingFileSource ────────────────────────────────────────────

/// Reads frames sequentially from a file, rewinding at end-of-file.
pub struct LoopingFileSource {
    file: File,
    path: PathBuf,
    frame_len: usize,
    frames_read: u64,
}

impl LoopingFileSource {
    /// Open `path` for frames of `frame_len` bytes.
    ///
    /// A file shorter than one frame can never produce a frame and is
    /// rejected here rather than spinning forever on rewind.
    pub async fn open(path: impl AsRef<Path>, frame_len: usize) -> Result<Self, CastError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| CastError::Setup(format!("open {}: {e}", path.display())))?;

        let meta = file.metadata().await?;
        if (meta.len() as usize) < frame_len {
            return Err(CastError::Setup(format!(
                "{} holds {} bytes, less than one {frame_len}-byte frame",
                path.display(),
                meta.len(),
            )));
        }
        debug!(
            path = %path.display(),
            frames = meta.len() / frame_len as u64,
            "frame source opened"
        );

        Ok(Self {
            file,
            path,
            frame_len,
            frames_read: 0,
        })
    }

    /// Frames handed out so far (across rewinds).
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FrameSource for LoopingFileSource {
    async fn read_frame(&mut self, dest: &mut [u8]) -> Result<(), CastError> {
        debug_assert_eq!(dest.len(), self.frame_len);

        let mut filled = 0;
        while filled < dest.len() {
            let n = self.file.read(&mut dest[filled..]).await?;
            if n == 0 {
                // End of stream: restart from the beginning. A partial
                // tail is discarded and the frame re-read whole.
                self.file.seek(SeekFrom::Start(0)).await?;
                filled = 0;
                continue;
            }
            filled += n;
        }

        self.frames_read += 1;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_LEN: usize = 32;

    /// Write a file of `frames` frames where every byte of frame `i`
    /// equals `i`.
    async fn frame_file(name: &str, frames: u8) -> PathBuf {
        let path = std::env::temp_dir().join(format!("framecast-src-{name}-{}", std::process::id()));
        let mut data = Vec::with_capacity(frames as usize * FRAME_LEN);
        for i in 0..frames {
            data.extend(std::iter::repeat_n(i, FRAME_LEN));
        }
        tokio::fs::write(&path, &data).await.unwrap();
        path
    }

    #[tokio::test]
    async fn wraps_around_losslessly() {
        let path = frame_file("wrap", 3).await;
        let mut source = LoopingFileSource::open(&path, FRAME_LEN).await.unwrap();

        let mut dest = [0u8; FRAME_LEN];
        // k = 7 frames from an m = 3 frame file: 0 1 2 0 1 2 0.
        let expected = [0u8, 1, 2, 0, 1, 2, 0];
        for &want in &expected {
            source.read_frame(&mut dest).await.unwrap();
            assert!(dest.iter().all(|&b| b == want), "expected frame {want}");
        }
        assert_eq!(source.frames_read(), 7);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn partial_tail_is_discarded() {
        let path = frame_file("tail", 2).await;
        // Append half a frame of sentinel bytes.
        let mut data = tokio::fs::read(&path).await.unwrap();
        data.extend(std::iter::repeat_n(0xEEu8, FRAME_LEN / 2));
        tokio::fs::write(&path, &data).await.unwrap();

        let mut source = LoopingFileSource::open(&path, FRAME_LEN).await.unwrap();
        let mut dest = [0u8; FRAME_LEN];

        // 0, 1, then the partial tail is skipped and we wrap to 0.
        for want in [0u8, 1, 0] {
            source.read_frame(&mut dest).await.unwrap();
            assert!(
                dest.iter().all(|&b| b == want),
                "expected frame {want}, got {:?}",
                &dest[..4],
            );
        }

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn file_shorter_than_one_frame_rejected() {
        let path = std::env::temp_dir().join(format!("framecast-src-short-{}", std::process::id()));
        tokio::fs::write(&path, [0u8; FRAME_LEN / 2]).await.unwrap();

        let result = LoopingFileSource::open(&path, FRAME_LEN).await;
        assert!(matches!(result, Err(CastError::Setup(_))));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_a_setup_failure() {
        let result =
            LoopingFileSource::open("/nonexistent/framecast/frames.yuv", FRAME_LEN).await;
        assert!(matches!(result, Err(CastError::Setup(_))));
    }
}
