//! Run-controller plumbing shared by both roles.
//!
//! Provides the `Setup → Streaming → Teardown` phase machine with
//! validated transitions, and the cancellation wrapper that threads a
//! `CancellationToken` through every blocking primitive of the
//! streaming loop so shutdown can unwind cleanly from any suspension
//! point.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::CastError;

// ── StreamPhase ──────────────────────────────────────────────────

/// Lifecycle phase of one streaming run.
///
/// ```text
///  Setup ──► Streaming ──► Teardown
///    │                        ▲
///    └────────────────────────┘   (setup failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// Connection establishment, handshake, buffer carving.
    #[default]
    Setup,
    /// The per-frame sync/transfer/completion loop is live.
    Streaming,
    /// Resources are being released. Terminal.
    Teardown,
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "Setup"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Teardown => write!(f, "Teardown"),
        }
    }
}

impl StreamPhase {
    /// Transition to `Streaming`. Valid from: `Setup`.
    pub fn begin_streaming(&mut self) -> Result<(), CastError> {
        match self {
            Self::Setup => {
                *self = Self::Streaming;
                Ok(())
            }
            _ => Err(CastError::ProtocolViolation(
                "cannot start streaming: not in Setup phase",
            )),
        }
    }

    /// Transition to `Teardown`. Valid from: `Setup` (failure before
    /// streaming), `Streaming`.
    pub fn begin_teardown(&mut self) -> Result<(), CastError> {
        match self {
            Self::Setup | Self::Streaming => {
                *self = Self::Teardown;
                Ok(())
            }
            _ => Err(CastError::ProtocolViolation(
                "cannot tear down: already in Teardown phase",
            )),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

// ── Cancellation ─────────────────────────────────────────────────

/// Await `fut`, unwinding with [`CastError::Cancelled`] the moment
/// `cancel` fires. Every suspension point in the streaming loops —
/// barrier exchange, completion waits, the paced sleep, the frame
/// read — goes through here.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, CastError>
where
    F: Future<Output = Result<T, CastError>>,
{
    tokio::select! {
        res = fut => res,
        _ = cancel.cancelled() => Err(CastError::Cancelled),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = StreamPhase::default();
        assert_eq!(phase, StreamPhase::Setup);

        phase.begin_streaming().unwrap();
        assert!(phase.is_streaming());

        phase.begin_teardown().unwrap();
        assert_eq!(phase, StreamPhase::Teardown);
    }

    #[test]
    fn setup_failure_goes_straight_to_teardown() {
        let mut phase = StreamPhase::Setup;
        phase.begin_teardown().unwrap();
        assert_eq!(phase, StreamPhase::Teardown);
    }

    #[test]
    fn invalid_transitions_rejected() {
        let mut phase = StreamPhase::Teardown;
        assert!(phase.begin_streaming().is_err());
        assert!(phase.begin_teardown().is_err());

        let mut phase = StreamPhase::Streaming;
        assert!(phase.begin_streaming().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(StreamPhase::Setup.to_string(), "Setup");
        assert_eq!(StreamPhase::Streaming.to_string(), "Streaming");
        assert_eq!(StreamPhase::Teardown.to_string(), "Teardown");
    }

    #[tokio::test]
    async fn cancellable_passes_results_through() {
        let token = CancellationToken::new();
        let out = cancellable(&token, async { Ok::<_, CastError>(41) }).await;
        assert_eq!(out.unwrap(), 41);
    }

    #[tokio::test]
    async fn cancellable_unwinds_blocked_futures() {
        let token = CancellationToken::new();
        token.cancel();

        let out = cancellable(&token, async {
            // Would block forever without cancellation.
            std::future::pending::<Result<(), CastError>>().await
        })
        .await;
        assert!(matches!(out, Err(CastError::Cancelled)));
    }
}
