//! Per-frame two-party rendezvous.
//!
//! Before each transfer, both peers exchange a round token and block
//! until they have both sent their own and received the peer's. The
//! producer's next write into the shared buffer therefore
//! happens-after the consumer finished reading the previous frame,
//! and vice versa. Mandatory in remote-write mode, where the reader's
//! completion is only a proxy signal.

use tracing::trace;

use crate::error::CastError;
use crate::fabric::TcpFabric;

/// Two-party rendezvous executed once per frame.
///
/// Both sides count rounds locally; the tokens carry the round number
/// so a skewed iteration is detected instead of silently corrupting
/// the fixed-offset buffer protocol.
#[derive(Debug, Default)]
pub struct SyncBarrier {
    round: u64,
}

impl SyncBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounds completed so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Execute one rendezvous: send our token, wait for the peer's,
    /// verify the rounds agree. Any transport failure is fatal — a
    /// half-finished rendezvous leaves buffer safety undefined.
    pub async fn rendezvous(&mut self, fabric: &mut TcpFabric) -> Result<u64, CastError> {
        self.round += 1;
        fabric.send_sync(self.round).await?;
        let peer = fabric.recv_sync().await?;
        if peer != self.round {
            return Err(CastError::ProtocolViolation("sync round mismatch"));
        }
        trace!(round = self.round, "rendezvous complete");
        Ok(self.round)
    }
}

// ── Tests ────────────────────────────────────────────────────────
