//! Producer-side streaming loop.
//!
//! Repeats {rendezvous → read frame → issue transfer → completion
//! wait → pace} until cancelled or a fatal error. Frame `N+1` is
//! never issued before frame `N+1`'s rendezvous and frame `N`'s
//! completion have both resolved — the single shared buffer has no
//! double-buffering margin, so this ordering is the whole game.

use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::barrier::SyncBarrier;
use crate::error::CastError;
use crate::fabric::TcpFabric;
use crate::pace::RateGovernor;
use crate::run::cancellable;
use crate::session::Session;
use crate::source::FrameSource;
use crate::transfer::{self, TransferMode, TransferStrategy};

/// The sending half of a streaming connection.
pub struct FrameProducer {
    session: Session,
    fabric: TcpFabric,
    strategy: Box<dyn TransferStrategy>,
    barrier: SyncBarrier,
    source: Box<dyn FrameSource>,
    /// Message mode paces to the target rate; remote-write mode
    /// free-runs on completion backpressure.
    governor: Option<RateGovernor>,
    cancel: CancellationToken,
    frames_sent: u64,
}

impl FrameProducer {
    /// Build the producer for an established session.
    pub fn new(
        session: Session,
        fabric: TcpFabric,
        source: Box<dyn FrameSource>,
        cancel: CancellationToken,
    ) -> Self {
        let strategy = transfer::strategy_for(session.mode, session.payload_offset() as u64);
        let governor = match session.mode {
            TransferMode::Message => Some(RateGovernor::new(session.target_fps)),
            TransferMode::Write => None,
        };
        Self {
            session,
            fabric,
            strategy,
            barrier: SyncBarrier::new(),
            source,
            governor,
            cancel,
            frames_sent: 0,
        }
    }

    /// Frames fully transferred (issued and completed).
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Stream until cancellation or a fatal error, then tear down.
    /// Cancellation is a clean exit.
    pub async fn run(&mut self) -> Result<(), CastError> {
        self.session.phase.begin_streaming()?;
        info!(mode = %self.session.mode, "producer streaming");

        let result = self.stream().await;

        self.session.phase.begin_teardown()?;
        self.fabric.shutdown().await;

        match result {
            Err(CastError::Cancelled) => {
                info!(frames = self.frames_sent, "producer stopped");
                Ok(())
            }
            other => other,
        }
    }

    async fn stream(&mut self) -> Result<(), CastError> {
        loop {
            // Rendezvous: the consumer is done reading the previous
            // frame, the buffer is safe to overwrite.
            cancellable(&self.cancel, self.barrier.rendezvous(&mut self.fabric)).await?;

            // Fill the outbound slot.
            cancellable(
                &self.cancel,
                self.source.read_frame(self.session.outbound.payload_mut()),
            )
            .await?;

            // Issue the transfer, then block on its completion event.
            let sequence = cancellable(
                &self.cancel,
                self.strategy
                    .send_frame(&mut self.fabric, self.session.outbound.payload()),
            )
            .await?;
            cancellable(
                &self.cancel,
                self.strategy.complete_send(&mut self.fabric, sequence),
            )
            .await?;

            self.frames_sent += 1;
            trace!(sequence, "frame sent");

            if let Some(governor) = &mut self.governor {
                cancellable(&self.cancel, async {
                    governor.pace().await;
                    Ok(())
                })
                .await?;
            }
        }
    }
}
