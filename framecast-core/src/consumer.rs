//! Consumer-side streaming loop.
//!
//! Repeats {rendezvous → completion wait → re-arm receive → present →
//! meter} until cancelled or a fatal error. A completion error is
//! fatal and the sink is never invoked for the failed iteration — a
//! lost frame would desynchronize the fixed-offset buffer protocol.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::barrier::SyncBarrier;
use crate::error::CastError;
use crate::fabric::TcpFabric;
use crate::meter::FpsMeter;
use crate::run::cancellable;
use crate::session::Session;
use crate::sink::DisplaySink;
use crate::transfer::{self, TransferStrategy};

/// The receiving half of a streaming connection.
pub struct FrameConsumer {
    session: Session,
    fabric: TcpFabric,
    strategy: Box<dyn TransferStrategy>,
    barrier: SyncBarrier,
    sink: Box<dyn DisplaySink>,
    meter: FpsMeter,
    cancel: CancellationToken,
}

impl FrameConsumer {
    /// Build the consumer for an established session, reporting
    /// throughput once per `fps_window`.
    pub fn new(
        session: Session,
        fabric: TcpFabric,
        sink: Box<dyn DisplaySink>,
        fps_window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let strategy = transfer::strategy_for(session.mode, session.payload_offset() as u64);
        Self {
            session,
            fabric,
            strategy,
            barrier: SyncBarrier::new(),
            sink,
            meter: FpsMeter::new(fps_window),
            cancel,
        }
    }

    /// Frames received so far.
    pub fn frames_received(&self) -> u64 {
        self.meter.total_frames()
    }

    /// Stream until cancellation or a fatal error, then tear down.
    /// Cancellation is a clean exit.
    pub async fn run(&mut self) -> Result<(), CastError> {
        // Display-init failure aborts before entering Streaming.
        if let Err(e) = self.sink.open(self.session.geometry) {
            self.session.phase.begin_teardown()?;
            self.fabric.shutdown().await;
            return Err(e);
        }

        self.session.phase.begin_streaming()?;
        info!(mode = %self.session.mode, "consumer streaming");

        // Message mode arms the first inbound slot up front.
        if self.strategy.requires_explicit_receive_post() {
            self.strategy.post_receive(&mut self.fabric).await?;
        }

        let result = self.stream().await;

        self.session.phase.begin_teardown()?;
        self.sink.close();
        self.fabric.shutdown().await;

        match result {
            Err(CastError::Cancelled) => {
                info!(frames = self.meter.total_frames(), "consumer stopped");
                Ok(())
            }
            other => other,
        }
    }

    async fn stream(&mut self) -> Result<(), CastError> {
        loop {
            // Rendezvous: tells the producer our buffer is free again.
            cancellable(&self.cancel, self.barrier.rendezvous(&mut self.fabric)).await?;

            // Wait for the frame to land in the inbound slot.
            let sequence = cancellable(
                &self.cancel,
                self.strategy
                    .receive_frame(&mut self.fabric, &mut self.session.inbound),
            )
            .await?;

            // Re-arm before the producer can issue the next frame.
            if self.strategy.requires_explicit_receive_post() {
                self.strategy.post_receive(&mut self.fabric).await?;
            }

            self.sink
                .present(self.session.inbound.payload(), self.session.geometry)?;
            trace!(sequence, "frame received");

            if let Some(fps) = self.meter.record() {
                info!("FPS: {fps:.2} ({} frames total)", self.meter.total_frames());
            }
        }
    }
}
