//! Completion-sequenced transfer strategies.
//!
//! The engine moves one fixed-size frame per iteration using either
//! message-passing or remote-memory-write semantics. The strategy is
//! selected once at setup; both variants share the same sequencing
//! contract: `send_frame` returns after issuing, `complete_send`
//! blocks until the matching completion event, and a failed transfer
//! terminates the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CastError;
use crate::fabric::TcpFabric;
use crate::frame::FrameBuffer;
use crate::sequence::SequenceId;

// ── TransferMode ─────────────────────────────────────────────────

/// Which transfer primitive carries frame payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Explicit send/receive message pairs.
    Message,
    /// Remote writes into the consumer's registered region.
    Write,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Write => write!(f, "write"),
        }
    }
}

impl std::str::FromStr for TransferMode {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "message" | "msg" => Ok(Self::Message),
            "write" | "rma" => Ok(Self::Write),
            _ => Err(CastError::Setup(format!("unknown transfer mode: {s}"))),
        }
    }
}

// ── TransferStrategy ─────────────────────────────────────────────

/// One frame-transfer capability, chosen once at connection setup.
#[async_trait]
pub trait TransferStrategy: Send {
    /// Issue one outbound operation for the frame payload. Returns
    /// immediately after issuing with the assigned sequence id.
    async fn send_frame(
        &mut self,
        fabric: &mut TcpFabric,
        payload: &[u8],
    ) -> Result<SequenceId, CastError>;

    /// Block until the operation identified by `sequence` completes.
    async fn complete_send(
        &mut self,
        fabric: &mut TcpFabric,
        sequence: SequenceId,
    ) -> Result<(), CastError>;

    /// Arm one inbound slot ahead of the next frame. No-op when the
    /// transport delivers writes without a receive action.
    async fn post_receive(&mut self, fabric: &mut TcpFabric) -> Result<(), CastError>;

    /// Block until the next frame has landed in `buffer` and return
    /// its inbound sequence id.
    async fn receive_frame(
        &mut self,
        fabric: &mut TcpFabric,
        buffer: &mut FrameBuffer,
    ) -> Result<SequenceId, CastError>;

    /// Whether the consumer must post a receive for every frame.
    fn requires_explicit_receive_post(&self) -> bool;

    fn mode(&self) -> TransferMode;
}

/// Build the strategy for `mode`. `payload_offset` is where frame
/// payloads live inside the registered buffer region (both sides
/// carve the same prefix).
pub fn strategy_for(mode: TransferMode, payload_offset: u64) -> Box<dyn TransferStrategy> {
    match mode {
        TransferMode::Message => Box::new(MessageTransfer),
        TransferMode::Write => Box::new(RemoteWriteTransfer { payload_offset }),
    }
}

// ── MessageTransfer ──────────────────────────────────────────────

/// Send/receive message pairs: the consumer posts one receive per
/// frame and its completion corresponds to actual data arrival.
#[derive(Debug)]
pub struct MessageTransfer;

#[async_trait]
impl TransferStrategy for MessageTransfer {
    async fn send_frame(
        &mut self,
        fabric: &mut TcpFabric,
        payload: &[u8],
    ) -> Result<SequenceId, CastError> {
        fabric.post_send(payload).await
    }

    async fn complete_send(
        &mut self,
        fabric: &mut TcpFabric,
        sequence: SequenceId,
    ) -> Result<(), CastError> {
        fabric.await_tx(sequence).await
    }

    async fn post_receive(&mut self, fabric: &mut TcpFabric) -> Result<(), CastError> {
        fabric.post_recv();
        Ok(())
    }

    async fn receive_frame(
        &mut self,
        fabric: &mut TcpFabric,
        buffer: &mut FrameBuffer,
    ) -> Result<SequenceId, CastError> {
        let sequence = fabric.rx_completed() + 1;
        fabric.await_rx(sequence, buffer.payload_mut()).await?;
        Ok(sequence)
    }

    fn requires_explicit_receive_post(&self) -> bool {
        true
    }

    fn mode(&self) -> TransferMode {
        TransferMode::Message
    }
}

// ── RemoteWriteTransfer ──────────────────────────────────────────

/// Remote writes into the peer's registered region. Only the writer
/// issues operations; the reader advances its own expected-sequence
/// counter and waits on the corresponding completion slot. That
/// completion is a proxy signal, not a data-arrival acknowledgment,
/// which is why the synchronization barrier is mandatory here.
#[derive(Debug)]
pub struct RemoteWriteTransfer {
    payload_offset: u64,
}

#[async_trait]
impl TransferStrategy for RemoteWriteTransfer {
    async fn send_frame(
        &mut self,
        fabric: &mut TcpFabric,
        payload: &[u8],
    ) -> Result<SequenceId, CastError> {
        fabric.post_write(payload, self.payload_offset).await
    }

    async fn complete_send(
        &mut self,
        fabric: &mut TcpFabric,
        sequence: SequenceId,
    ) -> Result<(), CastError> {
        fabric.await_tx(sequence).await
    }

    async fn post_receive(&mut self, _fabric: &mut TcpFabric) -> Result<(), CastError> {
        Ok(())
    }

    async fn receive_frame(
        &mut self,
        fabric: &mut TcpFabric,
        buffer: &mut FrameBuffer,
    ) -> Result<SequenceId, CastError> {
        let sequence = fabric.advance_rx();
        fabric.await_write(sequence, buffer.as_mut_slice()).await?;
        Ok(sequence)
    }

    fn requires_explicit_receive_post(&self) -> bool {
        false
    }

    fn mode(&self) -> TransferMode {
        TransferMode::Write
    }
}

// ── Tests ────────────────────────────────────────────────────────
