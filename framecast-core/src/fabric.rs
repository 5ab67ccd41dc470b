//! Transport collaborator: an endpoint with message-send,
//! remote-write, and completion-wait primitives, emulated over one
//! framed TCP stream.
//!
//! A background writer task drains outbound frames and emits one
//! completion event per sequenced operation once the frame has been
//! flushed (error status if the write failed). A background reader
//! task routes inbound frames to per-kind channels: sync tokens,
//! message data, remote writes, and handshake payloads. The owning
//! thread consumes completions strictly in issue order.
//!
//! Remote-write semantics: the consumer registers its inbound buffer
//! once ([`TcpFabric::register_region`]), the resulting descriptor is
//! exchanged during setup, and every inbound write is validated
//! against it (key, offset, bounds) before being applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::CastError;
use crate::sequence::{SequenceCounter, SequenceId};
use crate::wire::{WireCodec, WireFrame};

// ── Registered regions ───────────────────────────────────────────

/// Descriptor of a peer-accessible buffer region: base address, access
/// key, and length. Exchanged once during setup; immutable for the
/// connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Base of the region in the owner's address space. Writes carry
    /// offsets relative to this base.
    pub base: u64,
    /// Opaque access key; inbound writes must present it.
    pub key: u64,
    /// Region length in bytes. Writes never extend past it.
    pub len: u64,
}

// ── Completion events ────────────────────────────────────────────

/// Outcome reported by a completion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    Ok,
    Error(String),
}

/// Asynchronous notification that a sequenced operation finished.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub sequence: SequenceId,
    pub status: CompletionStatus,
}

/// A remote write observed by the reader task, not yet applied.
#[derive(Debug)]
struct InboundWrite {
    offset: u64,
    key: u64,
    payload: Bytes,
}

/// Handshake payloads routed off the wire.
#[derive(Debug)]
pub enum ControlMsg {
    Hello(Bytes),
    Region(Bytes),
}

enum WriterCmd {
    Sequenced {
        sequence: SequenceId,
        frame: WireFrame,
    },
    Control {
        frame: WireFrame,
        ack: oneshot::Sender<Result<(), String>>,
    },
}

// ── TcpFabric ────────────────────────────────────────────────────

/// One endpoint of the streaming connection.
pub struct TcpFabric {
    writer: mpsc::Sender<WriterCmd>,
    tx_comp: mpsc::Receiver<CompletionEvent>,
    data_rx: mpsc::Receiver<Bytes>,
    write_rx: mpsc::Receiver<InboundWrite>,
    sync_rx: mpsc::Receiver<u64>,
    control_rx: mpsc::Receiver<ControlMsg>,
    tx_seq: SequenceCounter,
    rx_seq: SequenceCounter,
    local_region: Option<RegionDescriptor>,
    remote_region: Option<RegionDescriptor>,
}

impl TcpFabric {
    /// Wrap an established stream and spawn the reader/writer tasks.
    pub fn new(stream: TcpStream) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, WireCodec::new()).split();

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCmd>(64);
        let (tx_comp_tx, tx_comp) = mpsc::channel::<CompletionEvent>(64);
        let (data_tx, data_rx) = mpsc::channel::<Bytes>(8);
        let (write_tx, write_rx) = mpsc::channel::<InboundWrite>(8);
        let (sync_tx, sync_rx) = mpsc::channel::<u64>(8);
        let (control_tx, control_rx) = mpsc::channel::<ControlMsg>(8);

        // Writer task: drains commands, emits one completion per
        // sequenced frame after the flush.
        tokio::spawn(async move {
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCmd::Sequenced { sequence, frame } => {
                        let status = match net_writer.send(frame).await {
                            Ok(()) => CompletionStatus::Ok,
                            Err(e) => CompletionStatus::Error(e.to_string()),
                        };
                        let failed = matches!(status, CompletionStatus::Error(_));
                        if tx_comp_tx
                            .send(CompletionEvent { sequence, status })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        if failed {
                            break;
                        }
                    }
                    WriterCmd::Control { frame, ack } => {
                        let result = net_writer.send(frame).await.map_err(|e| e.to_string());
                        let failed = result.is_err();
                        let _ = ack.send(result);
                        if failed {
                            break;
                        }
                    }
                }
            }
        });

        // Reader task: routes inbound frames to per-kind channels.
        // Dropping the channels on exit surfaces `ChannelClosed` to
        // any pending completion wait.
        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(frame) => {
                        let routed = match frame {
                            WireFrame::Sync { round } => sync_tx.send(round).await.is_ok(),
                            WireFrame::Data { payload } => data_tx.send(payload).await.is_ok(),
                            WireFrame::Write {
                                offset,
                                key,
                                payload,
                            } => write_tx
                                .send(InboundWrite {
                                    offset,
                                    key,
                                    payload,
                                })
                                .await
                                .is_ok(),
                            WireFrame::Hello { body } => {
                                control_tx.send(ControlMsg::Hello(body)).await.is_ok()
                            }
                            WireFrame::Region { body } => {
                                control_tx.send(ControlMsg::Region(body)).await.is_ok()
                            }
                            WireFrame::Goodbye => {
                                debug!("peer sent goodbye");
                                false
                            }
                        };
                        if !routed {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("transport read error: {e}");
                        break;
                    }
                }
            }
        });

        Self {
            writer: writer_tx,
            tx_comp,
            data_rx,
            write_rx,
            sync_rx,
            control_rx,
            tx_seq: SequenceCounter::new(),
            rx_seq: SequenceCounter::new(),
            local_region: None,
            remote_region: None,
        }
    }

    /// Connect to a listening peer, bounded by `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, CastError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| CastError::Timeout(timeout))?
            .map_err(|e| CastError::Setup(format!("connect {addr}: {e}")))?;
        Ok(Self::new(stream))
    }

    // ── Region registration ──────────────────────────────────────

    /// Register the local inbound buffer for remote writes and return
    /// the descriptor to hand to the peer.
    pub fn register_region(&mut self, len: u64) -> RegionDescriptor {
        static NEXT_KEY: AtomicU64 = AtomicU64::new(0xFC01);
        let desc = RegionDescriptor {
            base: 0,
            key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            len,
        };
        self.local_region = Some(desc);
        desc
    }

    /// Record the peer's registered region (from the handshake).
    pub fn set_remote_region(&mut self, desc: RegionDescriptor) {
        self.remote_region = Some(desc);
    }

    pub fn remote_region(&self) -> Option<RegionDescriptor> {
        self.remote_region
    }

    // ── Sequenced transmit ───────────────────────────────────────

    /// Issue one message send. Returns after issuing; completion is
    /// observed via [`await_tx`](Self::await_tx).
    pub async fn post_send(&mut self, payload: &[u8]) -> Result<SequenceId, CastError> {
        let frame = WireFrame::Data {
            payload: Bytes::copy_from_slice(payload),
        };
        self.issue(frame).await
    }

    /// Issue one remote write at `offset` into the peer's registered
    /// region. Never writes past the agreed length.
    pub async fn post_write(&mut self, payload: &[u8], offset: u64) -> Result<SequenceId, CastError> {
        let region = self
            .remote_region
            .ok_or(CastError::ProtocolViolation("no remote region registered"))?;
        let end = offset + payload.len() as u64;
        if end > region.len {
            return Err(CastError::Transfer(format!(
                "write past registered region: {end} > {}",
                region.len,
            )));
        }
        let frame = WireFrame::Write {
            offset,
            key: region.key,
            payload: Bytes::copy_from_slice(payload),
        };
        self.issue(frame).await
    }

    async fn issue(&mut self, frame: WireFrame) -> Result<SequenceId, CastError> {
        let sequence = self.tx_seq.next();
        self.writer
            .send(WriterCmd::Sequenced { sequence, frame })
            .await
            .map_err(|_| CastError::Transfer("transport writer closed".into()))?;
        Ok(sequence)
    }

    /// Block until the operation identified by `sequence` completes.
    /// A completion with error status is fatal; nothing is retried.
    pub async fn await_tx(&mut self, sequence: SequenceId) -> Result<(), CastError> {
        if sequence > self.tx_seq.issued() {
            return Err(CastError::ProtocolViolation("await beyond issued sequence"));
        }
        while self.tx_seq.completed() < sequence {
            let ev = self.tx_comp.recv().await.ok_or(CastError::ChannelClosed)?;
            let done = self.tx_seq.complete();
            if ev.sequence != done {
                return Err(CastError::ProtocolViolation("completion out of order"));
            }
            if let CompletionStatus::Error(reason) = ev.status {
                return Err(CastError::Completion {
                    sequence: ev.sequence,
                    reason,
                });
            }
        }
        Ok(())
    }

    // ── Sequenced receive ────────────────────────────────────────

    /// Arm one inbound message slot (message mode). Awaiting a receive
    /// that was never posted is a protocol violation.
    pub fn post_recv(&mut self) -> SequenceId {
        self.rx_seq.next()
    }

    /// Advance the expected-sequence counter without posting (the
    /// remote-write reader's proxy for data arrival).
    pub fn advance_rx(&mut self) -> SequenceId {
        self.rx_seq.next()
    }

    /// Block until the `sequence`-th inbound message arrives, then
    /// deposit it into `dest`. The payload must fill `dest` exactly.
    pub async fn await_rx(&mut self, sequence: SequenceId, dest: &mut [u8]) -> Result<(), CastError> {
        if sequence > self.rx_seq.issued() {
            return Err(CastError::ProtocolViolation("receive not posted"));
        }
        while self.rx_seq.completed() < sequence {
            let payload = self.data_rx.recv().await.ok_or(CastError::ChannelClosed)?;
            let done = self.rx_seq.complete();
            if payload.len() != dest.len() {
                return Err(CastError::Completion {
                    sequence: done,
                    reason: format!(
                        "unexpected transfer length: {} != {}",
                        payload.len(),
                        dest.len(),
                    ),
                });
            }
            dest.copy_from_slice(&payload);
        }
        Ok(())
    }

    /// Block until the `sequence`-th inbound write arrives, validate
    /// it against the registered region, and apply it to `dest` (the
    /// full registered buffer).
    pub async fn await_write(
        &mut self,
        sequence: SequenceId,
        dest: &mut [u8],
    ) -> Result<(), CastError> {
        if sequence > self.rx_seq.issued() {
            return Err(CastError::ProtocolViolation("write completion not expected"));
        }
        let region = self
            .local_region
            .ok_or(CastError::ProtocolViolation("no local region registered"))?;
        while self.rx_seq.completed() < sequence {
            let w = self.write_rx.recv().await.ok_or(CastError::ChannelClosed)?;
            let done = self.rx_seq.complete();
            if w.key != region.key {
                return Err(CastError::Completion {
                    sequence: done,
                    reason: format!("remote key mismatch: {:#x} != {:#x}", w.key, region.key),
                });
            }
            let end = w.offset + w.payload.len() as u64;
            if end > region.len || end > dest.len() as u64 {
                return Err(CastError::Completion {
                    sequence: done,
                    reason: format!("write outside registered region: {end} > {}", region.len),
                });
            }
            let start = w.offset as usize;
            dest[start..start + w.payload.len()].copy_from_slice(&w.payload);
        }
        Ok(())
    }

    /// Most recently completed inbound sequence.
    pub fn rx_completed(&self) -> u64 {
        self.rx_seq.completed()
    }

    /// Most recently completed outbound sequence.
    pub fn tx_completed(&self) -> u64 {
        self.tx_seq.completed()
    }

    // ── Sync lane ────────────────────────────────────────────────

    /// Send one rendezvous token. Returns once the token is on the
    /// wire; does not consume a data sequence number.
    pub async fn send_sync(&mut self, round: u64) -> Result<(), CastError> {
        self.send_control(WireFrame::Sync { round }).await
    }

    /// Wait for the peer's rendezvous token.
    pub async fn recv_sync(&mut self) -> Result<u64, CastError> {
        self.sync_rx.recv().await.ok_or(CastError::ChannelClosed)
    }

    // ── Handshake lane ───────────────────────────────────────────

    pub async fn send_hello(&mut self, body: Bytes) -> Result<(), CastError> {
        self.send_control(WireFrame::Hello { body }).await
    }

    pub async fn send_region(&mut self, body: Bytes) -> Result<(), CastError> {
        self.send_control(WireFrame::Region { body }).await
    }

    /// Wait for the peer's next handshake payload.
    pub async fn recv_control(&mut self) -> Result<ControlMsg, CastError> {
        self.control_rx.recv().await.ok_or(CastError::ChannelClosed)
    }

    async fn send_control(&mut self, frame: WireFrame) -> Result<(), CastError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.writer
            .send(WriterCmd::Control {
                frame,
                ack: ack_tx,
            })
            .await
            .map_err(|_| CastError::ChannelClosed)?;
        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(CastError::Transfer(reason)),
            Err(_) => Err(CastError::ChannelClosed),
        }
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Best-effort graceful shutdown notice.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.send_control(WireFrame::Goodbye).await {
            debug!("goodbye not delivered: {e}");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    async fn pair() -> (TcpFabric, TcpFabric) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let initiator = tokio::spawn(async move {
            TcpFabric::connect(&addr.to_string(), Duration::from_secs(5))
                .await
                .unwrap()
        });
        let (stream, _) = listener.accept().await.unwrap();
        let responder = TcpFabric::new(stream);
        (initiator.await.unwrap(), responder)
    }

    #[tokio::test]
    async fn message_send_receive_roundtrip() {
        let (mut tx_side, mut rx_side) = pair().await;

        let seq = rx_side.post_recv();
        assert_eq!(seq, 1);

        let sent = tx_side.post_send(b"one raw frame").await.unwrap();
        assert_eq!(sent, 1);
        assert_ok!(tx_side.await_tx(sent).await);

        let mut dest = [0u8; 13];
        assert_ok!(rx_side.await_rx(seq, &mut dest).await);
        assert_eq!(&dest, b"one raw frame");
    }

    #[tokio::test]
    async fn completions_are_strictly_sequenced() {
        let (mut tx_side, mut rx_side) = pair().await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            rx_side.post_recv();
            ids.push(tx_side.post_send(&[0u8; 16]).await.unwrap());
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        // Awaiting the last drains all five in order.
        assert_ok!(tx_side.await_tx(5).await);
        assert_eq!(tx_side.tx_completed(), 5);

        // Awaiting an id that was never issued is a violation.
        assert!(matches!(
            tx_side.await_tx(7).await,
            Err(CastError::ProtocolViolation(_))
        ));

        let mut dest = [0u8; 16];
        for seq in 1..=5 {
            assert_ok!(rx_side.await_rx(seq, &mut dest).await);
        }
        assert_eq!(rx_side.rx_completed(), 5);
    }

    #[tokio::test]
    async fn receive_must_be_posted_first() {
        let (_tx_side, mut rx_side) = pair().await;
        let mut dest = [0u8; 4];
        assert!(matches!(
            rx_side.await_rx(1, &mut dest).await,
            Err(CastError::ProtocolViolation("receive not posted"))
        ));
    }

    #[tokio::test]
    async fn length_mismatch_is_a_completion_error() {
        let (mut tx_side, mut rx_side) = pair().await;

        let seq = rx_side.post_recv();
        tx_side.post_send(b"short").await.unwrap();

        let mut dest = [0u8; 64];
        assert!(matches!(
            rx_side.await_rx(seq, &mut dest).await,
            Err(CastError::Completion { sequence: 1, .. })
        ));
    }

    #[tokio::test]
    async fn sync_lane_roundtrip() {
        let (mut a, mut b) = pair().await;

        a.send_sync(1).await.unwrap();
        b.send_sync(1).await.unwrap();
        assert_eq!(a.recv_sync().await.unwrap(), 1);
        assert_eq!(b.recv_sync().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remote_write_applies_at_offset() {
        let (mut writer, mut reader) = pair().await;

        let mut region = vec![0u8; 96];
        let desc = reader.register_region(region.len() as u64);
        writer.set_remote_region(desc);

        let seq = writer.post_write(b"payload", 64).await.unwrap();
        assert_ok!(writer.await_tx(seq).await);

        let expected = reader.advance_rx();
        assert_ok!(reader.await_write(expected, &mut region).await);
        assert_eq!(&region[64..71], b"payload");
        assert!(region[..64].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn write_past_region_rejected_at_issue() {
        let (mut writer, mut reader) = pair().await;

        let desc = reader.register_region(32);
        writer.set_remote_region(desc);

        assert!(matches!(
            writer.post_write(&[0u8; 16], 20).await,
            Err(CastError::Transfer(_))
        ));
    }

    #[tokio::test]
    async fn write_without_region_is_a_violation() {
        let (mut writer, _reader) = pair().await;
        assert!(matches!(
            writer.post_write(&[0u8; 4], 0).await,
            Err(CastError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn key_mismatch_is_a_completion_error() {
        let (mut writer, mut reader) = pair().await;

        let mut region = vec![0u8; 64];
        let desc = reader.register_region(region.len() as u64);
        // Hand the writer a mangled descriptor.
        writer.set_remote_region(RegionDescriptor {
            key: desc.key ^ 0xFFFF,
            ..desc
        });

        writer.post_write(b"x", 0).await.unwrap();

        let expected = reader.advance_rx();
        assert!(matches!(
            reader.await_write(expected, &mut region).await,
            Err(CastError::Completion { .. })
        ));
    }
}
