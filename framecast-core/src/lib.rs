//! # framecast-core — raw frame streaming engine
//!
//! Streams fixed-size planar YUV 4:2:0 frames between two hosts and
//! renders them on the receiving side. The heart of the crate is the
//! per-frame synchronization/transfer/completion protocol: one shared
//! buffer per direction, a two-party rendezvous before every
//! transfer, and strictly sequenced completion events.
//!
//! ## Architecture
//!
//! ```text
//! INITIATOR (producer)                        RESPONDER (consumer)
//! ┌─────────────────────────┐                ┌──────────────────────┐
//! │ LoopingFileSource       │                │ SyncBarrier          │
//! │   ↓                     │                │   ↓                  │
//! │ SyncBarrier             │    TCP (msg    │ TransferStrategy     │
//! │   ↓                     │    or write)   │   ::receive_frame    │
//! │ TransferStrategy        │ ──────────►    │   ↓                  │
//! │   ::send_frame          │                │ DisplaySink          │
//! │   ↓                     │                │   ↓                  │
//! │ RateGovernor (msg mode) │                │ FpsMeter             │
//! └─────────────────────────┘                └──────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                            |
//! |----------- |----------------------------------------------------|
//! | `frame`    | Frame geometry and the single reusable buffer      |
//! | `wire`     | Framed wire protocol and codec                     |
//! | `sequence` | Per-direction completion sequence counters         |
//! | `fabric`   | Transport endpoint emulated over framed TCP        |
//! | `barrier`  | Per-frame two-party rendezvous                     |
//! | `transfer` | Message / remote-write transfer strategies         |
//! | `source`   | Looping file frame source                          |
//! | `sink`     | Display sink seam and headless trace sink          |
//! | `pace`     | Producer frame-rate governor                       |
//! | `meter`    | Consumer FPS meter                                 |
//! | `session`  | Connection context and setup handshake             |
//! | `run`      | Phase machine and cancellation plumbing            |
//! | `producer` | Sending streaming loop                             |
//! | `consumer` | Receiving streaming loop                           |

pub mod barrier;
pub mod consumer;
pub mod error;
pub mod fabric;
pub mod frame;
pub mod meter;
pub mod pace;
pub mod producer;
pub mod run;
pub mod sequence;
pub mod session;
pub mod sink;
pub mod source;
pub mod transfer;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use barrier::SyncBarrier;
pub use consumer::FrameConsumer;
pub use error::CastError;
pub use fabric::{CompletionEvent, CompletionStatus, RegionDescriptor, TcpFabric};
pub use frame::{FrameBuffer, FrameGeometry, METADATA_PREFIX};
pub use meter::FpsMeter;
pub use pace::RateGovernor;
pub use producer::FrameProducer;
pub use run::StreamPhase;
pub use sequence::{SequenceCounter, SequenceId};
pub use session::{Role, Session, StreamSettings};
pub use sink::{DisplaySink, TraceSink};
pub use source::{FrameSource, LoopingFileSource};
pub use transfer::{TransferMode, TransferStrategy};
pub use wire::{WireCodec, WireFrame};
