//! Per-connection session context and handshake.
//!
//! A [`Session`] owns everything one streaming connection needs —
//! negotiated parameters, both frame buffers with their carved
//! metadata prefix, and the lifecycle phase — and is threaded through
//! setup, the streaming loop, and teardown. Nothing lives in
//! module-level state; the single-connection assumption is explicit.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CastError;
use crate::fabric::{ControlMsg, RegionDescriptor, TcpFabric};
use crate::frame::{FrameBuffer, FrameGeometry};
use crate::run::StreamPhase;
use crate::transfer::TransferMode;

// ── Role ─────────────────────────────────────────────────────────

/// Which end of the connection this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connects to the peer and produces frames.
    Initiator,
    /// Listens, accepts, and consumes frames.
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

// ── StreamSettings ───────────────────────────────────────────────

/// Stream parameters offered by the initiator.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub geometry: FrameGeometry,
    pub mode: TransferMode,
    /// Paced target for the message-mode producer. Ignored by the
    /// remote-write producer, which free-runs on completion
    /// backpressure.
    pub target_fps: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            geometry: FrameGeometry::new(1920, 1080),
            mode: TransferMode::Message,
            target_fps: 1,
        }
    }
}

/// Hello payload carried over the wire (bincode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct HelloPayload {
    width: u32,
    height: u32,
    mode: TransferMode,
    target_fps: u32,
}

impl From<StreamSettings> for HelloPayload {
    fn from(s: StreamSettings) -> Self {
        Self {
            width: s.geometry.width,
            height: s.geometry.height,
            mode: s.mode,
            target_fps: s.target_fps,
        }
    }
}

impl HelloPayload {
    fn settings(self) -> StreamSettings {
        StreamSettings {
            geometry: FrameGeometry::new(self.width, self.height),
            mode: self.mode,
            target_fps: self.target_fps,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Everything one streaming connection owns.
#[derive(Debug)]
pub struct Session {
    pub role: Role,
    pub mode: TransferMode,
    pub geometry: FrameGeometry,
    pub target_fps: u32,
    pub outbound: FrameBuffer,
    pub inbound: FrameBuffer,
    pub phase: StreamPhase,
}

impl Session {
    /// Run the setup handshake and build the session context.
    ///
    /// The initiator's hello is authoritative: the responder adopts
    /// its geometry, mode, and target rate, and echoes them back so
    /// the initiator can verify. In remote-write mode the responder
    /// then registers its inbound buffer and sends the descriptor.
    pub async fn establish(
        fabric: &mut TcpFabric,
        role: Role,
        settings: StreamSettings,
    ) -> Result<Self, CastError> {
        let agreed = match role {
            Role::Initiator => {
                if !settings.geometry.is_valid() {
                    return Err(CastError::Setup(format!(
                        "invalid frame geometry {}",
                        settings.geometry,
                    )));
                }
                let hello = HelloPayload::from(settings);
                fabric
                    .send_hello(Bytes::from(bincode::serialize(&hello)?))
                    .await?;

                let echo = expect_hello(fabric.recv_control().await?)?;
                if echo != hello {
                    return Err(CastError::HandshakeMismatch(
                        "peer altered stream parameters",
                    ));
                }
                settings
            }
            Role::Responder => {
                let offered = expect_hello(fabric.recv_control().await?)?;
                let adopted = offered.settings();
                if !adopted.geometry.is_valid() {
                    return Err(CastError::Setup(format!(
                        "peer offered invalid frame geometry {}",
                        adopted.geometry,
                    )));
                }
                fabric
                    .send_hello(Bytes::from(bincode::serialize(&offered)?))
                    .await?;
                adopted
            }
        };

        let session = Self {
            role,
            mode: agreed.mode,
            geometry: agreed.geometry,
            target_fps: agreed.target_fps,
            outbound: FrameBuffer::for_geometry(agreed.geometry),
            inbound: FrameBuffer::for_geometry(agreed.geometry),
            phase: StreamPhase::Setup,
        };

        // Remote-write mode: the consumer's buffer descriptor crosses
        // the wire exactly once; it is immutable thereafter.
        if agreed.mode == TransferMode::Write {
            match role {
                Role::Responder => {
                    let desc = fabric.register_region(session.inbound.len() as u64);
                    fabric
                        .send_region(Bytes::from(bincode::serialize(&desc)?))
                        .await?;
                    debug!(key = desc.key, len = desc.len, "inbound region registered");
                }
                Role::Initiator => {
                    let desc = expect_region(fabric.recv_control().await?)?;
                    let needed = session.outbound.len() as u64;
                    if desc.len < needed {
                        return Err(CastError::Setup(format!(
                            "peer region too small: {} < {needed}",
                            desc.len,
                        )));
                    }
                    fabric.set_remote_region(desc);
                }
            }
        }

        info!(
            role = %session.role,
            mode = %session.mode,
            geometry = %session.geometry,
            frame_len = session.geometry.frame_len(),
            "session established"
        );
        Ok(session)
    }

    /// Where frame payloads start inside either buffer region.
    pub fn payload_offset(&self) -> usize {
        self.outbound.payload_offset()
    }
}

fn expect_hello(msg: ControlMsg) -> Result<HelloPayload, CastError> {
    match msg {
        ControlMsg::Hello(body) => Ok(bincode::deserialize(&body)?),
        ControlMsg::Region(_) => Err(CastError::ProtocolViolation(
            "expected hello, got region descriptor",
        )),
    }
}

fn expect_region(msg: ControlMsg) -> Result<RegionDescriptor, CastError> {
    match msg {
        ControlMsg::Region(body) => Ok(bincode::deserialize(&body)?),
        ControlMsg::Hello(_) => Err(CastError::ProtocolViolation(
            "expected region descriptor, got hello",
        )),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

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

    fn tiny_settings(mode: TransferMode) -> StreamSettings {
        StreamSettings {
            geometry: FrameGeometry::new(32, 24),
            mode,
            target_fps: 30,
        }
    }

    #[tokio::test]
    async fn responder_adopts_initiator_parameters() {
        let (mut init_fabric, mut resp_fabric) = pair().await;
        let settings = tiny_settings(TransferMode::Message);

        let responder = tokio::spawn(async move {
            let s = Session::establish(&mut resp_fabric, Role::Responder, StreamSettings::default())
                .await
                .unwrap();
            (s.geometry, s.mode, s.target_fps)
        });

        let session = Session::establish(&mut init_fabric, Role::Initiator, settings)
            .await
            .unwrap();
        assert_eq!(session.geometry, settings.geometry);

        let (geom, mode, fps) = responder.await.unwrap();
        // The responder's own defaults are irrelevant.
        assert_eq!(geom, settings.geometry);
        assert_eq!(mode, TransferMode::Message);
        assert_eq!(fps, 30);
    }

    #[tokio::test]
    async fn write_mode_exchanges_region_descriptor() {
        let (mut init_fabric, mut resp_fabric) = pair().await;
        let settings = tiny_settings(TransferMode::Write);

        let responder = tokio::spawn(async move {
            Session::establish(&mut resp_fabric, Role::Responder, StreamSettings::default())
                .await
                .unwrap();
            resp_fabric
        });

        let session = Session::establish(&mut init_fabric, Role::Initiator, settings)
            .await
            .unwrap();
        let _ = responder.await.unwrap();

        let region = init_fabric.remote_region().expect("descriptor exchanged");
        assert_eq!(region.len, session.outbound.len() as u64);
    }

    #[tokio::test]
    async fn invalid_geometry_is_a_setup_failure() {
        let (mut init_fabric, _resp_fabric) = pair().await;
        let settings = StreamSettings {
            geometry: FrameGeometry::new(33, 24),
            ..tiny_settings(TransferMode::Message)
        };
        let result = Session::establish(&mut init_fabric, Role::Initiator, settings).await;
        assert!(matches!(result, Err(CastError::Setup(_))));
    }

    #[tokio::test]
    async fn buffers_share_the_payload_offset() {
        let (mut init_fabric, mut resp_fabric) = pair().await;

        let responder = tokio::spawn(async move {
            Session::establish(&mut resp_fabric, Role::Responder, StreamSettings::default())
                .await
                .unwrap()
        });
        let session = Session::establish(
            &mut init_fabric,
            Role::Initiator,
            tiny_settings(TransferMode::Message),
        )
        .await
        .unwrap();

        let peer = responder.await.unwrap();
        assert_eq!(session.payload_offset(), peer.payload_offset());
        assert_eq!(
            session.outbound.payload().len(),
            session.geometry.frame_len(),
        );
    }
}
