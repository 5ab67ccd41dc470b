//! Framed wire protocol for the streaming connection.
//!
//! One TCP stream carries everything: handshake payloads, per-frame
//! sync tokens, and frame data. Frames are length-delimited with a
//! little-endian header.
//!
//! ## Wire format
//!
//! ```text
//! magic: u32  (4)  "FCT0"
//! kind:  u8   (1)
//! ```
//!
//! followed by a kind-specific body:
//!
//! ```text
//! Hello / Region / Data:  len u32, body [u8; len]
//! Sync:                   round u64
//! Write:                  offset u64, key u64, len u32, body [u8; len]
//! Goodbye:                (empty)
//! ```
//!
//! Handshake bodies (`Hello`, `Region`) are opaque bincode blobs; the
//! session layer owns their schema. The codec only frames bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CastError;

// ── Constants ────────────────────────────────────────────────────

const MAGIC: u32 = u32::from_le_bytes(*b"FCT0");

/// Fixed prefix: magic + kind.
const PREFIX_LEN: usize = 5;

/// Upper bound on any variable-length body. Comfortably fits one
/// 1920x1080 YUV 4:2:0 frame (3,110,400 bytes).
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

const KIND_HELLO: u8 = 1;
const KIND_REGION: u8 = 2;
const KIND_SYNC: u8 = 3;
const KIND_DATA: u8 = 4;
const KIND_WRITE: u8 = 5;
const KIND_GOODBYE: u8 = 6;

// ── WireFrame ────────────────────────────────────────────────────

/// One frame on the streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Handshake: stream parameters (bincode body).
    Hello { body: Bytes },
    /// Handshake: registered-buffer descriptor (bincode body).
    Region { body: Bytes },
    /// Per-iteration rendezvous token.
    Sync { round: u64 },
    /// Message-mode frame payload.
    Data { payload: Bytes },
    /// Remote-write frame payload targeting a registered region.
    Write { offset: u64, key: u64, payload: Bytes },
    /// Graceful shutdown notice.
    Goodbye,
}

impl WireFrame {
    fn kind(&self) -> u8 {
        match self {
            Self::Hello { .. } => KIND_HELLO,
            Self::Region { .. } => KIND_REGION,
            Self::Sync { .. } => KIND_SYNC,
            Self::Data { .. } => KIND_DATA,
            Self::Write { .. } => KIND_WRITE,
            Self::Goodbye => KIND_GOODBYE,
        }
    }
}

// ── WireCodec ────────────────────────────────────────────────────

/// `tokio_util` codec for [`WireFrame`].
#[derive(Debug, Default)]
pub struct WireCodec;

impl WireCodec {
    pub fn new() -> Self {
        Self
    }
}

impl tokio_util::codec::Encoder<WireFrame> for WireCodec {
    type Error = CastError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = match &item {
            WireFrame::Hello { body } | WireFrame::Region { body } => body.len(),
            WireFrame::Data { payload } | WireFrame::Write { payload, .. } => payload.len(),
            _ => 0,
        };
        if body_len > MAX_PAYLOAD_SIZE {
            return Err(CastError::FrameTooLarge {
                size: body_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(PREFIX_LEN + 20 + body_len);
        dst.put_u32_le(MAGIC);
        dst.put_u8(item.kind());

        match item {
            WireFrame::Hello { body } | WireFrame::Region { body } => {
                dst.put_u32_le(body.len() as u32);
                dst.extend_from_slice(&body);
            }
            WireFrame::Sync { round } => dst.put_u64_le(round),
            WireFrame::Data { payload } => {
                dst.put_u32_le(payload.len() as u32);
                dst.extend_from_slice(&payload);
            }
            WireFrame::Write {
                offset,
                key,
                payload,
            } => {
                dst.put_u64_le(offset);
                dst.put_u64_le(key);
                dst.put_u32_le(payload.len() as u32);
                dst.extend_from_slice(&payload);
            }
            WireFrame::Goodbye => {}
        }
        Ok(())
    }
}

impl tokio_util::codec::Decoder for WireCodec {
    type Item = WireFrame;
    type Error = CastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let magic = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if magic != MAGIC {
            return Err(CastError::InvalidMagic);
        }
        let kind = src[4];

        // Length of everything after the prefix, or None if more bytes
        // are needed before we can tell.
        let body_len = match kind {
            KIND_HELLO | KIND_REGION | KIND_DATA => {
                if src.len() < PREFIX_LEN + 4 {
                    return Ok(None);
                }
                let len = u32::from_le_bytes([src[5], src[6], src[7], src[8]]) as usize;
                if len > MAX_PAYLOAD_SIZE {
                    return Err(CastError::FrameTooLarge {
                        size: len,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                4 + len
            }
            KIND_SYNC => 8,
            KIND_WRITE => {
                if src.len() < PREFIX_LEN + 20 {
                    return Ok(None);
                }
                let len = u32::from_le_bytes([src[21], src[22], src[23], src[24]]) as usize;
                if len > MAX_PAYLOAD_SIZE {
                    return Err(CastError::FrameTooLarge {
                        size: len,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                20 + len
            }
            KIND_GOODBYE => 0,
            other => return Err(CastError::UnknownKind(other)),
        };

        if src.len() < PREFIX_LEN + body_len {
            return Ok(None);
        }

        let mut frame = src.split_to(PREFIX_LEN + body_len);
        frame.advance(PREFIX_LEN);

        let item = match kind {
            KIND_HELLO => WireFrame::Hello {
                body: body_after_len(&mut frame),
            },
            KIND_REGION => WireFrame::Region {
                body: body_after_len(&mut frame),
            },
            KIND_SYNC => WireFrame::Sync {
                round: frame.get_u64_le(),
            },
            KIND_DATA => WireFrame::Data {
                payload: body_after_len(&mut frame),
            },
            KIND_WRITE => {
                let offset = frame.get_u64_le();
                let key = frame.get_u64_le();
                WireFrame::Write {
                    offset,
                    key,
                    payload: body_after_len(&mut frame),
                }
            }
            _ => WireFrame::Goodbye,
        };
        Ok(Some(item))
    }
}

/// Consume the `len` field and return the remaining body.
fn body_after_len(frame: &mut BytesMut) -> Bytes {
    let len = frame.get_u32_le() as usize;
    frame.split_to(len).freeze()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::{Decoder, Encoder};

    fn roundtrip(frame: WireFrame) -> WireFrame {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty(), "decoder must consume the full frame");
        decoded
    }

    #[test]
    fn sync_roundtrip() {
        assert_eq!(
            roundtrip(WireFrame::Sync { round: 42 }),
            WireFrame::Sync { round: 42 },
        );
    }

    #[test]
    fn data_roundtrip() {
        let payload = Bytes::from(vec![0xAB; 1152]);
        let decoded = roundtrip(WireFrame::Data {
            payload: payload.clone(),
        });
        assert_eq!(decoded, WireFrame::Data { payload });
    }

    #[test]
    fn write_roundtrip() {
        let decoded = roundtrip(WireFrame::Write {
            offset: 64,
            key: 0xFC01,
            payload: Bytes::from_static(b"frame bytes"),
        });
        match decoded {
            WireFrame::Write {
                offset,
                key,
                payload,
            } => {
                assert_eq!(offset, 64);
                assert_eq!(key, 0xFC01);
                assert_eq!(&payload[..], b"frame bytes");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn hello_and_goodbye_roundtrip() {
        let body = Bytes::from_static(b"\x01\x02\x03");
        assert_eq!(
            roundtrip(WireFrame::Hello { body: body.clone() }),
            WireFrame::Hello { body },
        );
        assert_eq!(roundtrip(WireFrame::Goodbye), WireFrame::Goodbye);
    }

    #[test]
    fn partial_input_yields_none() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                WireFrame::Data {
                    payload: Bytes::from(vec![7u8; 100]),
                },
                &mut buf,
            )
            .unwrap();

        // Feed the bytes one prefix at a time.
        let full = buf.split();
        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..20]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut whole = BytesMut::from(&full[..]);
        assert!(codec.decode(&mut whole).unwrap().is_some());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::from(&b"XXXX\x03\x00\x00\x00\x00\x00\x00\x00\x00"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CastError::InvalidMagic)
        ));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAGIC);
        buf.put_u8(0x7F);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CastError::UnknownKind(0x7F))
        ));
    }

    #[test]
    fn oversize_payload_rejected() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAGIC);
        buf.put_u8(KIND_DATA);
        buf.put_u32_le((MAX_PAYLOAD_SIZE + 1) as u32);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CastError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn back_to_back_frames() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(WireFrame::Sync { round: 1 }, &mut buf).unwrap();
        codec.encode(WireFrame::Sync { round: 2 }, &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(WireFrame::Sync { round: 1 }),
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(WireFrame::Sync { round: 2 }),
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
