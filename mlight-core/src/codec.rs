//! Length-prefixed framing for [`WireMessage`]s over a TCP stream.
//!
//! ## Wire format
//!
//! ```text
//! length:    u32 BE   payload byte count (everything after this field)
//! version:   u8       envelope version (currently 1)
//! checksum:  u32 LE   first four bytes of blake3(body)
//! body:      [u8]     bincode-encoded WireMessage
//! ```
//!
//! The transport layer guarantees this codec only ever sees a
//! contiguous byte stream; partial input yields `Ok(None)` until a
//! complete frame has arrived. Anything structurally wrong with a
//! complete frame is a [`MlightError::MalformedFrame`] (or a more
//! specific codec error) and poisons the connection.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MlightError;
use crate::message::WireMessage;

/// Envelope version emitted by this build.
pub const WIRE_VERSION: u8 = 1;

/// Version byte + checksum, before the bincode body.
const ENVELOPE_OVERHEAD: usize = 5;

/// Size of the length prefix.
const LENGTH_PREFIX: usize = 4;

/// Upper bound on one frame. Rasters and photo brackets are a few
/// megabytes; anything past this is a corrupt length field.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Truncated blake3 of the message body, matching the on-wire field.
fn body_checksum(body: &[u8]) -> u32 {
    let hash = blake3::hash(body);
    u32::from_le_bytes(hash.as_bytes()[0..4].try_into().expect("hash >= 4 bytes"))
}

/// Framed codec for `tokio_util::codec::Framed`.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<WireMessage> for FrameCodec {
    type Error = MlightError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::serialize(&item)?;
        let payload_len = body.len() + ENVELOPE_OVERHEAD;
        if payload_len > MAX_FRAME_SIZE {
            return Err(MlightError::FrameTooLarge {
                size: payload_len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(LENGTH_PREFIX + payload_len);
        dst.put_u32(payload_len as u32); // big-endian
        dst.put_u8(WIRE_VERSION);
        dst.put_u32_le(body_checksum(&body));
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = WireMessage;
    type Error = MlightError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let payload_len =
            u32::from_be_bytes(src[0..LENGTH_PREFIX].try_into().expect("4 bytes")) as usize;
        if payload_len > MAX_FRAME_SIZE {
            return Err(MlightError::FrameTooLarge {
                size: payload_len,
                max: MAX_FRAME_SIZE,
            });
        }
        if payload_len < ENVELOPE_OVERHEAD {
            return Err(MlightError::MalformedFrame(
                "declared length shorter than envelope",
            ));
        }
        if src.len() < LENGTH_PREFIX + payload_len {
            // Wait for the rest of the frame.
            src.reserve(LENGTH_PREFIX + payload_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(payload_len);

        let version = payload[0];
        if version != WIRE_VERSION {
            return Err(MlightError::UnsupportedVersion(version));
        }

        let declared = u32::from_le_bytes(payload[1..5].try_into().expect("4 bytes"));
        let body = &payload[ENVELOPE_OVERHEAD..];
        if body_checksum(body) != declared {
            return Err(MlightError::ChecksumMismatch);
        }

        let message = bincode::deserialize(body)
            .map_err(|_| MlightError::MalformedFrame("body is not a valid message"))?;
        Ok(Some(message))
    }
}

// ── Standalone helpers ───────────────────────────────────────────

/// Encode a single message into a fresh byte buffer.
pub fn encode(message: &WireMessage) -> Result<Vec<u8>, MlightError> {
    let mut buf = BytesMut::new();
    FrameCodec.encode(message.clone(), &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode exactly one message from a complete frame.
///
/// Fails with [`MlightError::MalformedFrame`] if the bytes do not
/// contain exactly one well-formed frame.
pub fn decode(bytes: &[u8]) -> Result<WireMessage, MlightError> {
    let mut buf = BytesMut::from(bytes);
    let msg = FrameCodec
        .decode(&mut buf)?
        .ok_or(MlightError::MalformedFrame("incomplete frame"))?;
    if !buf.is_empty() {
        return Err(MlightError::MalformedFrame("trailing bytes after frame"));
    }
    Ok(msg)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        CodeSystem, DeviceOrientation, ExposureBracket, Instruction, PhotoKind, Reply, Resolution,
        StatusUpdate, SweepAxis, TorchMode,
    };

    fn representative_messages() -> Vec<WireMessage> {
        let bracket = ExposureBracket::new(vec![0.01, 0.05], vec![50.0, 400.0]).unwrap();
        vec![
            Instruction::CaptureStill {
                resolution: Resolution::Max,
            }
            .into(),
            Instruction::CaptureBracket {
                bracket: bracket.clone(),
            }
            .into(),
            Instruction::CaptureNormalInvertedPair {
                bit: 3,
                bracket: bracket.clone(),
                resolution: Resolution::High,
            }
            .into(),
            Instruction::FinishCapturePair {
                bit: 3,
                bracket,
                resolution: Resolution::High,
            }
            .into(),
            Instruction::StartSweep {
                axis: SweepAxis::Horizontal,
                system: CodeSystem::MinStripeWidth,
                bit_count: 10,
                resolution: Resolution::High,
                orientation: DeviceOrientation::Portrait,
            }
            .into(),
            Instruction::EndSweep.into(),
            Instruction::SetFocus { lens_position: 0.8 }.into(),
            Instruction::FocusPoint { x: 0.5, y: 0.25 }.into(),
            Instruction::SetExposure {
                duration_s: 0.008,
                iso: 100.0,
            }
            .into(),
            Instruction::SetTorch {
                mode: TorchMode::On(0.5),
            }
            .into(),
            Instruction::EndSession.into(),
            Reply::Photo {
                kind: PhotoKind::Thresholded,
                data: vec![0, 128, 255],
                bracket_index: Some(1),
                lens_position: Some(0.8),
                exposure: Some((0.01, 100.0)),
            }
            .into(),
            Reply::Status(StatusUpdate::CapturedNormalBinaryCode).into(),
            Reply::Raster {
                axis: SweepAxis::Vertical,
                data: vec![1, 2, 3, 4],
            }
            .into(),
            Reply::Metadata {
                yaml: "angle: 35.0\n".into(),
            }
            .into(),
            Reply::Error {
                message: "exposure failed".into(),
            }
            .into(),
        ]
    }

    #[test]
    fn roundtrip_every_variant() {
        for msg in representative_messages() {
            let bytes = encode(&msg).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn partial_frame_yields_none() {
        let bytes = encode(&WireMessage::Instruction(Instruction::EndSweep)).unwrap();
        for cut in 0..bytes.len() {
            let mut buf = BytesMut::from(&bytes[..cut]);
            assert!(FrameCodec.decode(&mut buf).unwrap().is_none(), "cut={cut}");
        }
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let mut bytes = encode(&WireMessage::Instruction(Instruction::EndSweep)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(MlightError::ChecksumMismatch)
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = encode(&WireMessage::Instruction(Instruction::EndSweep)).unwrap();
        bytes[4] = 99; // version byte sits right after the length prefix
        assert!(matches!(
            decode(&bytes),
            Err(MlightError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn oversized_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        buf.put_bytes(0, 16);
        assert!(matches!(
            FrameCodec.decode(&mut buf),
            Err(MlightError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn undersized_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_bytes(0, 2);
        assert!(matches!(
            FrameCodec.decode(&mut buf),
            Err(MlightError::MalformedFrame(_))
        ));
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let a = WireMessage::Instruction(Instruction::EndSweep);
        let b = WireMessage::Reply(Reply::ack());
        let mut buf = BytesMut::new();
        FrameCodec.encode(a.clone(), &mut buf).unwrap();
        FrameCodec.encode(b.clone(), &mut buf).unwrap();

        assert_eq!(FrameCodec.decode(&mut buf).unwrap(), Some(a));
        assert_eq!(FrameCodec.decode(&mut buf).unwrap(), Some(b));
        assert!(buf.is_empty());
    }
}
