//! Laser profile sensor telemetry frame
//!
//! Protocol (one UDP datagram, little-endian, at least 32 bytes):
//! - 0..4   f32 area (mm²)
//! - 4..8   f32 right alignment (mm)
//! - 8..12  reserved
//! - 12..16 f32 left alignment (mm)
//! - 16..20 reserved
//! - 20..24 u32 profile count
//! - 24..28 u32 encoder pulse count
//! - 28..32 f32 sensor distance (mm)
//!
//! Trailing bytes beyond 32 are ignored.

use crate::domain::types::SensorFrame;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

pub const FRAME_LEN: usize = 32;

const RESERVED_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame: {len} bytes, need at least 32")]
    Malformed { len: usize },
}

/// Decode a telemetry datagram into its typed fields
pub fn decode_frame(data: &[u8]) -> Result<SensorFrame, FrameError> {
    if data.len() < FRAME_LEN {
        return Err(FrameError::Malformed { len: data.len() });
    }

    let mut buf = &data[..FRAME_LEN];
    let area = buf.get_f32_le();
    let right_align = buf.get_f32_le();
    buf.advance(RESERVED_LEN);
    let left_align = buf.get_f32_le();
    buf.advance(RESERVED_LEN);
    let profile_count = buf.get_u32_le();
    let pulse_count = buf.get_u32_le();
    let distance = buf.get_f32_le();

    Ok(SensorFrame { area, right_align, left_align, profile_count, pulse_count, distance })
}

/// Encode a frame in the sensor's wire layout (reserved bytes zeroed)
pub fn encode_frame(frame: &SensorFrame) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_LEN);
    buf.put_f32_le(frame.area);
    buf.put_f32_le(frame.right_align);
    buf.put_bytes(0, RESERVED_LEN);
    buf.put_f32_le(frame.left_align);
    buf.put_bytes(0, RESERVED_LEN);
    buf.put_u32_le(frame.profile_count);
    buf.put_u32_le(frame.pulse_count);
    buf.put_f32_le(frame.distance);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_f32(data: &[u8], offset: usize) -> f32 {
        f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    fn le_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    /// Deterministic pseudo-random bytes (xorshift)
    fn pseudo_random_bytes(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xFF) as u8
            })
            .collect()
    }

    #[test]
    fn test_decode_matches_manual_unpack() {
        for seed in 1..200u32 {
            let data = pseudo_random_bytes(seed, FRAME_LEN);
            let frame = decode_frame(&data).unwrap();

            // NaN payloads compare by bit pattern
            assert_eq!(frame.area.to_bits(), le_f32(&data, 0).to_bits());
            assert_eq!(frame.right_align.to_bits(), le_f32(&data, 4).to_bits());
            assert_eq!(frame.left_align.to_bits(), le_f32(&data, 12).to_bits());
            assert_eq!(frame.profile_count, le_u32(&data, 20));
            assert_eq!(frame.pulse_count, le_u32(&data, 24));
            assert_eq!(frame.distance.to_bits(), le_f32(&data, 28).to_bits());
        }
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let frame = SensorFrame {
            area: 500.0,
            right_align: 2.0,
            left_align: -2.0,
            profile_count: 10,
            pulse_count: 1000,
            distance: 50.0,
        };
        let mut data = encode_frame(&frame).to_vec();
        data[8..12].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        data[16..20].copy_from_slice(&[0xFF; 4]);
        assert_eq!(decode_frame(&data).unwrap(), frame);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let frame = SensorFrame {
            area: 1.0,
            right_align: 0.5,
            left_align: 0.25,
            profile_count: 1,
            pulse_count: 2,
            distance: 48.0,
        };
        let mut data = encode_frame(&frame).to_vec();
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_frame(&data).unwrap(), frame);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let data = [0u8; FRAME_LEN];
        for len in 0..FRAME_LEN {
            assert_eq!(decode_frame(&data[..len]), Err(FrameError::Malformed { len }));
        }
    }

    #[test]
    fn test_encode_layout() {
        let frame = SensorFrame {
            area: 123.5,
            right_align: -7.0,
            left_align: 3.0,
            profile_count: 0x0102_0304,
            pulse_count: 0xA0B0_C0D0,
            distance: 51.0,
        };
        let data = encode_frame(&frame);
        assert_eq!(data.len(), FRAME_LEN);
        assert_eq!(&data[20..24], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&data[24..28], &[0xD0, 0xC0, 0xB0, 0xA0]);
        assert_eq!(&data[8..12], &[0; 4]);
        assert_eq!(le_f32(&data, 28), 51.0);
    }
}
