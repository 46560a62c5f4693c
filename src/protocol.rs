//! Engraver firmware wire format.
//!
//! One point is sent as an 8-byte ASCII frame, `x` + 3 lowercase hex digits +
//! `y` + 3 lowercase hex digits, e.g. `x00ay1f4` for (10, 500). No terminator
//! and no checksum. The firmware answers every frame with `OK\r\n`.

use thiserror::Error;

use crate::script::{Axis, Point};

pub const FRAME_LEN: usize = 8;
pub const ACK: &[u8] = b"OK\r\n";
/// Largest value that fits in three hex digits.
pub const MAX_WIRE_VALUE: i32 = 0xfff;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{} value {value} does not fit in 3 hex digits", .axis.letter())]
    Encoding { axis: Axis, value: i32 },
    #[error("device connection is closed")]
    Closed,
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn encode_axis(out: &mut [u8], axis: Axis, value: i32) -> Result<(), ProtocolError> {
    if !(0..=MAX_WIRE_VALUE).contains(&value) {
        return Err(ProtocolError::Encoding { axis, value });
    }
    out[0] = axis.letter() as u8;
    out[1] = HEX_DIGITS[((value >> 8) & 0xf) as usize];
    out[2] = HEX_DIGITS[((value >> 4) & 0xf) as usize];
    out[3] = HEX_DIGITS[(value & 0xf) as usize];
    Ok(())
}

pub fn encode_point(point: Point) -> Result<Frame, ProtocolError> {
    let mut frame = [0u8; FRAME_LEN];
    encode_axis(&mut frame[..4], Axis::X, point.x)?;
    encode_axis(&mut frame[4..], Axis::Y, point.y)?;
    Ok(frame)
}

/// True only for an exact `OK\r\n` reply.
pub fn decode_ack(reply: &[u8]) -> bool {
    reply == ACK
}
