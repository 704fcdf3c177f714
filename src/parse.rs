//! Binary decoder for toio ID information notifications.
//!
//! All functions in this module are pure (no I/O, no allocation) and are safe
//! to call from any async or sync context.
//!
//! # Frame layout
//!
//! Every notification starts with a one-byte frame type.  Multi-byte fields
//! are little-endian.
//!
//! | Tag | Event | Min length | Payload |
//! |---|---|---|---|
//! | `0x01` | [`CubeEvent::PositionId`] | 13 | 6 × u16 at offsets 1, 3, 5, 7, 9, 11 |
//! | `0x02` | [`CubeEvent::StandardId`] | 7 | u32 at 1, u16 at 5 |
//! | `0x03` | [`CubeEvent::PositionIdMissed`] | 1 | none |
//! | `0x04` | [`CubeEvent::StandardIdMissed`] | 1 | none |
//!
//! Bytes past the minimum length are ignored.

use crate::error::DecodeError;
use crate::types::{CubeEvent, PositionId, StandardId};

/// Frame type tags (first byte of every ID notification).
pub mod frame_type {
    pub const POSITION_ID: u8 = 0x01;
    pub const STANDARD_ID: u8 = 0x02;
    pub const POSITION_ID_MISSED: u8 = 0x03;
    pub const STANDARD_ID_MISSED: u8 = 0x04;
}

/// Minimum frame length for a Position ID notification.
pub const POSITION_ID_FRAME_LEN: usize = 13;

/// Minimum frame length for a Standard ID notification.
pub const STANDARD_ID_FRAME_LEN: usize = 7;

/// Read a little-endian `u16` at `offset`.  Callers check the length first.
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn require_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TruncatedFrame {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Decode one ID information notification into a [`CubeEvent`].
///
/// # Example
///
/// ```
/// # use toio_rs::parse::decode_id_notification;
/// # use toio_rs::types::{CubeEvent, PositionId};
/// let frame = [0x01, 10, 0, 11, 0, 12, 0, 13, 0, 14, 0, 15, 0];
/// assert_eq!(
///     decode_id_notification(&frame),
///     Ok(CubeEvent::PositionId(PositionId {
///         cube_x: 10,
///         cube_y: 11,
///         cube_angle: 12,
///         sensor_x: 13,
///         sensor_y: 14,
///         sensor_angle: 15,
///     }))
/// );
/// ```
pub fn decode_id_notification(data: &[u8]) -> Result<CubeEvent, DecodeError> {
    let &tag = data.first().ok_or(DecodeError::EmptyFrame)?;

    match tag {
        frame_type::POSITION_ID => {
            require_len(data, POSITION_ID_FRAME_LEN)?;
            Ok(CubeEvent::PositionId(PositionId {
                cube_x: read_u16_le(data, 1),
                cube_y: read_u16_le(data, 3),
                cube_angle: read_u16_le(data, 5),
                sensor_x: read_u16_le(data, 7),
                sensor_y: read_u16_le(data, 9),
                sensor_angle: read_u16_le(data, 11),
            }))
        }
        frame_type::STANDARD_ID => {
            require_len(data, STANDARD_ID_FRAME_LEN)?;
            Ok(CubeEvent::StandardId(StandardId {
                value: read_u32_le(data, 1),
                angle: read_u16_le(data, 5),
            }))
        }
        frame_type::POSITION_ID_MISSED => Ok(CubeEvent::PositionIdMissed),
        frame_type::STANDARD_ID_MISSED => Ok(CubeEvent::StandardIdMissed),
        tag => Err(DecodeError::UnknownFrameType { tag }),
    }
}
