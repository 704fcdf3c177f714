//! GATT UUIDs, advertising conventions, and the motor command encoder for
//! toio Core Cubes.
//!
//! All UUIDs belong to the toio vendor namespace
//! `10b2XXXX-5b3b-4571-9508-cf3efcd7bbae`.

use uuid::Uuid;

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary GATT service UUID exposed by every toio Core Cube.
///
/// Both the motor and the ID information characteristics live under it.
pub const TOIO_SERVICE_UUID: Uuid = Uuid::from_u128(0x10b20100_5b3b_4571_9508_cf3efcd7bbae);

// ── Characteristics ───────────────────────────────────────────────────────────

/// ID information characteristic (read / notify).
///
/// Notifies whenever the cube's optical sensor reads a Position ID from a toio
/// mat or a Standard ID from a card or sticker, and once more when the ID is
/// lost.  See [`crate::parse::decode_id_notification`] for the frame layout.
pub const ID_INFORMATION_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x10b20101_5b3b_4571_9508_cf3efcd7bbae);

/// Motor control characteristic (write without response).
///
/// Accepts the 7-byte frame produced by [`encode_motor_command`].
pub const MOTOR_CHARACTERISTIC: Uuid = Uuid::from_u128(0x10b20102_5b3b_4571_9508_cf3efcd7bbae);

// ── Advertising ───────────────────────────────────────────────────────────────

/// Every cube advertises a local name starting with this string.
pub const TOIO_NAME_PREFIX: &str = "toio";

// ── Motor frame layout ────────────────────────────────────────────────────────

/// Control type byte for the plain (unbounded duration) motor command.
pub const MOTOR_CONTROL_TYPE: u8 = 0x01;

/// Motor ID of the left wheel.
pub const LEFT_MOTOR_ID: u8 = 0x01;

/// Motor ID of the right wheel.
pub const RIGHT_MOTOR_ID: u8 = 0x02;

/// Direction byte for a speed `>= 0`.
pub const DIRECTION_FORWARD: u8 = 0x01;

/// Direction byte for a speed `< 0`.
pub const DIRECTION_BACKWARD: u8 = 0x02;

/// Largest speed magnitude the firmware accepts.  Inputs beyond it saturate.
pub const MAX_MOTOR_SPEED: i32 = 255;

/// Length in bytes of an encoded motor command.
pub const MOTOR_FRAME_LEN: usize = 7;

// ── Motor command ─────────────────────────────────────────────────────────────

/// A left/right wheel speed pair, already clamped to
/// `[-MAX_MOTOR_SPEED, MAX_MOTOR_SPEED]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    left: i16,
    right: i16,
}

impl MotorCommand {
    /// Build a command, saturating each speed into the accepted range.
    pub fn new(left: i32, right: i32) -> Self {
        Self {
            left: clamp_speed(left),
            right: clamp_speed(right),
        }
    }

    /// Both wheels stopped.
    pub fn stop() -> Self {
        Self { left: 0, right: 0 }
    }

    pub fn left(&self) -> i16 {
        self.left
    }

    pub fn right(&self) -> i16 {
        self.right
    }

    /// Encode into the wire frame written to [`MOTOR_CHARACTERISTIC`].
    pub fn encode(&self) -> [u8; MOTOR_FRAME_LEN] {
        let (left_dir, left_speed) = direction_and_speed(self.left);
        let (right_dir, right_speed) = direction_and_speed(self.right);
        [
            MOTOR_CONTROL_TYPE,
            LEFT_MOTOR_ID,
            left_dir,
            left_speed,
            RIGHT_MOTOR_ID,
            right_dir,
            right_speed,
        ]
    }
}

fn clamp_speed(speed: i32) -> i16 {
    speed.clamp(-MAX_MOTOR_SPEED, MAX_MOTOR_SPEED) as i16
}

/// Split an already clamped speed into its direction byte and magnitude byte.
fn direction_and_speed(speed: i16) -> (u8, u8) {
    let dir = if speed >= 0 {
        DIRECTION_FORWARD
    } else {
        DIRECTION_BACKWARD
    };
    (dir, speed.unsigned_abs() as u8)
}

/// Encode a motor command for the motor characteristic.
///
/// The cube expects a fixed 7-byte frame:
/// ```text
/// byte 0 : control type (0x01)
/// byte 1 : left motor id (0x01)
/// byte 2 : left direction (0x01 forward, 0x02 backward)
/// byte 3 : left speed (0-255)
/// byte 4 : right motor id (0x02)
/// byte 5 : right direction
/// byte 6 : right speed
/// ```
///
/// Speeds outside `[-255, 255]` saturate at the limit.
///
/// # Example
///
/// ```
/// # use toio_rs::protocol::encode_motor_command;
/// assert_eq!(
///     encode_motor_command(300, -300),
///     [0x01, 0x01, 0x01, 0xFF, 0x02, 0x02, 0xFF]
/// );
/// ```
pub fn encode_motor_command(left: i32, right: i32) -> [u8; MOTOR_FRAME_LEN] {
    MotorCommand::new(left, right).encode()
}
