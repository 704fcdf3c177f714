/// A Position ID read from a toio mat.
///
/// Coordinates are in mat units; angles are in degrees (0-360).  The `cube_*`
/// fields give the centre of the cube, the `sensor_*` fields the point under
/// the optical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionId {
    pub cube_x: u16,
    pub cube_y: u16,
    pub cube_angle: u16,
    pub sensor_x: u16,
    pub sensor_y: u16,
    pub sensor_angle: u16,
}

/// A Standard ID read from a card or sticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardId {
    /// The printed ID value.
    pub value: u32,
    /// Cube angle relative to the card, in degrees.
    pub angle: u16,
}

/// All events decoded from the ID information characteristic.
///
/// Consumers receive these values through the [`crate::relay::EventStream`]
/// returned by [`crate::client::CubeHandle::start_id_notify`].  The stream
/// ends when the link closes; there is no dedicated "disconnected" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeEvent {
    /// The cube is on a mat and read a position.
    PositionId(PositionId),
    /// The cube is on a card or sticker and read its ID.
    StandardId(StandardId),
    /// The cube was lifted off the mat (Position ID no longer readable).
    PositionIdMissed,
    /// The cube left the card or sticker.
    StandardIdMissed,
}
