//! Error types returned by the library.

use std::time::Duration;

use btleplug::api::CentralState;
use uuid::Uuid;

/// Result type alias using [`ToioError`].
pub type Result<T> = std::result::Result<T, ToioError>;

/// Why a notification frame could not be decoded.
///
/// Decode errors are per frame: [`crate::relay::EventRelay`] logs them and
/// keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("id notify: empty frame")]
    EmptyFrame,

    #[error("id notify: truncated frame ({actual} bytes, expected at least {expected})")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("id notify: unknown frame type 0x{tag:02x}")]
    UnknownFrameType { tag: u8 },
}

/// Errors produced while scanning, connecting, or talking to a cube.
#[derive(Debug, thiserror::Error)]
pub enum ToioError {
    /// Transport-reported failure, passed through unchanged.
    #[error("Bluetooth error: {0}")]
    Connection(#[from] btleplug::Error),

    /// The scan deadline passed before enough cubes were found.
    ///
    /// Not fatal: the devices found so far are returned next to this error.
    #[error("discovery timed out: found {found} of {wanted} cube(s)")]
    DiscoveryTimeout { wanted: usize, found: usize },

    /// The caller's [`crate::cancel::CancelToken`] fired during a scan.
    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The connected peer does not expose the toio service.
    #[error("service {0} not found on peer")]
    MissingService(Uuid),

    /// The connected peer lacks a required characteristic.
    #[error("characteristic {characteristic} not found in service {service}")]
    MissingCharacteristic { service: Uuid, characteristic: Uuid },

    /// A transport step exceeded its hard limit.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("Bluetooth adapter is not powered on (state: {0:?})")]
    RadioUnavailable(CentralState),

    /// A command was issued on a handle after it was disconnected.
    #[error("cube is not connected")]
    NotConnected,

    /// The advertisement stream task panicked or was aborted.
    #[error("scan task failed: {0}")]
    ScanTask(#[from] tokio::task::JoinError),
}

impl ToioError {
    /// `true` for errors that leave partial scan results usable.
    pub fn is_discovery_timeout(&self) -> bool {
        matches!(self, ToioError::DiscoveryTimeout { .. })
    }

    /// `true` for configuration errors: the peer is reachable but is not a
    /// usable cube.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ToioError::MissingService(_) | ToioError::MissingCharacteristic { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_messages() {
        assert_eq!(
            DecodeError::UnknownFrameType { tag: 0x09 }.to_string(),
            "id notify: unknown frame type 0x09"
        );
        assert_eq!(
            DecodeError::TruncatedFrame {
                expected: 13,
                actual: 2
            }
            .to_string(),
            "id notify: truncated frame (2 bytes, expected at least 13)"
        );
    }

    #[test]
    fn test_timeout_and_transport_fault_are_distinct() {
        let timeout = ToioError::DiscoveryTimeout {
            wanted: 1,
            found: 0,
        };
        let fault = ToioError::Connection(btleplug::Error::NotConnected);
        assert!(timeout.is_discovery_timeout());
        assert!(!fault.is_discovery_timeout());
    }
}
