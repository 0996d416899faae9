//! Error types for the RTU slave engine
//!
//! Each error category corresponds to one recovery policy: framing and CRC
//! errors are swallowed locally (no reply), protocol exceptions become
//! exception replies, transport errors trigger reconnection, configuration
//! errors are fatal at startup.

use thiserror::Error;

/// Result type for rtusrv operations
pub type Result<T> = std::result::Result<T, RtuError>;

/// Modbus exception codes carried in an exception reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported by this server
    IllegalFunction = 0x01,
    /// Requested address range falls outside the data store
    IllegalDataAddress = 0x02,
    /// Request value or count outside the protocol-defined range
    IllegalDataValue = 0x03,
    /// Internal fault not otherwise classified
    ServerDeviceFailure = 0x04,
}

impl ExceptionCode {
    /// The one-byte wire encoding
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable description for log output
    pub fn description(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::ServerDeviceFailure => "Server Device Failure",
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X} ({})", self.as_u8(), self.description())
    }
}

impl std::error::Error for ExceptionCode {}

/// RTU slave engine errors
#[derive(Debug, Error)]
pub enum RtuError {
    /// Malformed or oversized frame; recovered locally, no reply is sent
    #[error("framing error: {0}")]
    Framing(String),

    /// Checksum mismatch; recovered locally, no reply is sent
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{got:04X}")]
    Crc { expected: u16, got: u16 },

    /// Valid frame with invalid request semantics; answered with an
    /// exception reply, never fatal
    #[error("modbus exception {0}")]
    Exception(ExceptionCode),

    /// I/O failure or disconnect; recovered by the transport supervisor
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid configuration; fatal, reported once at startup
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for RtuError {
    fn from(err: std::io::Error) -> Self {
        RtuError::Transport(err.to_string())
    }
}

// Helper methods for creating errors
impl RtuError {
    pub fn framing(msg: impl Into<String>) -> Self {
        RtuError::Framing(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        RtuError::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        RtuError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_wire_values() {
        assert_eq!(ExceptionCode::IllegalFunction.as_u8(), 0x01);
        assert_eq!(ExceptionCode::IllegalDataAddress.as_u8(), 0x02);
        assert_eq!(ExceptionCode::IllegalDataValue.as_u8(), 0x03);
        assert_eq!(ExceptionCode::ServerDeviceFailure.as_u8(), 0x04);
    }

    #[test]
    fn test_exception_code_descriptions() {
        assert_eq!(
            ExceptionCode::IllegalDataAddress.description(),
            "Illegal Data Address"
        );
        assert_eq!(
            ExceptionCode::IllegalFunction.description(),
            "Illegal Function"
        );
    }

    #[test]
    fn test_error_display() {
        let err = RtuError::Crc {
            expected: 0x0A84,
            got: 0xFFFF,
        };
        assert_eq!(err.to_string(), "CRC mismatch: expected 0x0A84, got 0xFFFF");

        let err = RtuError::Exception(ExceptionCode::IllegalDataValue);
        assert!(err.to_string().contains("Illegal Data Value"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err: RtuError = io_err.into();
        assert!(matches!(err, RtuError::Transport(_)));
    }
}
