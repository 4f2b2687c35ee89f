use std::fmt;

/// Protocol encoding, decoding and sealing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    PacketTooShort { expected: usize, got: usize },
    InvalidHeader { version: u8, payload_type: u8 },
    InvalidKeyLength { expected: usize, got: usize },
    UnknownMode(String),
    Encryption,
    Decryption,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::PacketTooShort { expected, got } => {
                write!(f, "packet too short: expected at least {} bytes, got {}", expected, got)
            }
            ProtocolError::InvalidHeader { version, payload_type } => {
                write!(
                    f,
                    "invalid rtp header: version byte 0x{:02x}, payload type 0x{:02x}",
                    version, payload_type
                )
            }
            ProtocolError::InvalidKeyLength { expected, got } => {
                write!(f, "invalid secret key length: expected {} bytes, got {}", expected, got)
            }
            ProtocolError::UnknownMode(mode) => {
                write!(f, "unknown encryption mode: {}", mode)
            }
            ProtocolError::Encryption => {
                write!(f, "failed to seal voice payload")
            }
            ProtocolError::Decryption => {
                write!(f, "failed to open voice payload")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
