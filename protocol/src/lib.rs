pub mod crypto;
pub mod error;
pub mod io;
pub mod rtp;

pub use crypto::{EncryptionMode, PacketCipher, KEY_LEN, NONCE_LEN};
pub use error::ProtocolError;
pub use rtp::{RtpHeader, RTP_HEADER_LEN, RTP_PAYLOAD_TYPE, RTP_VERSION};
