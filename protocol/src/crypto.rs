//! Secretbox sealing of voice payloads.
//!
//! Every mode uses XSalsa20-Poly1305 with the session key; they differ only in
//! where the 24-byte nonce comes from and how much of it travels with the packet.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Nonce, XSalsa20Poly1305};

use crate::error::ProtocolError;
use crate::io::{Reader, Writer};
use crate::rtp::{RtpHeader, RTP_HEADER_LEN};

/// Session secret key size.
pub const KEY_LEN: usize = 32;

/// Full secretbox nonce size.
pub const NONCE_LEN: usize = 24;

/// Bytes of the incrementing counter appended in lite mode.
pub const LITE_NONCE_LEN: usize = 4;

/// Poly1305 tag prepended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Negotiated packet encryption scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionMode {
    /// Nonce is the RTP header padded with zeros; nothing appended.
    Normal,
    /// Fresh random 24-byte nonce appended in full.
    Suffix,
    /// Incrementing 32-bit counter, only its 4 bytes appended.
    Lite,
}

impl EncryptionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "xsalsa20_poly1305",
            Self::Suffix => "xsalsa20_poly1305_suffix",
            Self::Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Number of nonce bytes transmitted after the ciphertext.
    #[must_use]
    pub const fn suffix_len(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Suffix => NONCE_LEN,
            Self::Lite => LITE_NONCE_LEN,
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xsalsa20_poly1305" => Ok(Self::Normal),
            "xsalsa20_poly1305_suffix" => Ok(Self::Suffix),
            "xsalsa20_poly1305_lite" => Ok(Self::Lite),
            other => Err(ProtocolError::UnknownMode(other.to_string())),
        }
    }
}

/// Seals and opens voice packets for one session key and mode.
pub struct PacketCipher {
    cipher: XSalsa20Poly1305,
    mode: EncryptionMode,
}

impl PacketCipher {
    /// # Errors
    /// Returns error if `key` is not exactly 32 bytes.
    pub fn new(key: &[u8], mode: EncryptionMode) -> Result<Self, ProtocolError> {
        let cipher = XSalsa20Poly1305::new_from_slice(key).map_err(|_| {
            ProtocolError::InvalidKeyLength {
                expected: KEY_LEN,
                got: key.len(),
            }
        })?;

        Ok(Self { cipher, mode })
    }

    #[must_use]
    pub fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Build a complete packet: `header || ciphertext || nonce suffix`.
    ///
    /// `lite_nonce` is only read in [`EncryptionMode::Lite`]; the caller owns
    /// advancing it.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encryption`] if the cipher rejects the payload.
    pub fn seal(
        &self,
        header: &RtpHeader,
        lite_nonce: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let header_bytes = header.encode();
        let mut nonce = [0u8; NONCE_LEN];

        let suffix: &[u8] = match self.mode {
            EncryptionMode::Normal => {
                nonce[..RTP_HEADER_LEN].copy_from_slice(&header_bytes);
                &[]
            }
            EncryptionMode::Suffix => {
                rand::rng().fill_bytes(&mut nonce);
                &nonce
            }
            EncryptionMode::Lite => {
                nonce[..LITE_NONCE_LEN].copy_from_slice(&lite_nonce.to_be_bytes());
                &nonce[..LITE_NONCE_LEN]
            }
        };

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| ProtocolError::Encryption)?;

        let mut w = Writer::with_capacity(RTP_HEADER_LEN + ciphertext.len() + suffix.len());
        w.write_bytes(&header_bytes);
        w.write_bytes(&ciphertext);
        w.write_bytes(suffix);
        Ok(w.into_vec())
    }

    /// Reverse of [`PacketCipher::seal`].
    ///
    /// # Errors
    /// Returns error if the packet is truncated, the header is foreign, or
    /// authentication fails.
    pub fn open(&self, packet: &[u8]) -> Result<(RtpHeader, Vec<u8>), ProtocolError> {
        let mut r = Reader::new(packet);
        let header = RtpHeader::read(&mut r)?;

        let mut nonce = [0u8; NONCE_LEN];
        match self.mode {
            EncryptionMode::Normal => {
                nonce[..RTP_HEADER_LEN].copy_from_slice(&packet[..RTP_HEADER_LEN]);
            }
            EncryptionMode::Suffix => {
                nonce.copy_from_slice(r.split_tail(NONCE_LEN)?);
            }
            EncryptionMode::Lite => {
                nonce[..LITE_NONCE_LEN].copy_from_slice(r.split_tail(LITE_NONCE_LEN)?);
            }
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), r.remaining())
            .map_err(|_| ProtocolError::Decryption)?;

        Ok((header, plaintext))
    }
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
