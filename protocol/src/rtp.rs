//! Fixed 12-byte RTP header carried in front of every voice packet.

use crate::error::ProtocolError;
use crate::io::{Reader, Writer};

/// Version/flags byte: RTP version 2, no padding, extension or CSRC.
pub const RTP_VERSION: u8 = 0x80;

/// Payload type used for Opus voice.
pub const RTP_PAYLOAD_TYPE: u8 = 0x78;

/// Encoded header size in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Per-packet header fields. Version and payload type are constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtpHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    #[must_use]
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode to wire format.
    ///
    /// Format: `[0x80][0x78][sequence: u16][timestamp: u32][ssrc: u32]`, big-endian.
    #[must_use]
    pub fn encode(&self) -> [u8; RTP_HEADER_LEN] {
        let mut w = Writer::with_capacity(RTP_HEADER_LEN);
        self.write(&mut w);

        let mut out = [0u8; RTP_HEADER_LEN];
        out.copy_from_slice(&w.into_vec());
        out
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_u8(RTP_VERSION);
        w.write_u8(RTP_PAYLOAD_TYPE);
        w.write_u16(self.sequence);
        w.write_u32(self.timestamp);
        w.write_u32(self.ssrc);
    }

    /// Decode a header, leaving the reader positioned at the payload.
    ///
    /// # Errors
    /// Returns error if fewer than 12 bytes remain or the constant bytes mismatch.
    pub fn read(r: &mut Reader) -> Result<Self, ProtocolError> {
        let version = r.read_u8()?;
        let payload_type = r.read_u8()?;
        if version != RTP_VERSION || payload_type != RTP_PAYLOAD_TYPE {
            return Err(ProtocolError::InvalidHeader {
                version,
                payload_type,
            });
        }

        Ok(Self {
            sequence: r.read_u16()?,
            timestamp: r.read_u32()?,
            ssrc: r.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_matches_wire_convention() {
        let header = RtpHeader::new(5, 1000, 42);
        assert_eq!(
            header.encode(),
            [0x80, 0x78, 0, 5, 0, 0, 3, 232, 0, 0, 0, 42]
        );
    }

    #[test]
    fn header_reads_back() {
        let header = RtpHeader::new(0xfffe, 0xdead_beef, 0x0102_0304);
        let bytes = header.encode();
        let mut r = Reader::new(&bytes);
        assert_eq!(RtpHeader::read(&mut r).unwrap(), header);
        assert!(r.remaining().is_empty());
    }

    #[test]
    fn rejects_foreign_payload_type() {
        let mut bytes = RtpHeader::new(1, 1, 1).encode();
        bytes[1] = 0x60;
        let mut r = Reader::new(&bytes);
        assert_eq!(
            RtpHeader::read(&mut r),
            Err(ProtocolError::InvalidHeader {
                version: 0x80,
                payload_type: 0x60
            })
        );
    }

    #[test]
    fn truncated_header_is_too_short() {
        let bytes = RtpHeader::new(1, 1, 1).encode();
        let mut r = Reader::new(&bytes[..7]);
        assert!(matches!(
            RtpHeader::read(&mut r),
            Err(ProtocolError::PacketTooShort { .. })
        ));
    }
}
