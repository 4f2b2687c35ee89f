use opus::{Application, Bitrate, Channels};
use tracing::{debug, warn};

use crate::error::{StreamError, StreamStage};
use crate::source::EncoderControl;
use crate::voice::{MAX_OPUS_PACKET, OPUS_FRAME_SIZE, OPUS_SAMPLE_RATE};

/// Bitrate a fresh encoder starts with.
pub const DEFAULT_BITRATE: i32 = 64_000;

/// Opus encoder for 20 ms mono frames
pub struct Encoder {
    encoder: opus::Encoder,
}

impl Encoder {
    pub fn new() -> Result<Self, StreamError> {
        let mut encoder = opus::Encoder::new(OPUS_SAMPLE_RATE, Channels::Mono, Application::Voip)
            .map_err(|e| StreamError::new(StreamStage::Encode, format!("opus error: {e}")))?;

        encoder
            .set_bitrate(Bitrate::Bits(DEFAULT_BITRATE))
            .map_err(|e| StreamError::new(StreamStage::Encode, format!("opus error: {e}")))?;

        Ok(Self { encoder })
    }

    /// Encode one frame of samples.
    /// Pads with zeros if needed to reach `OPUS_FRAME_SIZE`.
    pub fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, StreamError> {
        if samples.len() > OPUS_FRAME_SIZE {
            return Err(StreamError::new(
                StreamStage::Encode,
                format!("{} samples exceed one frame of {}", samples.len(), OPUS_FRAME_SIZE),
            ));
        }

        let mut padded = samples.to_vec();
        padded.resize(OPUS_FRAME_SIZE, 0.0);

        let mut opus_frame = vec![0u8; MAX_OPUS_PACKET];
        let encoded_size = self
            .encoder
            .encode_float(&padded, &mut opus_frame)
            .map_err(|e| {
                StreamError::new(StreamStage::Encode, format!("Failed to encode Opus frame: {e}"))
            })?;
        opus_frame.truncate(encoded_size);

        Ok(opus_frame)
    }
}

impl EncoderControl for Encoder {
    fn set_bitrate(&mut self, bits_per_second: u32) -> bool {
        let Ok(bits) = i32::try_from(bits_per_second) else {
            return false;
        };
        match self.encoder.set_bitrate(Bitrate::Bits(bits)) {
            Ok(()) => {
                debug!("Opus bitrate set to {}", bits);
                true
            }
            Err(e) => {
                warn!("Opus rejected bitrate {}: {}", bits, e);
                false
            }
        }
    }

    fn set_fec(&mut self, enabled: bool) -> bool {
        self.encoder.set_inband_fec(enabled).is_ok()
    }

    fn set_plp(&mut self, percent: u8) -> bool {
        percent <= 100 && self.encoder.set_packet_loss_perc(i32::from(percent)).is_ok()
    }
}
