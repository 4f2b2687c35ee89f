//! PCM to Opus frame production.

mod encoder;
mod gain;
mod pcm_source;
mod resampler;

pub use encoder::{Encoder, DEFAULT_BITRATE};
pub use gain::Gain;
pub use pcm_source::{PcmSender, PcmSource};
pub use resampler::{AudioResampler, ResamplerError};

/// Opus runs at 48 kHz.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Mono samples in one 20 ms frame.
pub const OPUS_FRAME_SIZE: usize = 960;

/// Upper bound for one encoded Opus packet.
const MAX_OPUS_PACKET: usize = 4000;
