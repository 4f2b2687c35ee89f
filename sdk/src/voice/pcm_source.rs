//! Raw mono PCM in, Opus frames out.

use async_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::error::{StreamError, StreamStage};
use crate::source::{EncoderControl, Frame, FrameSource, VolumeControl};
use crate::voice::{AudioResampler, Encoder, Gain, OPUS_FRAME_SIZE, OPUS_SAMPLE_RATE};

/// Producer side of a [`PcmSource`]. Send `Err` to abort the stream.
pub type PcmSender = Sender<Result<Vec<f32>, StreamError>>;

const RESAMPLER_CHUNK_SIZE: usize = 480;

/// Resamples to 48 kHz, applies gain and encodes 20 ms Opus frames.
///
/// A trailing partial frame is zero-padded once the producer hangs up.
pub struct PcmSource {
    input: Receiver<Result<Vec<f32>, StreamError>>,
    resampler: Option<AudioResampler>,
    resample_buffer: Vec<f32>,
    encode_buffer: Vec<f32>,
    encoder: Encoder,
    gain: Gain,
    ended: bool,
}

impl PcmSource {
    pub fn new(
        sample_rate: u32,
        input: Receiver<Result<Vec<f32>, StreamError>>,
    ) -> Result<Self, StreamError> {
        if sample_rate == 0 {
            return Err(StreamError::new(StreamStage::Transcode, "sample rate must be non-zero"));
        }

        let resampler = if sample_rate == OPUS_SAMPLE_RATE {
            None
        } else {
            Some(AudioResampler::new(sample_rate, OPUS_SAMPLE_RATE, RESAMPLER_CHUNK_SIZE)?)
        };

        Ok(Self {
            input,
            resampler,
            resample_buffer: Vec::with_capacity(RESAMPLER_CHUNK_SIZE * 2),
            encode_buffer: Vec::with_capacity(OPUS_FRAME_SIZE * 2),
            encoder: Encoder::new()?,
            gain: Gain::new(),
            ended: false,
        })
    }

    /// Source plus a bounded producer channel.
    pub fn channel(sample_rate: u32, capacity: usize) -> Result<(PcmSender, Self), StreamError> {
        let (tx, rx) = bounded(capacity.max(1));
        Ok((tx, Self::new(sample_rate, rx)?))
    }

    /// Resample input and append to the encode buffer
    fn transcode(&mut self, samples: &[f32]) -> Result<(), StreamError> {
        match self.resampler.as_mut() {
            Some(resampler) => {
                self.resample_buffer.extend_from_slice(samples);
                while self.resample_buffer.len() >= RESAMPLER_CHUNK_SIZE {
                    let resampled = resampler.resample(&self.resample_buffer[..RESAMPLER_CHUNK_SIZE])?;
                    self.resample_buffer.drain(..RESAMPLER_CHUNK_SIZE);
                    self.encode_buffer.extend_from_slice(&resampled);
                }
            }
            None => self.encode_buffer.extend_from_slice(samples),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.resample_buffer.is_empty() {
                let resampled = resampler.resample_partial(&self.resample_buffer)?;
                self.resample_buffer.clear();
                self.encode_buffer.extend_from_slice(&resampled);
            }
        }
        Ok(())
    }

    fn frame_ready(&self) -> bool {
        self.encode_buffer.len() >= OPUS_FRAME_SIZE || (self.ended && !self.encode_buffer.is_empty())
    }

    fn encode_next(&mut self) -> Result<Frame, StreamError> {
        let take = self.encode_buffer.len().min(OPUS_FRAME_SIZE);
        let mut samples: Vec<f32> = self.encode_buffer.drain(..take).collect();
        self.gain.apply(&mut samples)?;
        self.encoder.encode(&samples)
    }
}

impl FrameSource for PcmSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            if self.frame_ready() {
                return Some(self.encode_next());
            }
            if self.ended {
                return None;
            }

            match self.input.recv().await {
                Ok(Ok(samples)) => {
                    if let Err(e) = self.transcode(&samples) {
                        return Some(Err(e));
                    }
                }
                Ok(Err(e)) => return Some(Err(e)),
                Err(_) => {
                    debug!("PCM input closed");
                    self.ended = true;
                    if let Err(e) = self.flush() {
                        return Some(Err(e));
                    }
                }
            }
        }
    }

    fn encoder(&mut self) -> Option<&mut dyn EncoderControl> {
        Some(&mut self.encoder)
    }

    fn volume(&mut self) -> Option<&mut dyn VolumeControl> {
        Some(&mut self.gain)
    }

    fn dispose(&mut self) {
        self.input.close();
        self.resample_buffer.clear();
        self.encode_buffer.clear();
    }
}
