use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

use crate::error::{StreamError, StreamStage};

/// Mono FFT resampler fed in fixed-size chunks
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    output_buffer: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Error)]
pub enum ResamplerError {
    #[error("Resampler initialization error: {0}")]
    InitializationError(String),

    #[error("Resampling error: {0}")]
    ResamplingError(String),
}

impl From<ResamplerError> for StreamError {
    fn from(e: ResamplerError) -> Self {
        StreamError::new(StreamStage::Transcode, e.to_string())
    }
}

impl AudioResampler {
    /// `chunk_size` is the number of input samples each `resample` call takes.
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        chunk_size: usize,
    ) -> Result<Self, ResamplerError> {
        let resampler = FftFixedIn::<f32>::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2, // sub_chunks
            1,
        )
        .map_err(|e| {
            ResamplerError::InitializationError(format!("Failed to create resampler: {e}"))
        })?;

        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            output_buffer,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.resampler.input_frames_next()
    }

    /// Resample exactly one chunk.
    pub fn resample(&mut self, input: &[f32]) -> Result<Vec<f32>, ResamplerError> {
        let (_, resampled_size) = self
            .resampler
            .process_into_buffer(&[input], &mut self.output_buffer, None)
            .map_err(|e| ResamplerError::ResamplingError(format!("Resampling failed: {e}")))?;

        Ok(self.output_buffer[0][..resampled_size].to_vec())
    }

    /// Resample a final chunk shorter than `chunk_size`, zero-padded.
    pub fn resample_partial(&mut self, input: &[f32]) -> Result<Vec<f32>, ResamplerError> {
        let (_, resampled_size) = self
            .resampler
            .process_partial_into_buffer(Some(&[input][..]), &mut self.output_buffer, None)
            .map_err(|e| ResamplerError::ResamplingError(format!("Resampling failed: {e}")))?;

        Ok(self.output_buffer[0][..resampled_size].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_sample_count_from_96k() {
        let mut resampler = AudioResampler::new(96_000, 48_000, 480).unwrap();
        assert_eq!(resampler.chunk_size(), 480);

        let out = resampler.resample(&[0.0; 480]).unwrap();
        assert_eq!(out.len(), 240);
    }

    #[test]
    fn errors_map_to_transcode_stage() {
        let err: StreamError = ResamplerError::ResamplingError("x".into()).into();
        assert_eq!(err.stage, StreamStage::Transcode);
    }
}
