use crate::error::{StreamError, StreamStage};
use crate::source::VolumeControl;

/// Linear gain applied to samples before encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    volume: f64,
}

impl Gain {
    #[must_use]
    pub fn new() -> Self {
        Self { volume: 1.0 }
    }

    /// Scale samples in place, clamping to [-1, 1].
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&self, samples: &mut [f32]) -> Result<(), StreamError> {
        if (self.volume - 1.0).abs() < f64::EPSILON {
            return Ok(());
        }

        let volume = self.volume as f32;
        for sample in samples.iter_mut() {
            let scaled = *sample * volume;
            if !scaled.is_finite() {
                return Err(StreamError::new(
                    StreamStage::Volume,
                    format!("non-finite sample after gain {}", self.volume),
                ));
            }
            *sample = scaled.clamp(-1.0, 1.0);
        }
        Ok(())
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeControl for Gain {
    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) -> bool {
        if !volume.is_finite() || volume < 0.0 {
            return false;
        }
        self.volume = volume;
        true
    }
}
