//! Pull-based frame sources consumed by the dispatcher.

use std::future::Future;

use async_channel::{bounded, Receiver, Sender};

use crate::error::StreamError;

/// One encoded 20 ms audio frame.
pub type Frame = Vec<u8>;

/// Opus frame that decodes to silence.
pub const SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Produces frames in order, one per 20 ms of audio.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` at end of stream.
    ///
    /// Must be cancel-safe: a dropped call may not lose a frame.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, StreamError>>> + Send;

    /// Encoder tuning, if the source encodes.
    fn encoder(&mut self) -> Option<&mut dyn EncoderControl> {
        None
    }

    /// Gain control, if the source applies volume.
    fn volume(&mut self) -> Option<&mut dyn VolumeControl> {
        None
    }

    /// Releases upstream resources. Called at most once.
    fn dispose(&mut self) {}
}

/// Encoder settings a source may expose. Each returns whether it was applied.
pub trait EncoderControl: Send {
    fn set_bitrate(&mut self, bits_per_second: u32) -> bool;
    fn set_fec(&mut self, enabled: bool) -> bool;
    fn set_plp(&mut self, percent: u8) -> bool;
}

pub trait VolumeControl: Send {
    fn volume(&self) -> f64;

    /// Returns `false` if the value is rejected.
    fn set_volume(&mut self, volume: f64) -> bool;
}

/// Source fed with pre-encoded frames through a bounded channel.
///
/// Producers block while the channel is full, so a hard pause holds them back
/// until the dispatcher pulls again.
pub struct ChannelSource {
    frames: Receiver<Result<Frame, StreamError>>,
}

impl ChannelSource {
    #[must_use]
    pub fn new(frames: Receiver<Result<Frame, StreamError>>) -> Self {
        Self { frames }
    }

    /// Creates a source and the sender feeding it.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Sender<Result<Frame, StreamError>>, Self) {
        let (tx, rx) = bounded(capacity.max(1));
        (tx, Self::new(rx))
    }
}

impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        self.frames.recv().await.ok()
    }

    fn dispose(&mut self) {
        self.frames.close();
    }
}

/// Endless silence, substituted while paused with silence and after the end
/// of a stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilenceSource;

impl SilenceSource {
    #[must_use]
    pub fn next_silence(&mut self) -> Frame {
        SILENCE_FRAME.to_vec()
    }
}

impl FrameSource for SilenceSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        Some(Ok(self.next_silence()))
    }
}
