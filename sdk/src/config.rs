//! Dispatcher tuning.

use serde::{Deserialize, Serialize};

/// Silence frames sent after the source ends.
pub const DEFAULT_TRAILING_SILENCE_FRAMES: u32 = 5;

/// Capacity of a dispatcher's command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;

/// Per-stream options, applied before the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    pub volume: f64,
    pub bitrate: Option<u32>,
    pub fec: Option<bool>,
    /// Expected packet loss, in percent.
    pub plp: Option<u8>,
    pub trailing_silence_frames: u32,
    pub command_capacity: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            bitrate: None,
            fec: None,
            plp: None,
            trailing_silence_frames: DEFAULT_TRAILING_SILENCE_FRAMES,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}
