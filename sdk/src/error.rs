use std::fmt;

use thiserror::Error;
use voicecast_protocol::ProtocolError;

/// Pipeline stage a stream failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStage {
    Input,
    Transcode,
    Encode,
    Volume,
}

impl StreamStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Transcode => "transcode",
            Self::Encode => "encode",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for StreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a frame source or one of its upstream stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {message}")]
pub struct StreamError {
    pub stage: StreamStage,
    pub message: String,
}

impl StreamError {
    pub fn new(stage: StreamStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Failure to hand a packet to the network.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport channel closed")]
    Closed,
}

/// Errors surfaced by a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Stream error ({0})")]
    Stream(#[from] StreamError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatcher destroyed")]
    Destroyed,
}

impl DispatchError {
    /// Stage tag for upstream failures, `None` for everything else.
    #[must_use]
    pub fn stage(&self) -> Option<StreamStage> {
        match self {
            Self::Stream(e) => Some(e.stage),
            Self::Encryption(_) => Some(StreamStage::Encode),
            _ => None,
        }
    }
}
