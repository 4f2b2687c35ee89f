use tokio::sync::broadcast;
use tracing::debug;
use voicecast_protocol::ProtocolError;

use crate::error::StreamError;

/// Events buffered per subscriber before the oldest are overwritten.
pub const EVENT_CAPACITY: usize = 256;

/// Events emitted by a dispatcher.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// First frame written. Fires once.
    Start,
    /// Speaking flag changed.
    Speaking(bool),
    /// Diagnostic message. Non-fatal.
    Debug(String),
    /// A single frame could not be sealed and was dropped. Non-fatal.
    Error(ProtocolError),
    /// Fatal source failure; the dispatcher is torn down after this.
    Exception(StreamError),
    /// Volume applied by the source changed.
    VolumeChange { old: f64, new: f64 },
    /// Source ended and trailing silence was sent.
    Finish,
}

/// Fans dispatcher events out to every subscriber.
///
/// Each subscriber sees every event emitted after it subscribed. Events
/// emitted with no subscriber are dropped; a subscriber that falls more than
/// [`EVENT_CAPACITY`] behind loses the oldest ones.
#[derive(Clone)]
pub struct EventEmitter {
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl EventEmitter {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self { event_tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    pub fn emit(&self, event: DispatchEvent) {
        // Err only means nobody is listening.
        let _ = self.event_tx.send(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.emit(DispatchEvent::Debug(message));
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
