use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::Instant;

use crate::connection::DispatcherId;
use crate::error::DispatchError;
use crate::events::{DispatchEvent, EventEmitter};
use crate::session::DispatchSession;

/// Requests from handles to the engine task.
pub(crate) enum Command {
    Pause { silence: bool },
    Resume,
    SetVolume { volume: f64, reply: oneshot::Sender<bool> },
    SetBitrate { bits_per_second: u32, reply: oneshot::Sender<bool> },
    SetFec { enabled: bool, reply: oneshot::Sender<bool> },
    SetPlp { percent: u8, reply: oneshot::Sender<bool> },
}

/// Cloneable control surface of a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    id: DispatcherId,
    commands: Sender<Command>,
    status: watch::Receiver<DispatchSession>,
    shutdown: Arc<watch::Sender<bool>>,
    events: EventEmitter,
}

impl DispatcherHandle {
    pub(crate) fn new(
        id: DispatcherId,
        commands: Sender<Command>,
        status: watch::Receiver<DispatchSession>,
        shutdown: watch::Sender<bool>,
        events: EventEmitter,
    ) -> Self {
        Self {
            id,
            commands,
            status,
            shutdown: Arc::new(shutdown),
            events,
        }
    }

    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.id
    }

    /// New subscriber that sees every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Pause. With `silence`, silence frames keep sequence and timestamp moving.
    ///
    /// # Errors
    /// Returns [`DispatchError::Destroyed`] if the dispatcher is gone.
    pub async fn pause(&self, silence: bool) -> Result<(), DispatchError> {
        self.send(Command::Pause { silence }).await
    }

    /// Resume. A no-op when not paused.
    ///
    /// # Errors
    /// Returns [`DispatchError::Destroyed`] if the dispatcher is gone.
    pub async fn resume(&self) -> Result<(), DispatchError> {
        self.send(Command::Resume).await
    }

    /// Returns whether the source accepted the volume.
    pub async fn set_volume(&self, volume: f64) -> bool {
        self.request(|reply| Command::SetVolume { volume, reply }).await
    }

    /// Returns whether the source's encoder accepted the bitrate.
    pub async fn set_bitrate(&self, bits_per_second: u32) -> bool {
        self.request(|reply| Command::SetBitrate {
            bits_per_second,
            reply,
        })
        .await
    }

    /// Returns whether the source's encoder accepted the FEC setting.
    pub async fn set_fec(&self, enabled: bool) -> bool {
        self.request(|reply| Command::SetFec { enabled, reply }).await
    }

    /// Returns whether the source's encoder accepted the expected loss.
    pub async fn set_plp(&self, percent: u8) -> bool {
        self.request(|reply| Command::SetPlp { percent, reply }).await
    }

    /// Tears the dispatcher down and waits until it stopped. Safe to repeat.
    ///
    /// Bypasses the command queue, so a full queue or a send blocked on the
    /// transport cannot hold it up.
    pub async fn destroy(&self) {
        self.shutdown.send_replace(true);
        self.closed().await;
    }

    /// Waits until the engine task has stopped.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }

    /// Latest published session state.
    #[must_use]
    pub fn session(&self) -> DispatchSession {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.status.borrow().is_paused()
    }

    #[must_use]
    pub fn stream_time(&self) -> Duration {
        self.status.borrow().stream_time()
    }

    #[must_use]
    pub fn total_stream_time(&self) -> Duration {
        self.status.borrow().total_stream_time(Instant::now())
    }

    #[must_use]
    pub fn total_pause_time(&self) -> Duration {
        self.status.borrow().total_pause_time(Instant::now())
    }

    #[must_use]
    pub fn stream_time_ms(&self) -> u64 {
        as_millis(self.stream_time())
    }

    #[must_use]
    pub fn total_stream_time_ms(&self) -> u64 {
        as_millis(self.total_stream_time())
    }

    #[must_use]
    pub fn total_pause_time_ms(&self) -> u64 {
        as_millis(self.total_pause_time())
    }

    async fn send(&self, command: Command) -> Result<(), DispatchError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DispatchError::Destroyed)
    }

    async fn request(&self, command: impl FnOnce(oneshot::Sender<bool>) -> Command) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.send(command(reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
