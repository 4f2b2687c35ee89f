//! Outbound voice dispatch: one engine task per stream, driven through handles.

mod engine;
mod handle;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::broadcast::BroadcastLink;
use crate::config::DispatchOptions;
use crate::connection::{DispatcherId, VoiceConnection};
use crate::error::DispatchError;
use crate::events::EventEmitter;
use crate::network::Transport;
use crate::source::FrameSource;

use engine::DispatchEngine;
pub use handle::DispatcherHandle;

/// What decides when the next frame is pulled.
#[derive(Clone)]
pub enum Pacing {
    /// Own 20 ms scheduler anchored at the first frame.
    Scheduled,
    /// One frame per tick of a shared clock.
    Broadcast(Arc<dyn BroadcastLink>),
}

/// A running dispatcher task.
pub struct Dispatcher {
    handle: DispatcherHandle,
    task: JoinHandle<Result<(), DispatchError>>,
}

impl Dispatcher {
    /// Spawns a self-paced dispatcher with a fresh id and its own event
    /// emitter. Subscribe through [`DispatcherHandle::subscribe`].
    pub fn spawn<S, T>(
        source: S,
        transport: T,
        connection: Arc<dyn VoiceConnection>,
        options: DispatchOptions,
    ) -> Self
    where
        S: FrameSource,
        T: Transport,
    {
        Self::spawn_with(
            DispatcherId::next(),
            source,
            transport,
            connection,
            Pacing::Scheduled,
            EventEmitter::new(),
            options,
        )
    }

    /// Spawns onto `events`; subscribers registered beforehand see every
    /// event including the first `Start`.
    pub fn spawn_with<S, T>(
        id: DispatcherId,
        source: S,
        transport: T,
        connection: Arc<dyn VoiceConnection>,
        pacing: Pacing,
        events: EventEmitter,
        options: DispatchOptions,
    ) -> Self
    where
        S: FrameSource,
        T: Transport,
    {
        let (command_tx, command_rx) = async_channel::bounded(options.command_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let broadcast = match pacing {
            Pacing::Scheduled => None,
            Pacing::Broadcast(link) => Some(link),
        };

        let engine = DispatchEngine::new(
            id,
            source,
            transport,
            connection,
            broadcast,
            events.clone(),
            shutdown_rx,
            options,
        );
        let handle = DispatcherHandle::new(id, command_tx, engine.status(), shutdown_tx, events);
        let task = tokio::spawn(engine.run(command_rx));

        Self { handle, task }
    }

    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.handle.id()
    }

    /// A cloneable handle for controlling the running dispatcher.
    #[must_use]
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Waits for the task to end and returns its terminal result.
    pub async fn finished(self) -> Result<(), DispatchError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Dispatcher {} task failed: {}", self.handle.id(), e);
                Err(DispatchError::Destroyed)
            }
        }
    }
}
