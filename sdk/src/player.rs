//! Single-slot playback on one voice connection.

use std::sync::Arc;

use tracing::debug;

use crate::config::DispatchOptions;
use crate::connection::{ConnectionState, DispatcherId};
use crate::dispatcher::{Dispatcher, DispatcherHandle, Pacing};
use crate::events::EventEmitter;
use crate::network::Transport;
use crate::source::FrameSource;

/// Plays one source at a time. Starting a new one tears down the previous
/// dispatcher before the new one becomes active.
///
/// Every dispatcher it starts emits onto the player's [`EventEmitter`], so one
/// subscription covers consecutive sources in order.
pub struct Player<T> {
    connection: Arc<ConnectionState>,
    transport: T,
    pacing: Pacing,
    events: EventEmitter,
    options: DispatchOptions,
    current: Option<DispatcherHandle>,
}

impl<T: Transport + Clone> Player<T> {
    pub fn new(connection: Arc<ConnectionState>, transport: T, options: DispatchOptions) -> Self {
        Self {
            connection,
            transport,
            pacing: Pacing::Scheduled,
            events: EventEmitter::new(),
            options,
            current: None,
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// Handle of the dispatcher currently holding the slot, if any.
    pub fn current(&self) -> Option<&DispatcherHandle> {
        self.current.as_ref()
    }

    pub async fn play<S: FrameSource>(&mut self, source: S) -> Dispatcher {
        self.stop().await;

        let id = DispatcherId::next();
        self.connection.activate(id);
        debug!("Player starting dispatcher {}", id);

        let dispatcher = Dispatcher::spawn_with(
            id,
            source,
            self.transport.clone(),
            self.connection.clone(),
            self.pacing.clone(),
            self.events.clone(),
            self.options.clone(),
        );
        self.current = Some(dispatcher.handle());
        dispatcher
    }

    /// Destroys the current dispatcher and waits until it is gone.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            debug!("Player stopping dispatcher {}", handle.id());
            handle.destroy().await;
        }
    }
}
