//! Shared clock for dispatchers that play in lockstep.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::connection::DispatcherId;
use crate::session::FRAME_DURATION;

/// External pacing source. A dispatcher subscribed here pulls one frame per
/// tick instead of running its own scheduler.
pub trait BroadcastLink: Send + Sync {
    fn subscribe(&self, id: DispatcherId) -> Receiver<()>;
    fn remove_subscriber(&self, id: DispatcherId);
}

/// 20 ms ticker fanned out to every subscriber.
///
/// Each subscriber holds at most one pending tick; a slow subscriber skips
/// ticks rather than bursting to catch up.
pub struct BroadcastClock {
    subscribers: Arc<DashMap<DispatcherId, Sender<()>>>,
    task: JoinHandle<()>,
}

impl BroadcastClock {
    #[must_use]
    pub fn start() -> Arc<Self> {
        let subscribers: Arc<DashMap<DispatcherId, Sender<()>>> = Arc::new(DashMap::new());

        let task = tokio::spawn({
            let subscribers = Arc::clone(&subscribers);
            async move {
                let mut ticker = interval(FRAME_DURATION);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    for entry in subscribers.iter() {
                        let _ = entry.value().try_send(());
                    }
                }
            }
        });

        Arc::new(Self { subscribers, task })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl BroadcastLink for BroadcastClock {
    fn subscribe(&self, id: DispatcherId) -> Receiver<()> {
        let (tick_tx, tick_rx) = bounded(1);
        self.subscribers.insert(id, tick_tx);
        debug!("Dispatcher {} subscribed to broadcast", id);
        tick_rx
    }

    fn remove_subscriber(&self, id: DispatcherId) {
        if self.subscribers.remove(&id).is_some() {
            debug!("Dispatcher {} left broadcast", id);
        }
    }
}

impl Drop for BroadcastClock {
    fn drop(&mut self) {
        self.task.abort();
    }
}
