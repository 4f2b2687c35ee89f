//! Frame pacing.
//!
//! Deadlines are recomputed from the stream's start instant on every frame
//! instead of chaining fixed 20 ms sleeps, so timer jitter never accumulates.

use std::future;
use std::pin::Pin;

use tokio::time::{sleep_until, Instant, Sleep};

use crate::session::{DispatchSession, PauseKind};

pub struct FrameScheduler;

impl FrameScheduler {
    /// Instant at which the next frame is due.
    ///
    /// `started_at + frame_count * 20ms + hard pause since start`. Silent
    /// pauses keep frames flowing, so `frame_count` already covers them. Returns
    /// `None` while hard-paused; before the first frame the deadline is `now`.
    #[must_use]
    pub fn next_deadline(session: &DispatchSession, now: Instant) -> Option<Instant> {
        if matches!(session.paused, Some(p) if p.kind == PauseKind::Hard) {
            return None;
        }

        match session.started_at {
            Some(start) => Some(start + session.stream_time() + session.schedule_offset()),
            None => Some(now),
        }
    }
}

/// One-shot, cancellable wake-up owned by the engine.
#[derive(Default)]
pub struct WakeHandle {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl WakeHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the wake-up, replacing any pending one.
    pub fn arm(&mut self, deadline: Instant) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Completes at the armed deadline and disarms. Never completes while
    /// disarmed. Dropping the future early leaves the wake-up armed.
    pub async fn fired(&mut self) {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.as_mut().await;
            self.sleep = None;
        } else {
            future::pending::<()>().await;
        }
    }
}
