//! Per-stream sequencing and timing state.

use std::time::Duration;

use tokio::time::Instant;
use voicecast_protocol::RtpHeader;

/// Audio carried by one frame, in milliseconds.
pub const FRAME_DURATION_MS: u64 = 20;

/// Audio carried by one frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(FRAME_DURATION_MS);

/// RTP timestamp increment per frame (48 kHz clock, 20 ms).
pub const TIMESTAMP_STEP: u32 = 960;

/// How a pause treats the outgoing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// Silence frames keep flowing; sequence and timestamp keep advancing.
    Silent,
    /// Nothing is pulled or sent; sequence and timestamp freeze.
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseState {
    pub since: Instant,
    pub kind: PauseKind,
}

/// State of one outbound voice stream. Only the owning engine mutates it.
#[derive(Debug, Clone, Default)]
pub struct DispatchSession {
    pub sequence: u16,
    pub timestamp: u32,
    pub frame_count: u64,
    pub started_at: Option<Instant>,
    pub paused: Option<PauseState>,
    pub accumulated_pause: Duration,
    pub accumulated_silent_pause: Duration,
    /// Hard pause accrued before the first frame; not part of the schedule.
    pub pause_before_start: Duration,
    pub nonce_counter: u32,
    /// Set once at teardown; wall-clock totals stop here.
    pub ended_at: Option<Instant>,
}

impl DispatchSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start instant. Returns `true` only the first time.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        self.pause_before_start = self.accumulated_pause;
        true
    }

    /// Header for the frame about to be sent.
    #[must_use]
    pub fn header(&self, ssrc: u32) -> RtpHeader {
        RtpHeader::new(self.sequence, self.timestamp, ssrc)
    }

    /// Advances the lite nonce counter and returns the value to use.
    pub fn next_lite_nonce(&mut self) -> u32 {
        self.nonce_counter = self.nonce_counter.wrapping_add(1);
        self.nonce_counter
    }

    /// Moves sequencing past one dispatched frame.
    pub fn advance(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(TIMESTAMP_STEP);
        self.frame_count += 1;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    #[must_use]
    pub fn paused_since(&self) -> Option<Instant> {
        self.paused.map(|p| p.since)
    }

    /// Enters a pause. Returns `false` if already paused.
    pub fn pause(&mut self, now: Instant, kind: PauseKind) -> bool {
        if self.paused.is_some() {
            return false;
        }
        self.paused = Some(PauseState { since: now, kind });
        true
    }

    /// Leaves the pause, crediting its length to the matching total.
    /// Returns `None` if not paused.
    pub fn resume(&mut self, now: Instant) -> Option<(PauseKind, Duration)> {
        let pause = self.paused.take()?;
        let elapsed = now.saturating_duration_since(pause.since);
        match pause.kind {
            PauseKind::Hard => self.accumulated_pause += elapsed,
            PauseKind::Silent => self.accumulated_silent_pause += elapsed,
        }
        Some((pause.kind, elapsed))
    }

    /// Hard pause time since the first frame. Shifts the frame schedule.
    #[must_use]
    pub fn schedule_offset(&self) -> Duration {
        self.accumulated_pause.saturating_sub(self.pause_before_start)
    }

    /// Audio time actually dispatched.
    #[must_use]
    pub fn stream_time(&self) -> Duration {
        Duration::from_millis(self.frame_count.saturating_mul(FRAME_DURATION_MS))
    }

    /// Marks the stream as over. Later calls keep the first instant.
    pub fn end(&mut self, now: Instant) {
        self.ended_at.get_or_insert(now);
    }

    /// Wall-clock time from the first frame until now, or until the end.
    #[must_use]
    pub fn total_stream_time(&self, now: Instant) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        self.started_at
            .map(|start| end.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Hard plus silent pause totals, including a pause still in progress.
    #[must_use]
    pub fn total_pause_time(&self, now: Instant) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        let current = self
            .paused
            .map(|p| end.saturating_duration_since(p.since))
            .unwrap_or_default();
        self.accumulated_pause + self.accumulated_silent_pause + current
    }
}
