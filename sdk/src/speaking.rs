/// Speaking flag with transition-only reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakingTracker {
    speaking: bool,
}

impl SpeakingTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Stores `value`. Returns `true` if it changed, i.e. an event is due.
    pub fn set(&mut self, value: bool) -> bool {
        let changed = self.speaking != value;
        self.speaking = value;
        changed
    }
}
