/// Decides whether the user is away from the keyboard.
#[derive(Debug, Clone, Copy)]
pub struct AfkEvaluator {
    threshold_ms: u32,
}

impl AfkEvaluator {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self {
            threshold_ms: threshold_s.saturating_mul(1000),
        }
    }

    /// `idle_time` is in milliseconds.
    pub fn is_afk(&self, idle_time: u32) -> bool {
        idle_time > self.threshold_ms
    }
}
