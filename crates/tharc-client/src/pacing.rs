//! Per-request pacing.

use std::time::Duration;

use rand::Rng;

/// Uniform delay draw applied after every API attempt.
#[derive(Debug, Clone)]
pub struct Pacing {
    min_ms: u64,
    max_ms: u64,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_ms = min.as_millis() as u64;
        let max_ms = max.as_millis() as u64;
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// No pacing at all. Test configurations use this.
    pub fn zero() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Draws one delay from the configured range.
    pub fn draw(&self) -> Duration {
        if self.max_ms == self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

impl Default for Pacing {
    /// 1–3 s between requests.
    fn default() -> Self {
        Self { min_ms: 1000, max_ms: 3000 }
    }
}
