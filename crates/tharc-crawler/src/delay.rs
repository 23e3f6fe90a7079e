//! Inter-uploader delay policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::SwitchConfig;

/// Adaptive delay between uploaders.
///
/// The producer records how many videos the finished uploader listed; the
/// orchestrator reads one delay before moving on. Bigger catalogs mean more
/// requests were just fired at the remote, so the pause scales with the
/// count, capped and jittered.
pub struct SwitchDelay {
    config: SwitchConfig,
    last_video_count: AtomicU64,
}

impl SwitchDelay {
    pub fn new(config: SwitchConfig) -> Self {
        Self {
            config,
            last_video_count: AtomicU64::new(0),
        }
    }

    /// Called by the producer once the listing total is known.
    pub fn record_video_count(&self, count: u64) {
        self.last_video_count.store(count, Ordering::Relaxed);
    }

    /// Draws the delay to sleep before the next uploader.
    pub fn next_delay(&self) -> Duration {
        let count = self.last_video_count.load(Ordering::Relaxed);
        let dynamic = count as f64 * self.config.factor_per_video;
        let capped = (self.config.base_delay + dynamic).min(self.config.max_delay);
        let jitter = capped * self.config.jitter_ratio;
        let jittered = if jitter > 0.0 {
            capped + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            capped
        };
        let seconds = jittered.max(0.0);

        debug!(
            count,
            base = self.config.base_delay,
            dynamic,
            capped,
            jitter,
            seconds,
            "computed uploader switch delay"
        );
        Duration::from_secs_f64(seconds)
    }
}
