//! Crawler configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Inter-uploader delay parameters, all in seconds.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    /// Floor applied before the dynamic share
    pub base_delay: f64,
    /// Cap on base + dynamic
    pub max_delay: f64,
    /// Seconds added per video of the previous uploader
    pub factor_per_video: f64,
    /// Uniform jitter as a fraction of the capped delay
    pub jitter_ratio: f64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            base_delay: 30.0,
            max_delay: 300.0,
            factor_per_video: 0.5,
            jitter_ratio: 0.2,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the archive database
    pub db_path: PathBuf,
    /// Worker count and permit count
    pub max_concurrency: usize,
    /// Bounded queue capacity
    pub max_queue_size: usize,
    /// Listing page size
    pub page_size: u32,
    /// Sleep between consecutive listing pages
    pub page_delay: Duration,
    /// Long-interval attempts per listing page
    pub page_retry_times: u32,
    /// Base of the long-interval backoff; attempt n waits `delay * n`
    pub page_retry_delay: Duration,
    /// Inter-uploader delay parameters
    pub switch: SwitchConfig,
    /// Uploader ids seeded into the store at startup
    pub seed_mids: Vec<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tharc.db"),
            max_concurrency: 5,
            max_queue_size: 20,
            page_size: 50,
            page_delay: Duration::from_secs(15),
            page_retry_times: 3,
            page_retry_delay: Duration::from_secs(30),
            switch: SwitchConfig::default(),
            seed_mids: Vec::new(),
        }
    }
}

impl Config {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency),
            max_queue_size: env_parse("MAX_QUEUE_SIZE", defaults.max_queue_size),
            page_size: env_parse("PAGE_SIZE", defaults.page_size),
            page_delay: Duration::from_secs(env_parse(
                "PRODUCER_PAGE_DELAY_SECONDS",
                defaults.page_delay.as_secs(),
            )),
            page_retry_times: env_parse("PAGE_RETRY_TIMES", defaults.page_retry_times),
            page_retry_delay: Duration::from_secs(env_parse(
                "PAGE_RETRY_DELAY_SECONDS",
                defaults.page_retry_delay.as_secs(),
            )),
            switch: SwitchConfig {
                base_delay: env_parse("USER_SWITCH_BASE_DELAY", defaults.switch.base_delay),
                max_delay: env_parse("USER_SWITCH_MAX_DELAY", defaults.switch.max_delay),
                factor_per_video: env_parse(
                    "USER_SWITCH_FACTOR_PER_VIDEO",
                    defaults.switch.factor_per_video,
                ),
                jitter_ratio: env_parse("USER_SWITCH_JITTER_RATIO", defaults.switch.jitter_ratio),
            },
            seed_mids: std::env::var("UP_MIDS")
                .map(|raw| {
                    raw.split(',')
                        .filter_map(|mid| mid.trim().parse().ok())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.max_concurrency > 0);
        assert!(config.max_queue_size >= config.max_concurrency);
        assert_eq!(config.page_size, 50);
    }
}
