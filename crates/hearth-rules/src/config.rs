//! Runtime configuration for the rule engine and its supporting services.

use std::time::Duration;

/// Tunables for [`crate::engine::RuleEngine`], [`crate::handler::RuleHandler`], and the audit
/// sink. Defaults are conservative enough for a single-hub deployment; override from environment
/// or a config file as the surrounding application sees fit.
#[derive(Debug, Clone)]
pub struct HearthConfig {
    /// Maximum number of device events the engine may be processing concurrently. Bounds the
    /// number of in-flight bulk-attribute reads and command dispatches under event bursts.
    pub max_concurrent_events: usize,

    /// Number of device ids fetched per `get_bulk_attributes` round trip when a newly registered
    /// condition subtree spans more devices than this.
    pub bulk_fetch_chunk_size: usize,

    /// Capacity of the bounded channel backing the audit log sink. Once full, `log_event` drops
    /// the oldest queued event rather than blocking the caller.
    pub audit_queue_capacity: usize,

    /// Default `duration` applied to `wait_for`/`wait_until` helpers when the caller does not
    /// specify one explicitly.
    pub default_condition_timeout: Option<Duration>,

    /// Delay between the two retry attempts a scheduled rule makes when its computed next run
    /// time has already passed, before giving up and terminating that schedule.
    pub scheduled_rule_retry_delay: Duration,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            max_concurrent_events: 64,
            bulk_fetch_chunk_size: 200,
            audit_queue_capacity: 1024,
            default_condition_timeout: None,
            scheduled_rule_retry_delay: Duration::from_secs(1),
        }
    }
}

impl HearthConfig {
    /// Load overrides from the environment, falling back to [`HearthConfig::default`] for any
    /// variable that is unset or fails to parse.
    ///
    /// Recognizes `HEARTH_MAX_CONCURRENT_EVENTS`, `HEARTH_BULK_FETCH_CHUNK_SIZE`,
    /// `HEARTH_AUDIT_QUEUE_CAPACITY`, `HEARTH_DEFAULT_CONDITION_TIMEOUT_SECS`, and
    /// `HEARTH_SCHEDULED_RULE_RETRY_DELAY_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_events: env_parsed("HEARTH_MAX_CONCURRENT_EVENTS")
                .unwrap_or(defaults.max_concurrent_events),
            bulk_fetch_chunk_size: env_parsed("HEARTH_BULK_FETCH_CHUNK_SIZE")
                .unwrap_or(defaults.bulk_fetch_chunk_size),
            audit_queue_capacity: env_parsed("HEARTH_AUDIT_QUEUE_CAPACITY")
                .unwrap_or(defaults.audit_queue_capacity),
            default_condition_timeout: env_parsed::<u64>("HEARTH_DEFAULT_CONDITION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .or(defaults.default_condition_timeout),
            scheduled_rule_retry_delay: env_parsed::<u64>("HEARTH_SCHEDULED_RULE_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.scheduled_rule_retry_delay),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
