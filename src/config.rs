use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

use crate::aggregate::DisagreementPolicy;

/// Default values for configuration
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_EVENT_BUFFER: usize = 256;
const CONFIG_FILE: &str = "config/orders";
const ENV_PREFIX: &str = "ORDERS";

/// Core configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// How long a mutation may wait on an order's advisory lock before
    /// failing with `ConcurrentModification`.
    #[serde(default = "default_lock_timeout_ms")]
    #[validate(range(min = 1))]
    pub lock_timeout_ms: u64,

    /// Bounded capacity of the event bus.
    #[serde(default = "default_event_buffer")]
    #[validate(range(min = 1))]
    pub event_buffer: usize,

    /// Rule for the order main state when active bookings disagree outside
    /// the reserved/non-reserved conflict.
    #[serde(default)]
    pub disagreement_policy: DisagreementPolicy,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            disagreement_policy: DisagreementPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration by layering an optional `config/orders.*` file and
    /// `ORDERS_*` environment variables over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        let cfg: CoreConfig = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
