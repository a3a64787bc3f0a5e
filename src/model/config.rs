use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration from config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay between a completion request and its durable commit
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Simulated latency on login and registration
    #[serde(default = "default_auth_delay_ms")]
    pub auth_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            grace_period_ms: default_grace_period_ms(),
            auth_delay_ms: default_auth_delay_ms(),
        }
    }
}

impl TimingConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn auth_delay(&self) -> Duration {
        Duration::from_millis(self.auth_delay_ms)
    }
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_auth_delay_ms() -> u64 {
    500
}
