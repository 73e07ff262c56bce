use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (must be at least 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given failed attempt (0-based), doubling each time.
    pub fn delay_for(
        &self,
        attempt: usize,
    ) -> Duration {
        let shift = attempt.min(20) as u32;
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.max_retries must be at least 1"
            )));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms must be at least 1ms"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Session handshake (Expired -> Connecting on each retry)
    #[serde(default = "default_connect_policy")]
    pub connect: BackoffPolicy,

    // Watch re-arm after a reload fired
    #[serde(default = "default_rearm_policy")]
    pub rearm: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            connect: default_connect_policy(),
            rearm: default_rearm_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.connect.validate("connect")?;
        self.rearm.validate("rearm")?;
        Ok(())
    }
}

fn default_connect_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        base_delay_ms: 100,
        max_delay_ms: 2000,
    }
}
fn default_rearm_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        base_delay_ms: 20,
        max_delay_ms: 500,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
