use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Address/URL of the coordination backend
    #[serde(default = "default_connect_target")]
    pub connect_target: String,

    /// Upper bound for a single handshake attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Re-run the handshake automatically when the session expires
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_target: default_connect_target(),
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_reconnect: default_auto_reconnect(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_target.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "session.connect_target cannot be empty".into(),
            ));
        }
        if self.connect_timeout_ms < 1 {
            return Err(Error::InvalidConfig(
                "session.connect_timeout_ms must be at least 1ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_connect_target() -> String {
    "inproc://local".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_auto_reconnect() -> bool {
    true
}
