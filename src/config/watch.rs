use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch delivery configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Name given to the background dispatcher thread
    ///
    /// **Default**: `confsync-watch`
    #[serde(default = "default_dispatcher_thread_name")]
    pub dispatcher_thread_name: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dispatcher_thread_name: default_dispatcher_thread_name(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher_thread_name.is_empty() {
            return Err(Error::InvalidConfig(
                "watch.dispatcher_thread_name cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_dispatcher_thread_name() -> String {
    "confsync-watch".to_string()
}
