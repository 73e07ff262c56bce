use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::NodePath;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Parent path under which every consumer's config node lives
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Placeholder payload for nodes created by `ensure_path`
    #[serde(default = "default_payload")]
    pub default_payload: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            default_payload: default_payload(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        NodePath::validate(&self.path_prefix)
            .map_err(|e| Error::InvalidConfig(format!("sync.path_prefix: {e}")))
    }
}

fn default_path_prefix() -> String {
    "/config".to_string()
}
fn default_payload() -> String {
    "config".to_string()
}
