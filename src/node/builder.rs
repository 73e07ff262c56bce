//! A builder for assembling a [`ConfNode`].
//!
//! ## Example
//! ```ignore
//! let node = ConfNodeBuilder::new(ConfSyncConfig::new()?)
//!     .connector(Arc::new(InProcessConnector))  // Optional override
//!     .build()?;
//! node.start(&consumers).await?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::ConfNode;
use crate::ConfSyncConfig;
use crate::ConfigSync;
use crate::Connector;
use crate::InProcessConnector;
use crate::NodeStore;
use crate::Result;
use crate::Session;
use crate::WatchRegistry;

pub struct ConfNodeBuilder {
    config: ConfSyncConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ConfNodeBuilder {
    pub fn new(config: ConfSyncConfig) -> Self {
        Self {
            config,
            connector: None,
        }
    }

    /// Overrides the default in-process handshake.
    pub fn connector(
        mut self,
        connector: Arc<dyn Connector>,
    ) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validates the configuration and wires the components together.
    ///
    /// Nothing is started yet; see [`ConfNode::start`].
    pub fn build(self) -> Result<ConfNode> {
        let config = self.config.validate()?;
        let connector = self.connector.unwrap_or_else(|| Arc::new(InProcessConnector));

        let session = Arc::new(Session::new(config.session.clone(), config.retry.connect, connector));
        let watches = Arc::new(WatchRegistry::new(session.clone(), config.watch.clone()));
        let store = Arc::new(NodeStore::new(session.clone(), watches.clone()));
        let sync = ConfigSync::new(store.clone(), watches.clone(), config.sync.clone(), config.retry.rearm)?;

        debug!(?config, "conf node assembled");
        Ok(ConfNode::new(Arc::new(config), session, watches, store, sync))
    }
}
