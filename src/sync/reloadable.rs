use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::NodePath;

/// Payload and version of a config node as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub path: NodePath,
    pub data: Bytes,
    pub version: u64,
}

impl ConfigSnapshot {
    /// Payload decoded as UTF-8 (invalid sequences replaced).
    pub fn data_utf8(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// A configuration consumer that reloads itself when its node changes.
#[cfg_attr(test, automock)]
pub trait Reloadable: Send + Sync + 'static {
    fn reload(
        &self,
        snapshot: &ConfigSnapshot,
    );
}

impl<F> Reloadable for F
where
    F: Fn(&ConfigSnapshot) + Send + Sync + 'static,
{
    fn reload(
        &self,
        snapshot: &ConfigSnapshot,
    ) {
        self(snapshot)
    }
}

/// Consumers collected at startup, each registering itself explicitly.
///
/// The identity becomes the last segment(s) of the consumer's node path
/// under the configured prefix.
#[derive(Default, Clone)]
pub struct ConsumerRegistry {
    consumers: Vec<(String, Arc<dyn Reloadable>)>,
}

impl std::fmt::Debug for ConsumerRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_list().entries(self.consumers.iter().map(|(id, _)| id)).finish()
    }
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a consumer; a second registration under the same identity replaces the first.
    pub fn register<R: Reloadable>(
        &mut self,
        identity: impl Into<String>,
        reloadable: R,
    ) -> &mut Self {
        self.register_shared(identity, Arc::new(reloadable))
    }

    pub fn register_shared(
        &mut self,
        identity: impl Into<String>,
        reloadable: Arc<dyn Reloadable>,
    ) -> &mut Self {
        let identity = identity.into();
        if let Some(slot) = self.consumers.iter_mut().find(|(id, _)| *id == identity) {
            debug!(identity = %identity, "replacing registered consumer");
            slot.1 = reloadable;
        } else {
            self.consumers.push((identity, reloadable));
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Reloadable>)> {
        self.consumers.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
