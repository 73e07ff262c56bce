use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Weak;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::DashSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::reloadable::ConfigSnapshot;
use super::reloadable::ConsumerRegistry;
use super::reloadable::Reloadable;
use crate::utils::backoff::retry_with_backoff;
use crate::BackoffPolicy;
use crate::ExpectedVersion;
use crate::NodePath;
use crate::NodeStore;
use crate::Result;
use crate::StoreError;
use crate::SyncConfig;
use crate::WatchRegistry;
use crate::WatchedEvent;
use crate::Watcher;

/// Keeps configuration consumers in step with their nodes.
///
/// Each registered path carries a one-shot watch. When it fires, the watch
/// is armed again and the consumer is reloaded with the latest payload:
///
/// ```text
/// Unarmed --register--> Armed --write--> fired --rearm--> Armed
///                                           \--rearm fails--> pending
/// pending --session Connected--> Armed (+ catch-up reload)
/// ```
#[derive(Clone)]
pub struct ConfigSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: Arc<NodeStore>,
    watches: Arc<WatchRegistry>,
    config: SyncConfig,
    prefix: NodePath,
    rearm_policy: BackoffPolicy,
    reloadables: DashMap<NodePath, Arc<dyn Reloadable>>,
    /// Paths whose watch could not be re-armed yet
    pending_rearm: DashSet<NodePath>,
}

/// Watch callback installed for every registered path
struct ReloadWatcher {
    sync: Weak<SyncInner>,
}

impl Watcher for ReloadWatcher {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        match self.sync.upgrade() {
            Some(inner) => SyncInner::on_fired(&inner, event),
            None => debug!(path = %event.path, "config sync dropped; ignoring watch event"),
        }
    }
}

impl std::fmt::Debug for ConfigSync {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigSync")
            .field("prefix", &self.inner.prefix)
            .field("registered", &self.inner.reloadables.len())
            .field("pending_rearm", &self.inner.pending_rearm.len())
            .finish_non_exhaustive()
    }
}

impl ConfigSync {
    pub fn new(
        store: Arc<NodeStore>,
        watches: Arc<WatchRegistry>,
        config: SyncConfig,
        rearm_policy: BackoffPolicy,
    ) -> Result<Self> {
        let prefix = NodePath::parse(&config.path_prefix)?;
        Ok(Self {
            inner: Arc::new(SyncInner {
                store,
                watches,
                config,
                prefix,
                rearm_policy,
                reloadables: DashMap::new(),
                pending_rearm: DashSet::new(),
            }),
        })
    }

    /// Node path of a consumer: `<path_prefix>/<identity>`.
    pub fn config_path(
        &self,
        identity: &str,
    ) -> Result<NodePath> {
        self.inner.prefix.join(identity)
    }

    /// Creates every missing node on the way to `path`, root to leaf.
    ///
    /// Missing nodes get `default_data` as placeholder payload. Returns the
    /// paths that were created; already existing nodes are skipped.
    pub fn ensure_path(
        &self,
        path: &str,
        default_data: impl Into<Bytes>,
    ) -> Result<Vec<NodePath>> {
        self.inner.ensure_path(&NodePath::parse(path)?, default_data.into())
    }

    /// Makes `reloadable` follow the node at `path`.
    ///
    /// Ensures the path exists, arms a watch and returns the current
    /// payload. The consumer is not reloaded here, only on later changes.
    pub fn register_reloadable(
        &self,
        path: &str,
        reloadable: Arc<dyn Reloadable>,
    ) -> Result<ConfigSnapshot> {
        let path = NodePath::parse(path)?;
        info!(path = %path, "register config start");

        let result = self.inner.register(&path, reloadable);
        match &result {
            Ok(snapshot) => info!(
                path = %path,
                version = snapshot.version,
                data = %snapshot.data_utf8(),
                "register config success"
            ),
            Err(e) => error!(path = %path, error = %e, "register config error"),
        }
        result
    }

    /// Registers every consumer under `<path_prefix>/<identity>`.
    ///
    /// Stops at the first failure. Returns the number of consumers registered.
    pub fn bootstrap(
        &self,
        consumers: &ConsumerRegistry,
    ) -> Result<usize> {
        for (identity, reloadable) in consumers.iter() {
            let path = self.config_path(identity)?;
            self.register_reloadable(path.as_str(), Arc::clone(reloadable))?;
        }
        info!(consumers = consumers.len(), prefix = %self.inner.prefix, "config consumers bootstrapped");
        Ok(consumers.len())
    }

    /// Stops following `path`. Returns whether it was registered.
    pub fn deregister(
        &self,
        path: &str,
    ) -> bool {
        self.inner.pending_rearm.remove(path);
        let removed = self.inner.reloadables.remove(path).is_some();
        if removed {
            self.inner.watches.disarm(path);
            info!(path = %path, "config deregistered");
        }
        removed
    }

    /// Unconditional write of a new payload. Returns the new version.
    ///
    /// Any failure is surfaced as `Error::ConfigUpdate` carrying the path.
    pub fn update_config(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<u64> {
        self.update_config_checked(path, data, ExpectedVersion::Any)
    }

    /// Version-checked variant of [`ConfigSync::update_config`].
    pub fn update_config_checked(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        self.inner.store.write(path, data, expected).map_err(|e| {
            error!(path = %path, error = %e, "updateConfig error");
            e.into_config_update(path)
        })
    }

    pub fn read_config(
        &self,
        path: &str,
    ) -> Result<ConfigSnapshot> {
        let path = NodePath::parse(path)?;
        self.inner.read(&path)
    }

    /// Payload as a string; an empty node yields an empty string.
    pub fn read_config_string(
        &self,
        path: &str,
    ) -> Result<String> {
        Ok(self.read_config(path)?.data_utf8().into_owned())
    }

    /// Removes a config node regardless of its version.
    pub fn delete_config(
        &self,
        path: &str,
    ) -> Result<()> {
        self.inner.store.delete(path, ExpectedVersion::Any)
    }

    pub fn list_children(
        &self,
        path: &str,
    ) -> Result<BTreeSet<String>> {
        self.inner.store.list_children(path)
    }

    pub fn get_child_count(
        &self,
        path: &str,
    ) -> Result<usize> {
        Ok(self.inner.store.stat(path)?.num_children)
    }

    /// Creation time of the node in ms since Unix epoch
    pub fn get_creation_time(
        &self,
        path: &str,
    ) -> Result<u64> {
        Ok(self.inner.store.stat(path)?.ctime_ms)
    }

    /// Re-arms every path whose re-arm failed earlier, reloading each
    /// consumer once since changes may have been missed meanwhile.
    ///
    /// Returns how many paths are still pending.
    pub fn rearm_pending(&self) -> usize {
        SyncInner::rearm_pending(&self.inner)
    }

    pub fn is_registered(
        &self,
        path: &str,
    ) -> bool {
        self.inner.reloadables.contains_key(path)
    }

    pub fn registered_paths(&self) -> Vec<NodePath> {
        let mut paths: Vec<NodePath> = self.inner.reloadables.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    #[cfg(test)]
    pub(crate) fn park(
        &self,
        path: NodePath,
    ) {
        self.inner.park(path)
    }

    pub fn pending_rearm_count(&self) -> usize {
        self.inner.pending_rearm.len()
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.inner.store
    }

    pub fn watches(&self) -> &Arc<WatchRegistry> {
        &self.inner.watches
    }
}

impl SyncInner {
    fn ensure_path(
        &self,
        path: &NodePath,
        default_data: Bytes,
    ) -> Result<Vec<NodePath>> {
        let mut created = Vec::new();
        for segment in path.ancestors() {
            if self.store.exists(segment.as_str())?.is_some() {
                continue;
            }
            match self.store.create(segment.as_str(), default_data.clone()) {
                Ok(_) => {
                    debug!(path = %segment, "ensure_path created node");
                    created.push(segment);
                }
                // Lost a race with a concurrent creator
                Err(crate::Error::Store(StoreError::NodeExists(_))) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    fn register(
        self: &Arc<Self>,
        path: &NodePath,
        reloadable: Arc<dyn Reloadable>,
    ) -> Result<ConfigSnapshot> {
        self.ensure_path(path, Bytes::from(self.config.default_payload.clone()))?;
        self.reloadables.insert(path.clone(), reloadable);
        self.pending_rearm.remove(path);

        match self.arm_and_read(path) {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => {
                self.abandon(path);
                Err(StoreError::NoNode(path.to_string()).into())
            }
            Err(e) => {
                self.abandon(path);
                Err(e)
            }
        }
    }

    fn abandon(
        &self,
        path: &NodePath,
    ) {
        self.reloadables.remove(path);
        self.watches.disarm(path.as_str());
    }

    fn read(
        &self,
        path: &NodePath,
    ) -> Result<ConfigSnapshot> {
        let (data, stat) = self.store.read(path.as_str())?;
        Ok(ConfigSnapshot {
            path: path.clone(),
            data,
            version: stat.version,
        })
    }

    /// Arms the watch, then reads. Any write after the arm fires the new
    /// watch, and the read reflects every write before it, so arm plus read
    /// observes the node without a gap. `None` if the node is gone; the
    /// watch then fires on re-creation.
    fn arm_and_read(
        self: &Arc<Self>,
        path: &NodePath,
    ) -> Result<Option<ConfigSnapshot>> {
        self.watches.arm(
            path.as_str(),
            ReloadWatcher {
                sync: Arc::downgrade(self),
            },
        )?;
        match self.read(path) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.is_no_node() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn on_fired(
        self: &Arc<Self>,
        event: WatchedEvent,
    ) {
        let path = event.path;
        let Some(reloadable) = self.reloadables.get(&path).map(|r| Arc::clone(r.value())) else {
            debug!(path = %path, "watch fired for deregistered config");
            return;
        };
        debug!(path = %path, kind = ?event.kind, version = event.version, "config watch fired");

        let label = format!("rearm config watch on {path}");
        match retry_with_backoff(&self.rearm_policy, &label, |_| self.arm_and_read(&path)) {
            Ok(Some(snapshot)) => {
                info!(path = %path, version = snapshot.version, "reloading config");
                reloadable.reload(&snapshot);
            }
            Ok(None) => {
                warn!(path = %path, "config node removed; waiting for it to be recreated");
            }
            Err(e) => {
                error!(path = %path, error = %e, "config watch could not be re-armed; parked until session reconnects");
                self.park(path);
            }
        }
    }

    /// Parks `path` for re-arm. If the session is already back, the
    /// `Connected` sweep may have run before the insert, so sweep here.
    fn park(
        self: &Arc<Self>,
        path: NodePath,
    ) {
        self.pending_rearm.insert(path);
        if self.store.session().is_connected() {
            let still_pending = self.rearm_pending();
            if still_pending > 0 {
                warn!(still_pending, "config watches still waiting to be re-armed");
            }
        }
    }

    fn rearm_pending(self: &Arc<Self>) -> usize {
        let pending: Vec<NodePath> = self.pending_rearm.iter().map(|p| p.key().clone()).collect();
        for path in pending {
            let Some(reloadable) = self.reloadables.get(&path).map(|r| Arc::clone(r.value())) else {
                self.pending_rearm.remove(&path);
                continue;
            };
            match self.arm_and_read(&path) {
                Ok(snapshot) => {
                    self.pending_rearm.remove(&path);
                    info!(path = %path, "pending config watch re-armed");
                    if let Some(snapshot) = snapshot {
                        reloadable.reload(&snapshot);
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "pending config watch still not re-armed"),
            }
        }
        self.pending_rearm.len()
    }
}
