use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::node::Node;
use super::node::NodeStat;
use super::path::NodePath;
use crate::Result;
use crate::Session;
use crate::StoreError;
use crate::WatchEventKind;
use crate::WatchRegistry;

/// Expected version for a conditional write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the version check
    Any,
    /// Succeed only if the node is currently at this version
    Exact(u64),
}

impl From<u64> for ExpectedVersion {
    fn from(version: u64) -> Self {
        ExpectedVersion::Exact(version)
    }
}

impl ExpectedVersion {
    fn check(
        self,
        path: &NodePath,
        actual: u64,
    ) -> Result<()> {
        match self {
            ExpectedVersion::Exact(expected) if expected != actual => Err(StoreError::VersionMismatch {
                path: path.to_string(),
                expected,
                actual,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

/// In-memory hierarchical tree of versioned nodes.
///
/// All mutations take the tree's write lock, so operations on any path are
/// linearized and a read always observes the latest committed value. Watches
/// are fired while the lock is still held, which keeps per-path delivery in
/// write order.
///
/// Operations fail fast with `NotConnected` while the session is not
/// `Connected`; await [`Session::wait_connected`] before the first one.
pub struct NodeStore {
    nodes: RwLock<HashMap<NodePath, Node>>,
    session: Arc<Session>,
    watches: Arc<WatchRegistry>,
}

impl std::fmt::Debug for NodeStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("nodes", &self.nodes.read().len())
            .finish_non_exhaustive()
    }
}

impl NodeStore {
    pub fn new(
        session: Arc<Session>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodePath::root(), Node::new(Bytes::new()));
        Self {
            nodes: RwLock::new(nodes),
            session,
            watches,
        }
    }

    /// Creates a node; its parent must already exist.
    ///
    /// Returns the initial version (always 0).
    pub fn create(
        &self,
        path: &str,
        data: impl Into<Bytes>,
    ) -> Result<u64> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;
        let parent = path.parent().ok_or_else(|| StoreError::NodeExists(path.to_string()))?;

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&path) {
            return Err(StoreError::NodeExists(path.to_string()).into());
        }
        let parent_node = nodes
            .get_mut(&parent)
            .ok_or_else(|| StoreError::NoParent(path.to_string()))?;
        parent_node.children.insert(path.name().to_string());

        let node = Node::new(data.into());
        let version = node.version;
        nodes.insert(path.clone(), node);

        debug!(path = %path, "node created");
        self.watches.fire(&path, WatchEventKind::NodeCreated, version);
        Ok(version)
    }

    /// Returns the payload and metadata of a node.
    pub fn read(
        &self,
        path: &str,
    ) -> Result<(Bytes, NodeStat)> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        trace!(path = %path, version = node.version, "node read");
        Ok((node.data.clone(), node.stat()))
    }

    /// Replaces the payload if `expected` matches, returning the new version.
    ///
    /// On mismatch the node is left untouched.
    pub fn write(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;

        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        expected.check(&path, node.version)?;
        let version = node.update(data.into());

        debug!(path = %path, version, "node written");
        self.watches.fire(&path, WatchEventKind::NodeDataChanged, version);
        Ok(version)
    }

    /// Removes a leaf node if `expected` matches.
    pub fn delete(
        &self,
        path: &str,
        expected: ExpectedVersion,
    ) -> Result<()> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;
        let Some(parent) = path.parent() else {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "the root node cannot be deleted",
            }
            .into());
        };

        let mut nodes = self.nodes.write();
        let node = nodes.get(&path).ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        expected.check(&path, node.version)?;
        if !node.children.is_empty() {
            return Err(StoreError::HasChildren(path.to_string()).into());
        }
        let version = node.version;

        nodes.remove(&path);
        if let Some(parent_node) = nodes.get_mut(&parent) {
            parent_node.children.remove(path.name());
        }

        debug!(path = %path, "node deleted");
        self.watches.fire(&path, WatchEventKind::NodeDeleted, version);
        Ok(())
    }

    /// Names of the direct children, in lexical order.
    pub fn list_children(
        &self,
        path: &str,
    ) -> Result<BTreeSet<String>> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        Ok(node.children.clone())
    }

    /// Metadata of the node, or `None` if it does not exist.
    pub fn exists(
        &self,
        path: &str,
    ) -> Result<Option<NodeStat>> {
        self.session.ensure_connected()?;
        let path = NodePath::parse(path)?;
        Ok(self.nodes.read().get(&path).map(Node::stat))
    }

    pub fn stat(
        &self,
        path: &str,
    ) -> Result<NodeStat> {
        self.exists(path)?
            .ok_or_else(|| StoreError::NoNode(path.to_string()).into())
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
