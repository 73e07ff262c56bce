use std::collections::BTreeSet;

use bytes::Bytes;

use crate::utils::time::get_now_as_millis;

/// Metadata snapshot of a node, returned alongside reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Starts at 0; incremented by every successful write
    pub version: u64,
    /// Creation time, ms since Unix epoch
    pub ctime_ms: u64,
    /// Last modification time, ms since Unix epoch
    pub mtime_ms: u64,
    pub num_children: usize,
    pub data_length: usize,
}

/// A named entry in the tree. Owned exclusively by [`crate::NodeStore`].
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) data: Bytes,
    pub(crate) version: u64,
    pub(crate) ctime_ms: u64,
    pub(crate) mtime_ms: u64,
    /// Names (last segment) of direct children
    pub(crate) children: BTreeSet<String>,
}

impl Node {
    pub(crate) fn new(data: Bytes) -> Self {
        let now = get_now_as_millis();
        Self {
            data,
            version: 0,
            ctime_ms: now,
            mtime_ms: now,
            children: BTreeSet::new(),
        }
    }

    pub(crate) fn update(
        &mut self,
        data: Bytes,
    ) -> u64 {
        self.data = data;
        self.version += 1;
        self.mtime_ms = get_now_as_millis();
        self.version
    }

    pub(crate) fn stat(&self) -> NodeStat {
        NodeStat {
            version: self.version,
            ctime_ms: self.ctime_ms,
            mtime_ms: self.mtime_ms,
            num_children: self.children.len(),
            data_length: self.data.len(),
        }
    }
}
