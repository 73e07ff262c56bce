//! Hierarchical node store
//!
//! Owns every node of the tree. Each node holds a byte payload and a version
//! counter that starts at 0 and advances by exactly one per successful write.
//! Writes and deletes are version checked (pass [`ExpectedVersion::Any`] to
//! skip the check) and fire any watch armed on the affected path.

mod node;
mod node_store;
mod path;

pub use node::NodeStat;
pub use node_store::*;
pub use path::*;
