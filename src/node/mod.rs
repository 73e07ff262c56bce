//! Process-wide node handle
//!
//! [`ConfNode`] owns the session, the node store, the watch registry and the
//! config sync layer. It is a scoped resource: acquired by
//! [`ConfNode::start`], released by [`ConfNode::shutdown`] or on drop,
//! including when startup itself fails.

mod builder;
mod node;

pub use builder::*;
pub use node::*;
