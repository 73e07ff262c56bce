//! Configuration change propagation
//!
//! Glue between config consumers and the node store: ensure a consumer's
//! node exists, watch it, and reload the consumer whenever it changes.

mod config_sync;
mod reloadable;

pub use config_sync::*;
pub use reloadable::*;
