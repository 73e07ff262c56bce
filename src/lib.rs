//! # confsync
//!
//! An in-process hierarchical node store with one-shot watches,
//! version-checked writes and a configuration reload protocol on top.
//!
//! ```text
//! consumer --register--> ConfigSync --ensure_path/read--> NodeStore
//!                            |                               |
//!                            +--arm--> WatchRegistry <--fire-+ (on write/delete)
//!                                           |
//!                       dispatcher thread --+--> reload consumer + re-arm
//! ```
//!
//! Every store and watch operation requires the shared [`Session`] to be
//! `Connected`; [`ConfNode`] ties the pieces together as one scoped resource.

mod config;
mod errors;
mod node;
mod session;
mod store;
mod sync;
mod watch;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use node::*;
pub use session::*;
pub use store::*;
pub use sync::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
#[cfg(test)]
mod errors_test;
