//! One-shot watch registrations
//!
//! A watch is armed on a node path and fires at most once, on the next
//! write or delete of that path. After firing it must be armed again to
//! keep observing; writes landing in between produce no notification.
//!
//! Fired callbacks run on a dedicated dispatcher thread, in fire order.

mod registry;

pub use registry::*;

#[cfg(test)]
mod registry_test;
