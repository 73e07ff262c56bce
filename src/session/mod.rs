//! Session lifecycle
//!
//! Models the single process-wide connection to the coordination backend.
//! Store and watch operations are gated on [`SessionState::Connected`].

mod lifecycle;

pub use lifecycle::*;
