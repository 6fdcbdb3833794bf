//! Scheduler and reconciliation passes
//!
//! The scheduler is responsible for:
//! - Periodically validating active identities against the validation server
//! - Periodically refreshing Discord access tokens
//! - Evicting and renaming guild members to match
//!
//! One identity failing never stops the rest of a pass.

mod reconciler;

pub use reconciler::{ReconcilerStatus, Scheduler, Upstreams};
