//! API request handlers

mod health;
mod link;
mod reconcile;

pub use health::*;
pub use link::*;
pub use reconcile::*;
