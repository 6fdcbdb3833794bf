//! REST API implementation

pub mod handlers;
pub mod router;
pub mod session;
pub mod state;
