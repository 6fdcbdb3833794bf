//! HTTP API for the guildlink daemon

pub mod rest;

pub use rest::router::create_router;
