//! Storage layer for guildlink-daemon
//!
//! Provides persistent storage for linked identities.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{IdentityStorage, StorageResult};
