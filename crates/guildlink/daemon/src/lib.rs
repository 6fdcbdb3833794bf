//! guildlink daemon library
//!
//! Keeps a Discord guild's membership in line with EVE character standing:
//! - Periodic validation of linked characters against the validation server
//! - Daily Discord OAuth2 token refresh
//! - The Discord account linking handshake
//! - Storage backends for linked identities

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod upstream;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, SchedulerError, StorageError, UpstreamError};
pub use scheduler::{ReconcilerStatus, Scheduler, Upstreams};
pub use server::Server;
pub use storage::{IdentityStorage, InMemoryStorage, PostgresStorage};
