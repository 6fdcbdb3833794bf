//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::scheduler::{Scheduler, Upstreams};
use crate::storage::{IdentityStorage, InMemoryStorage, PostgresStorage};
use crate::upstream::{DiscordGuildClient, DiscordOAuthClient, HttpValidationClient};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// guildlink daemon server
pub struct Server {
    config: DaemonConfig,
    upstreams: Upstreams,
    scheduler: Arc<Scheduler>,
}

impl Server {
    /// Build storage, clients and the scheduler from configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage: Arc<dyn IdentityStorage> = match &config.storage {
            StorageConfig::Memory => {
                tracing::warn!("Using in-memory storage, linked identities are lost on restart");
                Arc::new(InMemoryStorage::new())
            }
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                tracing::info!(max_connections, "Connecting to PostgreSQL");
                Arc::new(PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?)
            }
        };

        let upstreams = Upstreams {
            storage,
            validator: Arc::new(HttpValidationClient::new(&config.validation)?),
            tokens: Arc::new(DiscordOAuthClient::new(&config.discord)?),
            guild: Arc::new(DiscordGuildClient::new(&config.discord)?),
        };

        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            config.discord.evict_on_revoked_token,
            upstreams.clone(),
        );

        Ok(Self {
            config,
            upstreams,
            scheduler,
        })
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(
            self.upstreams.storage.clone(),
            self.scheduler.clone(),
            self.upstreams.tokens.clone(),
            self.upstreams.guild.clone(),
            self.config.discord.guild_roles.clone(),
            &self.config.server.session_key,
            Duration::from_secs(self.config.server.request_timeout_secs),
        );
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("guildlink daemon listening on {}", addr);

        let scheduler_task = self.scheduler.start()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        let mut drain_rx = shutdown_rx.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.wait_for(|stop| *stop).await;
            })
            .into_future();

        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let mut grace_rx = shutdown_rx;
        let drain_deadline = async move {
            let _ = grace_rx.wait_for(|stop| *stop).await;
            tokio::time::sleep(grace).await;
        };

        let served = tokio::select! {
            result = server => result.map_err(|e| DaemonError::Server(e.to_string())),
            _ = drain_deadline => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Open connections did not drain in time, closing them"
                );
                Ok(())
            }
        };

        tracing::info!("guildlink daemon shutting down");

        self.scheduler.stop();
        if let Err(e) = scheduler_task.await {
            tracing::error!(error = %e, "Scheduler task ended abnormally");
        }

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
