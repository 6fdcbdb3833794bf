//! Reconciliation loop and scheduler

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::storage::IdentityStorage;
use crate::upstream::{GuildMembership, TokenProvider, ValidationAuthority};
use guildlink_types::{
    CharacterId, LinkedIdentity, PassKind, PassReport, RefreshOutcome, ValidationVerdict,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// External collaborators the scheduler works against
#[derive(Clone)]
pub struct Upstreams {
    pub storage: Arc<dyn IdentityStorage>,
    pub validator: Arc<dyn ValidationAuthority>,
    pub tokens: Arc<dyn TokenProvider>,
    pub guild: Arc<dyn GuildMembership>,
}

/// Snapshot of scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilerStatus {
    pub running: bool,
    pub validation_in_progress: bool,
    pub refresh_in_progress: bool,
    pub last_validation: Option<PassReport>,
    pub last_refresh: Option<PassReport>,
}

/// One failed step of the work applied to a single identity
#[derive(Debug)]
struct StepFailure {
    step: &'static str,
    error: String,
}

impl StepFailure {
    fn new(step: &'static str, error: impl ToString) -> Self {
        Self {
            step,
            error: error.to_string(),
        }
    }
}

type StepResult = Result<(), Vec<StepFailure>>;

/// What started a pass
#[derive(Debug, Clone, Copy)]
enum Firing {
    Validation,
    Refresh,
    /// Catch-up refresh at launch, never evicts
    StartupRefresh,
}

impl Firing {
    fn kind(self) -> PassKind {
        match self {
            Firing::Validation => PassKind::Validation,
            Firing::Refresh | Firing::StartupRefresh => PassKind::Refresh,
        }
    }
}

/// Marks a pass kind as in progress until dropped
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool, kind: PassKind) -> Result<Self, SchedulerError> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::PassInProgress(kind));
        }
        Ok(Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Scheduler state
pub struct Scheduler {
    config: SchedulerConfig,
    evict_on_revoked_token: bool,
    upstreams: Upstreams,
    running: AtomicBool,
    /// Stop signal of the current run, replaced on every start
    stop_signal: Mutex<watch::Sender<bool>>,
    validation_in_progress: AtomicBool,
    refresh_in_progress: AtomicBool,
    last_validation: RwLock<Option<PassReport>>,
    last_refresh: RwLock<Option<PassReport>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        config: SchedulerConfig,
        evict_on_revoked_token: bool,
        upstreams: Upstreams,
    ) -> Arc<Self> {
        let (stop_signal, _) = watch::channel(false);

        Arc::new(Self {
            config,
            evict_on_revoked_token,
            upstreams,
            running: AtomicBool::new(false),
            stop_signal: Mutex::new(stop_signal),
            validation_in_progress: AtomicBool::new(false),
            refresh_in_progress: AtomicBool::new(false),
            last_validation: RwLock::new(None),
            last_refresh: RwLock::new(None),
        })
    }

    /// Start the timers.
    ///
    /// Runs one eviction-free refresh pass immediately (when configured),
    /// then a validation pass and a refresh pass on their own intervals. Each firing
    /// runs in its own task so a slow pass never delays the other timer.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, SchedulerError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }

        // Replacing the sender ends the previous run's loop
        let (stop_tx, mut stop_rx) = watch::channel(false);
        *self.stop_signal() = stop_tx;
        let scheduler = Arc::clone(self);

        let handle = tokio::spawn(async move {
            tracing::info!(
                validation_interval_secs = scheduler.config.validation_interval_secs,
                refresh_interval_secs = scheduler.config.refresh_interval_secs,
                "Scheduler started"
            );

            if scheduler.config.refresh_on_startup {
                scheduler.spawn_pass(Firing::StartupRefresh, stop_rx.clone());
            }

            let validation_every = scheduler.config.validation_interval();
            let refresh_every = scheduler.config.refresh_interval();
            let mut validation = interval_at(Instant::now() + validation_every, validation_every);
            let mut refresh = interval_at(Instant::now() + refresh_every, refresh_every);
            validation.set_missed_tick_behavior(MissedTickBehavior::Delay);
            refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = validation.tick() => scheduler.spawn_pass(Firing::Validation, stop_rx.clone()),
                    _ = refresh.tick() => scheduler.spawn_pass(Firing::Refresh, stop_rx.clone()),
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        });

        Ok(handle)
    }

    /// Stop the timers.
    ///
    /// Passes already running stop at the next identity boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.stop_signal().send_replace(true);
    }

    fn stop_signal(&self) -> MutexGuard<'_, watch::Sender<bool>> {
        self.stop_signal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_signal().subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> ReconcilerStatus {
        ReconcilerStatus {
            running: self.is_running(),
            validation_in_progress: self.validation_in_progress.load(Ordering::Acquire),
            refresh_in_progress: self.refresh_in_progress.load(Ordering::Acquire),
            last_validation: self.last_validation.read().await.clone(),
            last_refresh: self.last_refresh.read().await.clone(),
        }
    }

    /// Run one pass in a task of its own, logging instead of propagating
    fn spawn_pass(self: &Arc<Self>, firing: Firing, stop: watch::Receiver<bool>) {
        let kind = firing.kind();
        let scheduler = Arc::clone(self);
        let pass = tokio::spawn(async move {
            match firing {
                Firing::Validation => scheduler.validation_pass(stop).await,
                Firing::Refresh => {
                    let evict = scheduler.evict_on_revoked_token;
                    scheduler.refresh_pass(evict, stop).await
                }
                Firing::StartupRefresh => scheduler.refresh_pass(false, stop).await,
            }
        });

        tokio::spawn(async move {
            match pass.await {
                Ok(Ok(_)) => {}
                Ok(Err(SchedulerError::PassInProgress(kind))) => {
                    tracing::warn!(pass = %kind, "Previous pass still running, skipping this firing");
                }
                // Already logged by the pass itself
                Ok(Err(_)) => {}
                Err(e) => {
                    tracing::error!(pass = %kind, error = %e, "Pass task aborted");
                }
            }
        });
    }

    /// Validate every active identity and apply the verdicts.
    ///
    /// Fails as a whole only when the store or the validation server cannot
    /// be reached at batch level; per-identity failures are logged and
    /// counted in the report.
    pub async fn run_validation_pass(&self) -> Result<PassReport, SchedulerError> {
        self.validation_pass(self.stop_receiver()).await
    }

    async fn validation_pass(
        &self,
        stop: watch::Receiver<bool>,
    ) -> Result<PassReport, SchedulerError> {
        let _guard = PassGuard::acquire(&self.validation_in_progress, PassKind::Validation)?;
        let mut report = PassReport::begin(PassKind::Validation);

        tracing::info!("Validation pass started");
        if let Err(e) = self.validate_identities(&mut report, &stop).await {
            tracing::error!(error = %e, "Validation pass failed");
            return Err(e);
        }

        let report = report.finish();
        tracing::info!(
            examined = report.examined,
            evicted = report.evicted,
            renamed = report.renamed,
            unmatched = report.unmatched,
            failures = report.failures,
            cancelled = report.cancelled,
            "Validation pass finished"
        );
        *self.last_validation.write().await = Some(report.clone());
        Ok(report)
    }

    async fn validate_identities(
        &self,
        report: &mut PassReport,
        stop: &watch::Receiver<bool>,
    ) -> Result<(), SchedulerError> {
        let mut ids = self.upstreams.storage.active_character_ids().await?;
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            tracing::debug!("No active identities to validate");
            return Ok(());
        }

        let verdicts = self.upstreams.validator.validate(&ids).await?;

        // Character ids are not unique, so every verdict may hit several rows
        let identities = self.upstreams.storage.list_identities().await?;
        let index = index_by_character(identities);

        'verdicts: for verdict in &verdicts {
            let Some(rows) = index.get(&verdict.character_id) else {
                report.unmatched += 1;
                continue;
            };

            for identity in rows {
                if *stop.borrow() {
                    report.cancelled = true;
                    break 'verdicts;
                }
                report.examined += 1;

                let result = if !verdict.valid {
                    report.evicted += 1;
                    self.evict(identity).await
                } else if identity.tickers_differ(verdict) {
                    report.renamed += 1;
                    self.update_attributes(identity, verdict).await
                } else {
                    Ok(())
                };

                if let Err(failures) = result {
                    record_failures(report, identity, failures);
                }
            }
        }

        Ok(())
    }

    /// Refresh the Discord access token of every identity holding a valid one
    pub async fn run_refresh_pass(&self) -> Result<PassReport, SchedulerError> {
        self.refresh_pass(self.evict_on_revoked_token, self.stop_receiver())
            .await
    }

    async fn refresh_pass(
        &self,
        evict_revoked: bool,
        stop: watch::Receiver<bool>,
    ) -> Result<PassReport, SchedulerError> {
        let _guard = PassGuard::acquire(&self.refresh_in_progress, PassKind::Refresh)?;
        let mut report = PassReport::begin(PassKind::Refresh);

        tracing::info!(evict_revoked, "Refresh pass started");
        if let Err(e) = self.refresh_tokens(&mut report, evict_revoked, &stop).await {
            tracing::error!(error = %e, "Refresh pass failed");
            return Err(e);
        }

        let report = report.finish();
        tracing::info!(
            examined = report.examined,
            refreshed = report.refreshed,
            revoked = report.revoked,
            evicted = report.evicted,
            failures = report.failures,
            cancelled = report.cancelled,
            "Refresh pass finished"
        );
        *self.last_refresh.write().await = Some(report.clone());
        Ok(report)
    }

    async fn refresh_tokens(
        &self,
        report: &mut PassReport,
        evict_revoked: bool,
        stop: &watch::Receiver<bool>,
    ) -> Result<(), SchedulerError> {
        let identities = self
            .upstreams
            .storage
            .list_identities_with_valid_token()
            .await?;

        for identity in &identities {
            if *stop.borrow() {
                report.cancelled = true;
                break;
            }
            report.examined += 1;

            if let Err(failures) = self.refresh_identity(identity, report, evict_revoked).await {
                record_failures(report, identity, failures);
            }
        }

        Ok(())
    }

    async fn refresh_identity(
        &self,
        identity: &LinkedIdentity,
        report: &mut PassReport,
        evict_revoked: bool,
    ) -> StepResult {
        let outcome = self
            .upstreams
            .tokens
            .refresh(&identity.refresh_token, &identity.token_scope)
            .await
            .map_err(|e| vec![StepFailure::new("refresh_token", e)])?;

        match outcome {
            RefreshOutcome::Refreshed { access_token, .. } => {
                self.upstreams
                    .storage
                    .update_access_token(identity.id, &access_token)
                    .await
                    .map_err(|e| vec![StepFailure::new("store_access_token", e)])?;
                report.refreshed += 1;
                tracing::debug!(discord_id = %identity.discord_id, "Access token refreshed");
                Ok(())
            }
            RefreshOutcome::Revoked => {
                report.revoked += 1;
                tracing::info!(
                    discord_id = %identity.discord_id,
                    character_id = %identity.character_id,
                    evict = evict_revoked,
                    "Discord token revoked"
                );

                let mut failures = Vec::new();
                if evict_revoked {
                    report.evicted += 1;
                    if let Err(mut evict_failures) = self.evict(identity).await {
                        failures.append(&mut evict_failures);
                    }
                }
                if let Err(e) = self.upstreams.storage.invalidate_token(identity.id).await {
                    failures.push(StepFailure::new("invalidate_token", e));
                }

                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(failures)
                }
            }
        }
    }

    /// Remove the member from the guild and mark the identity inactive.
    ///
    /// The two steps are attempted independently of each other.
    async fn evict(&self, identity: &LinkedIdentity) -> StepResult {
        let mut failures = Vec::new();

        if let Err(e) = self
            .upstreams
            .guild
            .remove_member(&identity.discord_id)
            .await
        {
            failures.push(StepFailure::new("remove_member", e));
        }
        if let Err(e) = self.upstreams.storage.set_inactive(&identity.discord_id).await {
            failures.push(StepFailure::new("set_inactive", e));
        }

        if !failures.is_empty() {
            return Err(failures);
        }

        tracing::info!(
            discord_id = %identity.discord_id,
            character_id = %identity.character_id,
            "Evicted identity"
        );
        Ok(())
    }

    /// Rename the member and store the verdict's tickers, independently
    async fn update_attributes(
        &self,
        identity: &LinkedIdentity,
        verdict: &ValidationVerdict,
    ) -> StepResult {
        let mut failures = Vec::new();
        let nickname = verdict.nickname();

        if let Err(e) = self
            .upstreams
            .guild
            .rename_member(&identity.discord_id, &nickname)
            .await
        {
            failures.push(StepFailure::new("rename_member", e));
        }
        if let Err(e) = self
            .upstreams
            .storage
            .update_tickers(
                identity.id,
                &verdict.corporation_ticker,
                &verdict.alliance_ticker,
            )
            .await
        {
            failures.push(StepFailure::new("update_tickers", e));
        }

        if !failures.is_empty() {
            return Err(failures);
        }

        tracing::info!(
            discord_id = %identity.discord_id,
            character_id = %identity.character_id,
            nickname = %nickname,
            "Updated identity attributes"
        );
        Ok(())
    }
}

fn index_by_character(identities: Vec<LinkedIdentity>) -> HashMap<CharacterId, Vec<LinkedIdentity>> {
    let mut index: HashMap<CharacterId, Vec<LinkedIdentity>> = HashMap::new();
    for identity in identities {
        index.entry(identity.character_id).or_default().push(identity);
    }
    index
}

fn record_failures(report: &mut PassReport, identity: &LinkedIdentity, failures: Vec<StepFailure>) {
    for failure in failures {
        tracing::warn!(
            pass = %report.kind,
            discord_id = %identity.discord_id,
            character_id = %identity.character_id,
            step = failure.step,
            error = %failure.error,
            "Identity step failed, continuing"
        );
        report.failures += 1;
    }
}
