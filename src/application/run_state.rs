//! Run-State Controller
//!
//! Per-scope IDLE/RUNNING state machine persisted in the shared store.
//! Several contexts may drive the same store; each one keeps its own cache
//! of scope states and re-reads the store before every decision that depends
//! on another context's writes.
//!
//! Every transition to IDLE goes through [`RunStateController::persist_run_off`]
//! so storage writes, cache invalidation, cancellation and UI refresh are
//! identical for soft stops, hard stops, natural completion and the operator
//! override.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::domain::{ChainConfig, RunFlag, RunState, Scope};
use crate::ports::sink::{NotifyLevel, ScanSink};
use crate::ports::state_store::{get_or, put, SharedStateStore, StoreError};

/// Banner label of the aggregate scope
pub const MULTICHAIN_LABEL: &str = "MULTICHAIN";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunStateError {
    #[error("Scope {0} is already running (use force-stop to clear a stale marker)")]
    AlreadyRunning(String),
}

/// Cached state of one scope in this context
#[derive(Debug)]
struct ScopeState {
    run: RunFlag,
    /// Run started by this context (vs. observed from the store)
    owned: bool,
    generation: u64,
    cancel: watch::Sender<bool>,
}

impl ScopeState {
    fn observed(run: RunFlag) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            run,
            owned: false,
            generation: 0,
            cancel,
        }
    }
}

/// Handle of one started run, used by the orchestrator for checkpoints
#[derive(Debug, Clone)]
pub struct RunTicket {
    scope: Scope,
    generation: u64,
    cancel: watch::Receiver<bool>,
}

impl RunTicket {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Cancelled locally, or superseded/dropped by the controller
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        // Err means the sender is gone, which also ends the run
        let _ = cancel.wait_for(|cancelled| *cancelled).await;
    }
}

pub struct RunStateController {
    store: Arc<dyn SharedStateStore>,
    sink: Arc<dyn ScanSink>,
    chains: ChainConfig,
    banner_seed: Vec<String>,
    scopes: RwLock<BTreeMap<Scope, ScopeState>>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl RunStateController {
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        sink: Arc<dyn ScanSink>,
        chains: ChainConfig,
    ) -> Self {
        Self {
            store,
            sink,
            chains,
            banner_seed: Vec::new(),
            scopes: RwLock::new(BTreeMap::new()),
            next_generation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Chains always shown in the banner alongside running scopes
    pub fn with_banner_seed<I, S>(mut self, seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banner_seed = seed.into_iter().map(Into::into).collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn SharedStateStore> {
        &self.store
    }

    pub fn chains(&self) -> &ChainConfig {
        &self.chains
    }

    /// IDLE -> RUNNING
    ///
    /// The store is re-read first; a scope another context already marked
    /// running is rejected.
    pub async fn start(&self, scope: &Scope) -> Result<RunTicket, RunStateError> {
        let key = scope.run_state_key();

        let base = match get_or(self.store.as_ref(), &key, RunState::idle()).await {
            Ok(state) => state,
            Err(e) => {
                self.degraded("read run-state", scope, &e);
                let cached = self
                    .scopes
                    .read()
                    .await
                    .get(scope)
                    .map(|s| s.run)
                    .unwrap_or_default();
                RunState::idle().with_run(cached)
            }
        };

        if base.is_running() {
            return Err(RunStateError::AlreadyRunning(scope.to_string()));
        }

        if let Err(e) = put(self.store.as_ref(), &key, &base.with_run(RunFlag::Yes)).await {
            self.degraded("persist run = YES", scope, &e);
        }

        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (cancel, receiver) = watch::channel(false);
        self.scopes.write().await.insert(
            scope.clone(),
            ScopeState {
                run: RunFlag::Yes,
                owned: true,
                generation,
                cancel,
            },
        );

        tracing::info!("Scan started for scope {}", scope);
        self.refresh_ui().await;

        Ok(RunTicket {
            scope: scope.clone(),
            generation,
            cancel: receiver,
        })
    }

    /// RUNNING -> IDLE, keeping this context alive
    pub async fn stop_soft(&self, scope: &Scope) {
        tracing::info!("Soft stop requested for scope {}", scope);
        self.persist_run_off(scope).await;
    }

    /// Soft stop followed by a full reinitialization of this context
    pub async fn stop_hard(&self, scope: &Scope) {
        tracing::info!("Hard stop requested for scope {}", scope);
        self.persist_run_off(scope).await;
        self.reinitialize().await;
    }

    /// Operator override for a stale `run = YES` left by a crashed context
    pub async fn force_stop(&self, scope: &Scope) {
        tracing::warn!("Forcing run = NO for scope {}", scope);
        self.persist_run_off(scope).await;
        self.sink.notify(
            NotifyLevel::Warning,
            &format!("Run-state of {} forced to idle", scope),
        );
    }

    /// End of a run driven by the orchestrator (completed or cancelled).
    ///
    /// `run = NO` is persisted only while the ticket's run still owns the
    /// scope. A run already ended by a stop (local or observed from the
    /// store) or superseded by a newer start only refreshes the UI, so a
    /// finishing loop never clears a run started after it.
    pub async fn finish(&self, ticket: &RunTicket) {
        if !self.owns(ticket).await {
            tracing::debug!(
                "Run {} of {} already ended, leaving run-state alone",
                ticket.generation,
                ticket.scope
            );
            self.refresh_ui().await;
            return;
        }
        self.persist_run_off(&ticket.scope).await;
    }

    /// The single routine that persists `run = NO`
    pub async fn persist_run_off(&self, scope: &Scope) {
        let key = scope.run_state_key();

        let base = match get_or(self.store.as_ref(), &key, RunState::idle()).await {
            Ok(state) => state,
            Err(e) => {
                self.degraded("read run-state", scope, &e);
                RunState::idle()
            }
        };

        if let Err(e) = put(self.store.as_ref(), &key, &base.with_run(RunFlag::No)).await {
            self.degraded("persist run = NO", scope, &e);
        }

        if let Some(state) = self.scopes.write().await.remove(scope) {
            state.cancel.send_replace(true);
        }

        self.refresh_ui().await;
    }

    /// Orchestrator checkpoint: is this run still allowed to continue
    pub async fn is_running(&self, ticket: &RunTicket) -> bool {
        if ticket.is_cancelled() {
            return false;
        }

        let key = ticket.scope.run_state_key();
        match get_or(self.store.as_ref(), &key, RunState::idle()).await {
            Ok(state) if state.is_running() => true,
            Ok(_) => {
                tracing::info!("Scope {} stopped from another context", ticket.scope);
                self.drop_run(ticket).await;
                self.refresh_ui().await;
                false
            }
            Err(e) => {
                // Degraded: trust the local cache
                tracing::warn!("Run-state re-read failed for {}: {}", ticket.scope, e);
                !ticket.is_cancelled()
            }
        }
    }

    /// Re-read one run-state key and mirror it into the cache
    pub async fn sync_from_store(&self, key: &str) {
        let Some(scope) = Scope::from_run_state_key(key) else {
            return;
        };

        {
            // Read under the cache lock: a start in this context lands
            // entirely before or after this read
            let mut scopes = self.scopes.write().await;
            let state = match get_or(self.store.as_ref(), key, RunState::idle()).await {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("Failed to sync run-state {}: {}", key, e);
                    return;
                }
            };

            if state.is_running() {
                scopes
                    .entry(scope)
                    .or_insert_with(|| ScopeState::observed(RunFlag::Yes));
            } else if let Some(state) = scopes.remove(&scope) {
                state.cancel.send_replace(true);
            }
        }

        self.refresh_ui().await;
    }

    /// Scopes the store currently marks running (fresh read)
    pub async fn running_scopes(&self) -> Vec<Scope> {
        let mut running = Vec::new();
        for scope in self.known_scopes().await {
            match get_or(self.store.as_ref(), &scope.run_state_key(), RunState::idle()).await {
                Ok(state) if state.is_running() => running.push(scope),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to read run-state of {}: {}", scope, e),
            }
        }
        running
    }

    /// Banner labels: multichain first, then seed and running chains,
    /// deduplicated case-insensitively. A chain without a display name is
    /// shown as first spelled.
    pub async fn running_labels(&self) -> Vec<String> {
        let scopes = self.scopes.read().await;

        let mut multichain = false;
        // (normalized id, first-seen spelling)
        let mut chains: Vec<(String, String)> = Vec::new();

        let seeded = self.banner_seed.iter().map(|raw| raw.trim().to_string());
        let running = scopes
            .iter()
            .filter(|(_, state)| state.run.is_running())
            .map(|(scope, _)| scope.id().to_string());

        for raw in seeded.chain(running) {
            match Scope::chain(&raw) {
                Scope::Multichain => multichain = true,
                Scope::Chain(id) => {
                    if !id.is_empty() && !chains.iter().any(|(seen, _)| *seen == id) {
                        chains.push((id, raw));
                    }
                }
            }
        }

        let mut labels = Vec::with_capacity(chains.len() + 1);
        if multichain {
            labels.push(MULTICHAIN_LABEL.to_string());
        }
        labels.extend(chains.iter().map(|(_, raw)| self.chains.display_label(raw)));
        labels
    }

    pub async fn banner_text(&self) -> String {
        let labels = self.running_labels().await;
        if labels.is_empty() {
            String::new()
        } else {
            format!("Scanning: {}", labels.join(", "))
        }
    }

    /// Recompute banner and toolbar indicator
    pub async fn refresh_ui(&self) {
        let banner = self.banner_text().await;
        let any_running = self
            .scopes
            .read()
            .await
            .values()
            .any(|state| state.run.is_running());

        self.sink.banner(&banner);
        self.sink.run_indicator(any_running);
    }

    /// Follow store change notifications from every context.
    ///
    /// The task ends when the store closes or the controller is dropped.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let controller: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if Scope::from_run_state_key(&change.key).is_none() {
                            continue;
                        }
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.sync_from_store(&change.key).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Store watcher lagged by {} changes, resyncing", skipped);
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.reseed_from_store().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Store watcher stopped");
        })
    }

    /// Reload every known scope from the store into the cache
    pub async fn reseed_from_store(&self) {
        for scope in self.known_scopes().await {
            self.sync_from_store(&scope.run_state_key()).await;
        }
    }

    /// Full context reinitialization: every local run is cancelled, the
    /// cache is rebuilt from the store and the host is asked to reload.
    async fn reinitialize(&self) {
        {
            let mut scopes = self.scopes.write().await;
            for (_, state) in std::mem::take(&mut *scopes) {
                state.cancel.send_replace(true);
            }
        }

        self.reseed_from_store().await;
        self.refresh_ui().await;
        self.sink.reload_requested();
        tracing::info!("Context reinitialized");
    }

    /// Whether the ticket's run is still the scope's current owned run
    async fn owns(&self, ticket: &RunTicket) -> bool {
        self.scopes
            .read()
            .await
            .get(&ticket.scope)
            .map(|s| s.owned && s.generation == ticket.generation)
            .unwrap_or(false)
    }

    /// Drop the ticket's run from the cache; a newer run is left alone
    async fn drop_run(&self, ticket: &RunTicket) {
        let mut scopes = self.scopes.write().await;
        let current = scopes
            .get(&ticket.scope)
            .map(|s| s.owned && s.generation == ticket.generation)
            .unwrap_or(false);
        if current {
            if let Some(state) = scopes.remove(&ticket.scope) {
                state.cancel.send_replace(true);
            }
        }
    }

    async fn known_scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = std::iter::once(Scope::Multichain)
            .chain(self.chains.chain_ids().map(Scope::chain))
            .chain(self.banner_seed.iter().map(|id| Scope::chain(id)))
            .collect();
        scopes.extend(self.scopes.read().await.keys().cloned());
        scopes.sort();
        scopes.dedup();
        scopes
    }

    fn degraded(&self, action: &str, scope: &Scope, error: &StoreError) {
        tracing::warn!(
            "Failed to {} for {}: {} (local state only)",
            action,
            scope,
            error
        );
        self.sink.notify(
            NotifyLevel::Warning,
            &format!("Could not save run-state of {}; other tabs will not see it", scope),
        );
    }
}
