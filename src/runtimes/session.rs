//! Session manager (C2, spec.md §4.2): the five verbs exposed to the
//! transport layer — `create`, `pause`, `resume`, `cancel`, `stream` — plus
//! `get`/`list` (§6). Owns the session row (status, config, denormalized
//! stats) and the background task that drives an [`AppRunner`] session to
//! completion. The row itself lives behind a [`SessionStore`] so the
//! conditional status update `pause`/`resume` race (§4.2) is serialized by
//! whatever storage backs it, not by this type.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, broadcast};
use uuid::Uuid;

use crate::budget::Budget;
use crate::channels::Channel;
use crate::config::ResearchConfig;
use crate::graphs::build_research_graph;
use crate::model::ModelCoordinator;
use crate::state::ResearchState;
use crate::stop::StopReason;
use crate::tool::{PermissionGate, ToolExecutor};

use super::checkpointer::CheckpointerType;
use super::runner::{AppRunner, StepOptions, StepResult};

/// Lifecycle status of a session row, spec.md §3: `active | paused |
/// completed | failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed { reason: String },
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Coarse discriminant used for the conditional-update predicate, so
    /// `try_transition` callers don't need to name a `Failed` reason just to
    /// check "is this session in a terminal state".
    #[must_use]
    pub fn kind(&self) -> SessionStatusKind {
        match self {
            Self::Active => SessionStatusKind::Active,
            Self::Paused => SessionStatusKind::Paused,
            Self::Completed => SessionStatusKind::Completed,
            Self::Failed { .. } => SessionStatusKind::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatusKind {
    Active,
    Paused,
    Completed,
    Failed,
}

/// Denormalized stats carried on the session row so `get`/`list` don't need
/// to replay checkpoints to answer "how far did this session get".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub iterations: u32,
    pub findings_count: usize,
    pub sources_count: usize,
    pub spent_usd: f64,
    pub external_calls_used: u32,
    pub final_composite_score: Option<f64>,
    pub stop_reason: Option<StopReason>,
}

/// A session row, spec.md §3: identity, the original query, lifecycle
/// status, the config it was created with, free-form metadata, timestamps,
/// the checkpoint-keying thread id, and denormalized stats.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub status: SessionStatus,
    pub config: ResearchConfig,
    pub metadata: FxHashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub thread_id: String,
    pub stats: SessionStats,
}

/// One entry in a session's `stream`, spec.md §4.2: a lazy, finite sequence
/// of snapshot events ending on terminal status.
#[derive(Clone, Debug)]
pub struct SessionSnapshotEvent {
    pub node: String,
    pub iteration: u32,
    pub findings_count: usize,
    pub saturation: f64,
    pub budget_remaining: f64,
    pub stop: Option<StopReason>,
}

/// Errors surfaced by the session manager's verbs, spec.md §6's failure
/// kinds column.
#[derive(Debug, Error, Diagnostic)]
pub enum SessionManagerError {
    #[error("query must not be empty")]
    #[diagnostic(code(loomresearch::session::invalid_query))]
    InvalidQuery,

    #[error("session config rejected: {reason}")]
    #[diagnostic(code(loomresearch::session::quota_exceeded))]
    QuotaExceeded { reason: String },

    #[error("session not found: {session_id}")]
    #[diagnostic(code(loomresearch::session::not_found))]
    NotFound { session_id: String },

    #[error("session {session_id} is not active")]
    #[diagnostic(code(loomresearch::session::not_active))]
    NotActive { session_id: String },

    #[error("session {session_id} is not paused")]
    #[diagnostic(code(loomresearch::session::not_paused))]
    NotPaused { session_id: String },

    #[error("session {session_id} is already terminal")]
    #[diagnostic(code(loomresearch::session::terminal))]
    Terminal { session_id: String },

    #[error("session store error: {0}")]
    #[diagnostic(code(loomresearch::session::store))]
    Store(String),

    #[error(transparent)]
    #[diagnostic(code(loomresearch::session::runner))]
    Runner(#[from] super::runner::RunnerError),
}

pub type Result<T> = std::result::Result<T, SessionManagerError>;

/// CRUD plus conditional status update over session rows, spec.md §6's
/// `SessionStore` collaborator. The conditional update is what serializes a
/// concurrent `pause` racing a `resume` against the same row.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> Result<()>;
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<SessionRecord>>;

    /// Atomically moves `session_id` from a row whose status matches
    /// `expected` to `new`, returning the updated record. Returns
    /// `Ok(None)` (not an error) when the row exists but its current status
    /// doesn't match `expected` — the caller turns that into the specific
    /// `not_active` / `not_paused` / `terminal` error.
    async fn try_transition(
        &self,
        session_id: &str,
        expected: SessionStatusKind,
        new: SessionStatus,
    ) -> Result<Option<SessionRecord>>;

    async fn update_stats(&self, session_id: &str, stats: SessionStats) -> Result<()>;
}

/// Volatile, process-local [`SessionStore`]. Mirrors
/// [`super::checkpointer::InMemoryCheckpointer`]'s shape: a single lock
/// around a hash map, no history.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    rows: RwLock<FxHashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<()> {
        self.rows.write().await.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.rows.read().await.get(session_id).cloned())
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| user_id.is_none_or(|u| r.user_id == u))
            .cloned()
            .collect())
    }

    async fn try_transition(
        &self,
        session_id: &str,
        expected: SessionStatusKind,
        new: SessionStatus,
    ) -> Result<Option<SessionRecord>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(session_id) else {
            return Ok(None);
        };
        if row.status.kind() != expected {
            return Ok(None);
        }
        row.status = new;
        row.updated_at = Utc::now();
        if row.status.is_terminal() {
            row.completed_at = Some(row.updated_at);
        }
        Ok(Some(row.clone()))
    }

    async fn update_stats(&self, session_id: &str, stats: SessionStats) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(session_id) {
            row.stats = stats;
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Per-session bookkeeping the manager keeps alongside the stored row: the
/// broadcast channel feeding `stream` consumers and the cancellation flag
/// the driver loop polls at each node boundary.
struct SessionHandle {
    events: broadcast::Sender<SessionSnapshotEvent>,
    cancelled: Arc<AtomicBool>,
}

/// Injected collaborators a session needs to actually run its graph.
/// Threaded through from session-manager construction rather than looked up
/// from a global, per the "explicit injection" re-architecture (spec.md §9).
#[derive(Clone)]
pub struct ResearchDependencies {
    pub tool_executor: Arc<dyn ToolExecutor>,
    pub permission_gate: Arc<dyn PermissionGate>,
    pub model_coordinator: Arc<dyn ModelCoordinator>,
}

/// The session manager (C2). Wraps an [`AppRunner`] (which already knows
/// how to step one session's graph) with session-row lifecycle: creation,
/// pause/resume/cancel, and event streaming, backed by a [`SessionStore`].
pub struct SessionManager {
    runner: Arc<Mutex<AppRunner>>,
    store: Arc<dyn SessionStore>,
    handles: Arc<Mutex<FxHashMap<String, SessionHandle>>>,
}

impl SessionManager {
    /// Builds a manager over a fresh [`AppRunner`] for `base_config`'s
    /// research graph (see [`build_research_graph`]), backed by `store` for
    /// session rows and `checkpointer_type` for node-boundary durability.
    pub async fn new(
        deps: ResearchDependencies,
        base_config: ResearchConfig,
        store: Arc<dyn SessionStore>,
        checkpointer_type: CheckpointerType,
    ) -> Self {
        let app = build_research_graph(
            base_config,
            deps.tool_executor,
            deps.permission_gate,
            deps.model_coordinator,
        )
        .compile();
        let runner = AppRunner::new(app, checkpointer_type).await;
        Self {
            runner: Arc::new(Mutex::new(runner)),
            store,
            handles: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// `create(user_id, query, config) -> session_id`: writes a row with
    /// status `active`, derives `thread_id`, and returns immediately. A
    /// separate background task drives the graph; this call never blocks on
    /// it (spec.md §4.2).
    pub async fn create(
        &self,
        user_id: impl Into<String>,
        query: impl Into<String>,
        config: ResearchConfig,
    ) -> Result<SessionRecord> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(SessionManagerError::InvalidQuery);
        }
        config
            .validate()
            .map_err(|e| SessionManagerError::QuotaExceeded { reason: e.to_string() })?;

        let session_id = Uuid::new_v4().to_string();
        let thread_id = session_id.clone();
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id: user_id.into(),
            query: query.clone(),
            status: SessionStatus::Active,
            config: config.clone(),
            metadata: FxHashMap::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            thread_id: thread_id.clone(),
            stats: SessionStats::default(),
        };
        self.store.insert(record.clone()).await?;

        let state = ResearchState::new(thread_id, query, &config);
        self.runner
            .lock()
            .await
            .create_session(session_id.clone(), state)
            .await?;

        self.spawn_driver(session_id.clone());
        Ok(record)
    }

    /// `get(session_id) -> full session row + latest scores`.
    pub async fn get(&self, session_id: &str) -> Result<SessionRecord> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| SessionManagerError::NotFound { session_id: session_id.to_string() })
    }

    /// `list(user_id, optional status filter) -> array of session rows`.
    pub async fn list(
        &self,
        user_id: Option<&str>,
        status: Option<SessionStatusKind>,
    ) -> Result<Vec<SessionRecord>> {
        let rows = self.store.list(user_id).await?;
        Ok(match status {
            Some(kind) => rows.into_iter().filter(|r| r.status.kind() == kind).collect(),
            None => rows,
        })
    }

    /// `pause(session_id)`: sets status `paused`. The driver loop, on its
    /// next node-boundary check, stops scheduling further nodes; in-flight
    /// work still checkpoints normally.
    pub async fn pause(&self, session_id: &str) -> Result<SessionRecord> {
        match self
            .store
            .try_transition(session_id, SessionStatusKind::Active, SessionStatus::Paused)
            .await?
        {
            Some(record) => Ok(record),
            None => self.not_active_or_not_found(session_id).await,
        }
    }

    /// `resume(session_id)`: sets status `active`. If the driver is still
    /// alive (idling on the paused row) it simply continues; if it exited
    /// (process restart), a fresh driver is respawned against the session
    /// already held open by [`AppRunner`] (or restored from its checkpointer).
    pub async fn resume(&self, session_id: &str) -> Result<SessionRecord> {
        let record = match self
            .store
            .try_transition(session_id, SessionStatusKind::Paused, SessionStatus::Active)
            .await?
        {
            Some(record) => record,
            None => return self.not_paused_or_not_found(session_id).await,
        };

        let mut handles = self.handles.lock().await;
        if !handles.contains_key(session_id) {
            drop(handles);
            let state = ResearchState::new(
                record.thread_id.clone(),
                record.query.clone(),
                &record.config,
            );
            self.runner
                .lock()
                .await
                .create_session(session_id.to_string(), state)
                .await?;
            self.spawn_driver(session_id.to_string());
        }
        Ok(record)
    }

    /// `cancel(session_id)`: sets status `failed(user_cancelled)`;
    /// in-flight work is abandoned on the next boundary.
    pub async fn cancel(&self, session_id: &str) -> Result<SessionRecord> {
        let current = self.get(session_id).await?;
        if current.status.is_terminal() {
            return Err(SessionManagerError::Terminal { session_id: session_id.to_string() });
        }
        let failed = SessionStatus::Failed { reason: "user_cancelled".to_string() };
        let transitioned = self
            .store
            .try_transition(session_id, current.status.kind(), failed)
            .await?;
        let Some(record) = transitioned else {
            return Err(SessionManagerError::Terminal { session_id: session_id.to_string() });
        };
        if let Some(handle) = self.handles.lock().await.get(session_id) {
            handle.cancelled.store(true, Ordering::SeqCst);
        }
        Ok(record)
    }

    /// `stream(session_id)`: subscribes to the session's broadcast of
    /// snapshot events, independent of any transport (a dropped receiver
    /// never affects execution). Ends once the session reaches a terminal
    /// status; `not_found` if the session never existed.
    pub async fn stream(&self, session_id: &str) -> Result<SessionEventStream> {
        self.get(session_id).await?;
        let handles = self.handles.lock().await;
        let receiver = match handles.get(session_id) {
            Some(handle) => handle.events.subscribe(),
            // The session already finished and its driver exited; hand back
            // a stream that immediately reports no further events.
            None => broadcast::channel(1).1,
        };
        Ok(SessionEventStream { receiver })
    }

    async fn not_active_or_not_found(&self, session_id: &str) -> Result<SessionRecord> {
        match self.store.get(session_id).await? {
            Some(_) => Err(SessionManagerError::NotActive { session_id: session_id.to_string() }),
            None => Err(SessionManagerError::NotFound { session_id: session_id.to_string() }),
        }
    }

    async fn not_paused_or_not_found(&self, session_id: &str) -> Result<SessionRecord> {
        match self.store.get(session_id).await? {
            Some(_) => Err(SessionManagerError::NotPaused { session_id: session_id.to_string() }),
            None => Err(SessionManagerError::NotFound { session_id: session_id.to_string() }),
        }
    }

    /// Registers bookkeeping for `session_id` and spawns its driver task.
    fn spawn_driver(&self, session_id: String) {
        let (tx, _rx) = broadcast::channel(256);
        let cancelled = Arc::new(AtomicBool::new(false));
        let handles = self.handles.clone();
        let handles_insert = handles.clone();
        let tx_for_handle = tx.clone();
        let cancelled_for_handle = cancelled.clone();
        let runner = self.runner.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            handles_insert.lock().await.insert(
                session_id.clone(),
                SessionHandle { events: tx_for_handle, cancelled: cancelled_for_handle },
            );
            Self::drive(runner, store, session_id.clone(), tx, cancelled).await;
            handles.lock().await.remove(&session_id);
        });
    }

    /// Drives `session_id` one superstep at a time until it reaches a
    /// terminal frontier, is paused, or is cancelled. Runs detached; results
    /// are observed only through the store row and the event broadcast.
    async fn drive(
        runner: Arc<Mutex<AppRunner>>,
        store: Arc<dyn SessionStore>,
        session_id: String,
        events: broadcast::Sender<SessionSnapshotEvent>,
        cancelled: Arc<AtomicBool>,
    ) {
        loop {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            let Some(record) = store.get(&session_id).await.ok().flatten() else {
                break;
            };
            match record.status {
                SessionStatus::Paused => {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    continue;
                }
                SessionStatus::Completed | SessionStatus::Failed { .. } => break,
                SessionStatus::Active => {}
            }

            let step = runner.lock().await.run_step(&session_id, StepOptions::default()).await;
            let report = match step {
                Ok(StepResult::Completed(report)) => report,
                Ok(StepResult::Paused(_)) => continue,
                Err(err) => {
                    let _ = store
                        .try_transition(
                            &session_id,
                            SessionStatusKind::Active,
                            SessionStatus::Failed { reason: "internal_error".to_string() },
                        )
                        .await;
                    tracing::error!(session_id = %session_id, error = %err, "session driver step failed");
                    break;
                }
            };

            if let Some(session_state) = runner.lock().await.get_session(&session_id) {
                let snapshot = &session_state.state;
                let stop = snapshot.stop.snapshot();
                let budget = snapshot.budget.snapshot();
                let event = SessionSnapshotEvent {
                    node: report.ran_nodes.last().map(|n| format!("{n:?}")).unwrap_or_default(),
                    iteration: snapshot.iteration,
                    findings_count: snapshot.findings.snapshot().len(),
                    saturation: snapshot.saturation.snapshot().score,
                    budget_remaining: budget.as_ref().map(Budget::remaining_usd).unwrap_or_default(),
                    stop: stop.as_ref().and_then(|s| s.reason),
                };
                let _ = store
                    .update_stats(
                        &session_id,
                        SessionStats {
                            iterations: snapshot.iteration,
                            findings_count: snapshot.findings.snapshot().len(),
                            sources_count: snapshot.sources.snapshot().len(),
                            spent_usd: budget.as_ref().map(|b| b.spent_usd).unwrap_or_default(),
                            external_calls_used: budget
                                .as_ref()
                                .map(|b| b.external_calls_used)
                                .unwrap_or_default(),
                            final_composite_score: Some(snapshot.quality.snapshot().composite),
                            stop_reason: stop.as_ref().and_then(|s| s.reason),
                        },
                    )
                    .await;
                let _ = events.send(event);
            }

            if report.completed {
                let _ = store
                    .try_transition(&session_id, SessionStatusKind::Active, SessionStatus::Completed)
                    .await;
                break;
            }
        }
    }
}

/// A lazy, finite view over a session's snapshot events. Subscribing never
/// affects the underlying run; dropping the stream early is always safe.
pub struct SessionEventStream {
    receiver: broadcast::Receiver<SessionSnapshotEvent>,
}

impl SessionEventStream {
    /// Waits for the next event. Returns `None` once the sender (the
    /// session's driver task) has dropped, i.e. the session reached a
    /// terminal status and its stream ended.
    pub async fn next(&mut self) -> Option<SessionSnapshotEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
}
