//! Table of active sessions and their background passes.
//!
//! Each session owns at most one running pass. A user turn that arrives while
//! a pass holds the session is parked and applied before the next pass.
//!
//! Whether a session task is running lives in [`PassControl`], next to the
//! parked turn. Starting a task and a task deciding to exit both happen under
//! that lock, so work queued while a task is winding down is either seen by
//! that task or starts a new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use recall_ai::{ObservationInput, SummaryInput};

use super::orchestrator::{PassReport, SessionOrchestrator};
use crate::error::{RecallError, Result};
use crate::models::{ActiveSession, PendingMessage, SessionSnapshot, SessionState, WorkItem};
use crate::storage::Storage;

/// User turn waiting for the running pass to release the session.
#[derive(Debug, Clone)]
struct ParkedTurn {
    project: String,
    user_prompt: String,
    prompt_number: u32,
}

struct RunningPass {
    cancel: CancellationToken,
    handle: JoinHandle<Result<PassReport>>,
}

#[derive(Debug, Default)]
struct PassControl {
    parked: Option<ParkedTurn>,
    /// A session task exists and has not released the session.
    running: bool,
}

fn lock_control(control: &StdMutex<PassControl>) -> MutexGuard<'_, PassControl> {
    control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owned by a session task while it holds the session's `running` flag.
/// Dropping it without a release (error, cancellation, panic) clears the flag.
struct RunningGuard {
    control: Arc<StdMutex<PassControl>>,
    held: bool,
}

impl RunningGuard {
    /// Claim the session for a new task. `None` if one is already running.
    fn acquire(control: &Arc<StdMutex<PassControl>>) -> Option<Self> {
        let mut state = lock_control(control);
        if state.running {
            return None;
        }
        state.running = true;
        Some(Self {
            control: control.clone(),
            held: true,
        })
    }

    fn take_parked(&self) -> Option<ParkedTurn> {
        lock_control(&self.control).parked.take()
    }

    /// Release the session unless a turn is parked or `has_work` reports
    /// more to do. Returns whether the session was released.
    fn release_if_idle(&mut self, has_work: impl FnOnce() -> Result<bool>) -> Result<bool> {
        let mut state = lock_control(&self.control);
        if state.parked.is_some() || has_work()? {
            return Ok(false);
        }
        state.running = false;
        self.held = false;
        Ok(true)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.held {
            lock_control(&self.control).running = false;
        }
    }
}

struct SessionEntry {
    session: Arc<Mutex<ActiveSession>>,
    control: Arc<StdMutex<PassControl>>,
    pass: Option<RunningPass>,
}

impl SessionEntry {
    fn new(session: ActiveSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            control: Arc::new(StdMutex::new(PassControl::default())),
            pass: None,
        }
    }
}

fn apply_turn(session: &mut ActiveSession, turn: ParkedTurn) {
    if !turn.project.is_empty() {
        session.project = turn.project;
    }
    session.observe_prompt(turn.user_prompt, turn.prompt_number);
}

pub struct SessionManager {
    orchestrator: Arc<SessionOrchestrator>,
    storage: Storage,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    root: CancellationToken,
}

impl SessionManager {
    /// Items left in processing by a previous process are returned to pending.
    pub fn new(orchestrator: Arc<SessionOrchestrator>, storage: Storage) -> Result<Self> {
        let recovered = storage.queue.recover_processing()?;
        if recovered > 0 {
            info!(recovered, "Recovered unfinished queue items");
        }
        Ok(Self {
            orchestrator,
            storage,
            sessions: Mutex::new(HashMap::new()),
            root: CancellationToken::new(),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestrator> {
        &self.orchestrator
    }

    /// Entry for `session_id`, loading persisted state or starting fresh.
    fn entry_or_load<'a>(
        &self,
        table: &'a mut HashMap<String, SessionEntry>,
        session_id: &str,
        project: &str,
    ) -> Result<&'a mut SessionEntry> {
        if !table.contains_key(session_id) {
            let session = match self.storage.sessions.load(session_id)? {
                Some(session) => {
                    debug!(session_id, "Loaded persisted session");
                    session
                }
                None => ActiveSession::new(session_id, project, "", 0),
            };
            table.insert(session_id.to_string(), SessionEntry::new(session));
        }
        table
            .get_mut(session_id)
            .ok_or_else(|| RecallError::Task(format!("session {session_id} vanished from table")))
    }

    /// Record a user turn and start a pass for it.
    pub async fn init_session(
        &self,
        content_session_id: &str,
        project: &str,
        user_prompt: &str,
        prompt_number: u32,
    ) -> Result<()> {
        self.record_turn(content_session_id, project, user_prompt, prompt_number)
            .await?;
        self.ensure_running(content_session_id).await?;
        Ok(())
    }

    /// Record a user turn without starting a pass. Prompt numbers never go
    /// backwards.
    pub async fn record_turn(
        &self,
        content_session_id: &str,
        project: &str,
        user_prompt: &str,
        prompt_number: u32,
    ) -> Result<()> {
        let turn = ParkedTurn {
            project: project.to_string(),
            user_prompt: user_prompt.to_string(),
            prompt_number,
        };

        let mut table = self.sessions.lock().await;
        let entry = self.entry_or_load(&mut table, content_session_id, project)?;
        match entry.session.try_lock() {
            Ok(mut session) => {
                apply_turn(&mut session, turn);
                self.storage.sessions.save(&session)?;
            }
            Err(_) => {
                debug!(session_id = content_session_id, prompt_number, "Parking user turn behind running pass");
                lock_control(&entry.control).parked = Some(turn);
            }
        }
        Ok(())
    }

    pub async fn queue_observation(
        &self,
        content_session_id: &str,
        input: ObservationInput,
    ) -> Result<PendingMessage> {
        self.queue_item(content_session_id, WorkItem::Observation(input)).await
    }

    pub async fn queue_summarize(
        &self,
        content_session_id: &str,
        input: SummaryInput,
    ) -> Result<PendingMessage> {
        self.queue_item(content_session_id, WorkItem::Summarize(input)).await
    }

    async fn queue_item(&self, content_session_id: &str, item: WorkItem) -> Result<PendingMessage> {
        {
            let mut table = self.sessions.lock().await;
            self.entry_or_load(&mut table, content_session_id, "")?;
        }
        let message = self.storage.queue.enqueue(content_session_id, item)?;
        debug!(session_id = content_session_id, message_id = %message.id, kind = message.item.kind(), "Queued work item");
        self.ensure_running(content_session_id).await?;
        Ok(message)
    }

    /// Start a pass unless one is already running. Returns whether a pass was
    /// started.
    pub async fn ensure_running(&self, content_session_id: &str) -> Result<bool> {
        let mut table = self.sessions.lock().await;
        let entry = self.entry_or_load(&mut table, content_session_id, "")?;
        let Some(running) = RunningGuard::acquire(&entry.control) else {
            return Ok(false);
        };

        let cancel = self.root.child_token();
        let handle = tokio::spawn(run_session(
            self.orchestrator.clone(),
            entry.session.clone(),
            running,
            cancel.clone(),
        ));
        // A finished pass that nobody awaited is dropped here.
        entry.pass = Some(RunningPass { cancel, handle });
        Ok(true)
    }

    /// Abort the running pass, if any.
    pub async fn cancel(&self, content_session_id: &str) -> bool {
        let table = self.sessions.lock().await;
        match table.get(content_session_id).and_then(|e| e.pass.as_ref()) {
            Some(pass) => {
                pass.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the session's current pass and return its report.
    pub async fn wait_idle(&self, content_session_id: &str) -> Result<Option<PassReport>> {
        let pass = {
            let mut table = self.sessions.lock().await;
            table.get_mut(content_session_id).and_then(|e| e.pass.take())
        };
        match pass {
            Some(pass) => join_pass(pass).await.map(Some),
            None => Ok(None),
        }
    }

    /// Stop the session's pass and take it out of the table.
    async fn detach(&self, content_session_id: &str) -> Option<SessionEntry> {
        let entry = self.sessions.lock().await.remove(content_session_id);
        let mut entry = entry?;
        if let Some(pass) = entry.pass.take() {
            pass.cancel.cancel();
            if let Err(err) = join_pass(pass).await
                && !err.is_cancelled()
            {
                warn!(session_id = content_session_id, error = %err, "Pass ended with error during teardown");
            }
        }
        Some(entry)
    }

    /// Mark the session completed and remove it from the table.
    pub async fn complete(&self, content_session_id: &str) -> Result<bool> {
        let Some(entry) = self.detach(content_session_id).await else {
            return Ok(false);
        };
        let mut session = entry.session.lock().await;
        session.state = SessionState::Completed;
        self.storage.sessions.save(&session)?;
        info!(
            session_id = content_session_id,
            input_tokens = session.cumulative_input_tokens,
            output_tokens = session.cumulative_output_tokens,
            "Session completed"
        );
        Ok(true)
    }

    /// Remove the session, its persisted state and its pending items.
    /// Stored memory records are kept.
    pub async fn delete(&self, content_session_id: &str) -> Result<()> {
        self.detach(content_session_id).await;
        let cleared = self.storage.queue.clear_session(content_session_id)?;
        self.storage.sessions.delete(content_session_id)?;
        info!(session_id = content_session_id, cleared, "Session deleted");
        Ok(())
    }

    /// Snapshot of one session, from the table or from storage.
    pub async fn snapshot(&self, content_session_id: &str) -> Result<Option<SessionSnapshot>> {
        let session = {
            let table = self.sessions.lock().await;
            table.get(content_session_id).map(|e| e.session.clone())
        };
        match session {
            Some(session) => Ok(Some(session.lock().await.snapshot())),
            None => Ok(self
                .storage
                .sessions
                .load(content_session_id)?
                .map(|s| s.snapshot())),
        }
    }

    /// Snapshots of sessions in the table. Sessions held by a running pass are
    /// reported from their last persisted state.
    pub async fn active_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let table = self.sessions.lock().await;
        let mut snapshots = Vec::with_capacity(table.len());
        for (id, entry) in table.iter() {
            match entry.session.try_lock() {
                Ok(session) => snapshots.push(session.snapshot()),
                Err(_) => {
                    if let Some(session) = self.storage.sessions.load(id)? {
                        snapshots.push(session.snapshot());
                    }
                }
            }
        }
        snapshots.sort_by(|a, b| a.content_session_id.cmp(&b.content_session_id));
        Ok(snapshots)
    }

    /// Cancel every pass and wait for them to stop.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let passes: Vec<(String, RunningPass)> = {
            let mut table = self.sessions.lock().await;
            table
                .iter_mut()
                .filter_map(|(id, e)| e.pass.take().map(|p| (id.clone(), p)))
                .collect()
        };
        for (session_id, pass) in passes {
            if let Err(err) = join_pass(pass).await
                && !err.is_cancelled()
            {
                warn!(session_id = %session_id, error = %err, "Pass ended with error during shutdown");
            }
        }
        info!("Session manager stopped");
    }
}

async fn join_pass(pass: RunningPass) -> Result<PassReport> {
    match pass.handle.await {
        Ok(result) => result,
        Err(err) => Err(RecallError::Task(err.to_string())),
    }
}

/// Body of a session task: run passes until the queue is drained and no user
/// turn is waiting. Reports from consecutive passes are merged.
async fn run_session(
    orchestrator: Arc<SessionOrchestrator>,
    session: Arc<Mutex<ActiveSession>>,
    mut running: RunningGuard,
    cancel: CancellationToken,
) -> Result<PassReport> {
    let mut total: Option<PassReport> = None;

    loop {
        let report = {
            let mut guard = session.lock().await;
            if let Some(turn) = running.take_parked() {
                apply_turn(&mut guard, turn);
            }
            orchestrator.run_pass(&mut guard, &cancel).await?
        };

        total = Some(match total {
            None => report,
            Some(mut acc) => {
                acc.turns += report.turns;
                acc.items += report.items;
                acc.skipped += report.skipped;
                acc.rejected += report.rejected;
                acc.records_created += report.records_created;
                acc.duration_ms += report.duration_ms;
                acc.backend = report.backend.or(acc.backend);
                acc
            }
        });

        // The session lock is held across the decision so a turn applied
        // directly by `record_turn` is seen here.
        let guard = session.lock().await;
        let released = running.release_if_idle(|| {
            Ok(guard.needs_turn_prompt()
                || orchestrator.source().pending(&guard.content_session_id)? > 0)
        })?;
        if released {
            break;
        }
    }

    Ok(total.unwrap_or_default())
}
