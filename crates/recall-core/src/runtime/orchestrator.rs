//! Per-session capture loop.
//!
//! One pass drains a session's queue strictly in order with at most one
//! backend call in flight. Every exchange appends a user entry, sends the
//! whole history through the fallback chain, then appends the reply only if
//! it is non-empty. A failed exchange removes its unanswered user entry and
//! puts the item back, so the session is left exactly as it was before the
//! item. An item whose prompt cannot be built yet (a summary before the
//! handle exists) is dropped and the pass moves on to the next one.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::assembler::PromptAssembler;
use super::fallback::FallbackChain;
use super::queue::{MessageIterator, WorkSource};
use crate::error::{RecallError, Result};
use crate::memory::{ResponseContext, ResponseProcessor, turn_source_id};
use crate::models::{ActiveSession, PendingMessage, SessionState};
use crate::storage::SessionStateStorage;

pub const DEFAULT_INPUT_SHARE_PERCENT: u8 = 70;

/// Split of a combined token total into input and output shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSplit {
    input_percent: u8,
}

impl TokenSplit {
    /// Shares above 100 are clamped.
    pub fn new(input_percent: u8) -> Self {
        Self {
            input_percent: input_percent.min(100),
        }
    }

    pub fn input_percent(&self) -> u8 {
        self.input_percent
    }

    /// `(input, output)`, each rounded down.
    pub fn split(&self, total: u64) -> (u64, u64) {
        let p = u64::from(self.input_percent);
        (total * p / 100, total * (100 - p) / 100)
    }
}

impl Default for TokenSplit {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SHARE_PERCENT)
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub session_id: String,
    /// Successful backend round trips
    pub turns: usize,
    /// Work items folded into history
    pub items: usize,
    /// Redelivered items that were already processed
    pub skipped: usize,
    /// Items dropped because their prompt could not be built
    pub rejected: usize,
    pub records_created: usize,
    /// Backend that answered last
    pub backend: Option<String>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Where the reply to an exchange is attributed.
struct ItemOrigin<'a> {
    source_id: &'a str,
    timestamp: i64,
    cwd: Option<&'a str>,
}

pub struct SessionOrchestrator {
    chain: Arc<FallbackChain>,
    processor: Arc<dyn ResponseProcessor>,
    assembler: PromptAssembler,
    source: Arc<dyn WorkSource>,
    sessions: Option<SessionStateStorage>,
    split: TokenSplit,
}

impl SessionOrchestrator {
    pub fn new(
        chain: Arc<FallbackChain>,
        processor: Arc<dyn ResponseProcessor>,
        assembler: PromptAssembler,
        source: Arc<dyn WorkSource>,
    ) -> Self {
        Self {
            chain,
            processor,
            assembler,
            source,
            sessions: None,
            split: TokenSplit::default(),
        }
    }

    /// Persist session state after every processed item.
    pub fn with_session_store(mut self, sessions: SessionStateStorage) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_token_split(mut self, split: TokenSplit) -> Self {
        self.split = split;
        self
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn source(&self) -> &Arc<dyn WorkSource> {
        &self.source
    }

    /// Drain the session's queue until end-of-stream, a fatal error or
    /// cancellation.
    pub async fn run_pass(
        &self,
        session: &mut ActiveSession,
        cancel: &CancellationToken,
    ) -> Result<PassReport> {
        let started = Instant::now();
        let mut report = PassReport::new(&session.content_session_id);
        let result = self.drive(session, cancel, &mut report).await;
        report.duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => {
                info!(
                    session_id = %session.content_session_id,
                    duration_ms = report.duration_ms,
                    turns = report.turns,
                    items = report.items,
                    backend = report.backend.as_deref().unwrap_or("none"),
                    "Session pass finished"
                );
            }
            Err(err) if err.is_cancelled() => {
                session.state = SessionState::Aborted;
                warn!(session_id = %session.content_session_id, turns = report.turns, "Session pass cancelled");
            }
            Err(err) if err.is_precondition_failed() => {
                warn!(session_id = %session.content_session_id, error = %err, "Session pass stopped");
            }
            Err(err) => {
                session.state = SessionState::Failed;
                error!(
                    session_id = %session.content_session_id,
                    kind = err.kind(),
                    error = %err,
                    "Session pass failed"
                );
            }
        }

        if let Err(err) = self.persist(session) {
            error!(session_id = %session.content_session_id, error = %err, "Failed to persist session state");
            if result.is_ok() {
                return Err(err);
            }
        }

        result.map(|()| report)
    }

    async fn drive(
        &self,
        session: &mut ActiveSession,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<()> {
        if session.needs_turn_prompt() {
            let prompt_number = session.prompt_number();
            let prompt = self.assembler.turn_prompt(&session.snapshot());
            let source_id = turn_source_id(prompt_number);
            let origin = ItemOrigin {
                source_id: &source_id,
                timestamp: Utc::now().timestamp_millis(),
                cwd: None,
            };
            self.exchange(session, prompt, origin, cancel, report).await?;
            session.last_prompted_number = prompt_number;
            self.persist(session)?;
        }

        let mut items = MessageIterator::new(
            self.source.clone(),
            session.content_session_id.clone(),
            cancel.clone(),
        );

        while let Some(message) = items.next().await? {
            if session.processed_message_ids.contains(&message.id) {
                debug!(session_id = %session.content_session_id, message_id = %message.id, "Skipping redelivered item");
                self.source.ack(&message)?;
                session.processed_message_ids.remove(&message.id);
                report.skipped += 1;
                continue;
            }

            let prompt = match self.assembler.item_prompt(&session.snapshot(), &message.item) {
                Ok(prompt) => prompt,
                Err(err @ RecallError::PreconditionFailed(_)) => {
                    warn!(
                        session_id = %session.content_session_id,
                        message_id = %message.id,
                        kind = message.item.kind(),
                        error = %err,
                        "Dropping item"
                    );
                    self.source.ack(&message)?;
                    report.rejected += 1;
                    continue;
                }
                Err(err) => {
                    self.requeue_after_failure(&message);
                    return Err(err);
                }
            };

            let origin = ItemOrigin {
                source_id: &message.id,
                timestamp: message.original_timestamp(),
                cwd: message.item.cwd(),
            };
            if let Err(err) = self.exchange(session, prompt, origin, cancel, report).await {
                self.requeue_after_failure(&message);
                return Err(err);
            }

            // Persisted before the ack so a redelivery after a crash is skipped;
            // once acked the queue never returns the id again.
            session.processed_message_ids.insert(message.id.clone());
            self.persist(session)?;
            self.source.ack(&message)?;
            session.processed_message_ids.remove(&message.id);
            report.items += 1;
        }

        Ok(())
    }

    /// One prompt/reply round trip.
    async fn exchange(
        &self,
        session: &mut ActiveSession,
        prompt: String,
        origin: ItemOrigin<'_>,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<()> {
        session.resume();
        if session.memory_session_id().is_none() {
            session.state = SessionState::AwaitingFirstReply;
        }

        session.history.push_user(prompt);
        let reply = match self.chain.send(&session.history, cancel).await {
            Ok(reply) => reply,
            Err(err) => {
                session.history.pop_unanswered_user();
                return Err(err);
            }
        };

        report.turns += 1;
        report.backend = Some(reply.backend.clone());

        // Stateless backends get a handle derived from the session.
        let handle = reply
            .response
            .handle
            .clone()
            .unwrap_or_else(|| format!("{}-{}", reply.backend, session.content_session_id));
        session.bind_handle(handle);
        session.state = SessionState::Active;

        if reply.response.is_empty() {
            warn!(
                session_id = %session.content_session_id,
                backend = %reply.backend,
                "Backend returned empty content"
            );
            return Ok(());
        }
        let content = reply.response.content.as_deref().unwrap_or_default();
        let tokens_used = reply.response.tokens_used.unwrap_or(0);

        let snapshot = session.snapshot();
        let processed = self
            .processor
            .process(ResponseContext {
                source_id: origin.source_id,
                text: content,
                session: &snapshot,
                tokens_used,
                original_timestamp: origin.timestamp,
                backend: &reply.backend,
                cwd: origin.cwd,
            })
            .await;
        let outcome = match processed {
            Ok(outcome) => outcome,
            Err(err) => {
                session.history.pop_unanswered_user();
                return Err(err);
            }
        };
        report.records_created += outcome.created.len();

        session.history.push_assistant(content);
        let (input, output) = self.split.split(tokens_used);
        session.add_tokens(input, output);
        Ok(())
    }

    fn requeue_after_failure(&self, message: &PendingMessage) {
        if let Err(err) = self.source.requeue(message) {
            error!(message_id = %message.id, error = %err, "Failed to requeue item");
        }
    }

    fn persist(&self, session: &ActiveSession) -> Result<()> {
        if let Some(sessions) = &self.sessions {
            sessions.save(session)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_split() {
        assert_eq!(TokenSplit::default().split(100), (70, 30));
        assert_eq!(TokenSplit::default().split(0), (0, 0));
        assert_eq!(TokenSplit::default().split(7), (4, 2));
        assert_eq!(TokenSplit::new(60).split(10), (6, 4));
        assert_eq!(TokenSplit::new(250).input_percent(), 100);
    }
}
