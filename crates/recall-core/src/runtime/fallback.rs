//! Backend fallback chain
//!
//! Slots are tried in priority order with the same conversation history. Each
//! slot truncates its own payload from the full history, so a backend with a
//! larger budget sees more context than the one before it.
//!
//! ```text
//! Primary ──fail──► Fallback{1} ──fail──► ... ──fail──► Exhausted
//!    │                  │
//!    └── ok ──► reply   └── ok ──► reply
//! ```
//!
//! Cancellation is checked before every slot and raced against every send; it
//! is never treated as a failure and never moves the chain forward.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use recall_ai::{
    AiError, BackendClient, BackendConfig, BackendResponse, ConversationHistory, TruncationPolicy,
    TruncationReport, create_backend,
};

use crate::config::RecallConfig;
use crate::error::{RecallError, Result};

/// One backend with its call settings and payload budget.
#[derive(Clone)]
pub struct BackendSlot {
    pub client: Arc<dyn BackendClient>,
    pub config: BackendConfig,
    pub policy: TruncationPolicy,
}

impl BackendSlot {
    pub fn new(client: Arc<dyn BackendClient>, config: BackendConfig, policy: TruncationPolicy) -> Self {
        Self {
            client,
            config,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }
}

/// Position of a send within the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Primary,
    Fallback { index: usize },
    Exhausted,
}

impl FallbackState {
    fn at(index: usize, len: usize) -> Self {
        match index {
            0 if len > 0 => FallbackState::Primary,
            i if i < len => FallbackState::Fallback { index: i },
            _ => FallbackState::Exhausted,
        }
    }
}

/// Successful reply and where it came from
#[derive(Debug, Clone)]
pub struct ChainReply {
    pub response: BackendResponse,
    pub backend: String,
    pub slot: usize,
    pub truncation: Option<TruncationReport>,
}

/// Health counters of one slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub backend: String,
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

pub struct FallbackChain {
    slots: Vec<BackendSlot>,
    health: Mutex<Vec<SlotStatus>>,
}

impl FallbackChain {
    pub fn new(slots: Vec<BackendSlot>) -> Self {
        let health = slots
            .iter()
            .map(|slot| SlotStatus {
                backend: slot.name().to_string(),
                ..Default::default()
            })
            .collect();
        Self {
            slots,
            health: Mutex::new(health),
        }
    }

    /// Chain built from the configured backends in priority order.
    pub fn from_config(config: &RecallConfig) -> Result<Self> {
        let mut slots = Vec::new();
        for entry in config.effective_backends() {
            let client = create_backend(entry.kind, &entry.client_options())?;
            slots.push(BackendSlot::new(
                client,
                entry.backend_config(),
                entry.truncation_policy(),
            ));
        }
        Ok(Self::new(slots))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.slots.first().map(BackendSlot::name)
    }

    pub fn status(&self) -> Vec<SlotStatus> {
        match self.health.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, index: usize, outcome: std::result::Result<(), &AiError>) {
        let mut guard = match self.health.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(status) = guard.get_mut(index) {
            match outcome {
                Ok(()) => status.successes += 1,
                Err(err) => {
                    status.failures += 1;
                    status.last_error = Some(err.to_string());
                }
            }
        }
    }

    /// Send `history` to the first slot that answers.
    ///
    /// When every slot fails, the primary's error is returned.
    pub async fn send(
        &self,
        history: &ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<ChainReply> {
        if self.slots.is_empty() {
            return Err(AiError::configuration("fallback", "no backends configured").into());
        }

        let mut first_error: Option<AiError> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RecallError::Cancelled);
            }

            let state = FallbackState::at(index, self.slots.len());
            let payload = history.truncated(&slot.policy);
            if let Some(report) = &payload.report {
                warn!(
                    backend = slot.name(),
                    original = report.original,
                    kept = report.kept,
                    dropped = report.dropped,
                    estimated_tokens = report.estimated_tokens,
                    ceiling = slot.policy.max_tokens,
                    "Truncated conversation history for request"
                );
            }

            debug!(backend = slot.name(), state = ?state, messages = payload.messages.len(), "Sending to backend");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RecallError::Cancelled),
                result = slot.client.send(&payload.messages, &slot.config) => result,
            };

            match result {
                Ok(response) => {
                    self.record(index, Ok(()));
                    return Ok(ChainReply {
                        response,
                        backend: slot.name().to_string(),
                        slot: index,
                        truncation: payload.report,
                    });
                }
                Err(err) => {
                    self.record(index, Err(&err));
                    if !err.is_fallback_eligible() {
                        return Err(err.into());
                    }
                    let next = FallbackState::at(index + 1, self.slots.len());
                    warn!(
                        backend = slot.name(),
                        state = ?state,
                        next = ?next,
                        error = %err,
                        "Backend failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        error!(state = ?FallbackState::Exhausted, backends = self.slots.len(), "All backends failed");
        Err(first_error
            .map(RecallError::from)
            .unwrap_or_else(|| AiError::configuration("fallback", "no backends configured").into()))
    }
}
