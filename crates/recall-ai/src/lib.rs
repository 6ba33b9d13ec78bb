//! Recall AI - extraction backends and conversation state
//!
//! This crate provides:
//! - One client trait over Claude, Gemini and OpenRouter
//! - Conversation history with per-request token budgets
//! - Modes and prompt builders for memory extraction

pub mod error;
mod http_client;
pub mod llm;
pub mod memory;
pub mod prompt;

pub use error::{AiError, Result};
pub use http_client::DEFAULT_TIMEOUT_SECS;
pub use llm::{
    BackendClient, BackendConfig, BackendKind, BackendResponse, ClaudeClient, ClientOptions,
    GeminiClient, Message, OpenRouterClient, Role, create_backend,
};
#[cfg(any(test, feature = "test-utils"))]
pub use llm::{MockBackend, MockStep};
pub use memory::{ConversationHistory, TruncatedHistory, TruncationPolicy, TruncationReport};
pub use prompt::{Mode, ModeSource, ObservationInput, SharedMode, StaticMode, SummaryInput};
