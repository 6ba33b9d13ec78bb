//! LLM module - extraction backends behind one client trait

mod claude;
mod client;
mod factory;
mod gemini;
mod http_error;
#[cfg(any(test, feature = "test-utils"))]
mod mock_client;
mod openrouter;

pub use claude::ClaudeClient;
pub use client::{BackendClient, BackendConfig, BackendResponse, Message, Role};
pub use factory::{BackendKind, ClientOptions, create_backend};
pub use gemini::GeminiClient;
pub use http_error::MAX_ERROR_BODY;
#[cfg(any(test, feature = "test-utils"))]
pub use mock_client::{MockBackend, MockStep, MockStepKind};
pub use openrouter::OpenRouterClient;
