//! Capture runtime
//!
//! ```text
//! EventBridge ──► SessionManager ──spawn──► SessionOrchestrator::run_pass
//!                                              │
//!                 MessageIterator ◄── WorkSource (queue)
//!                                              │
//!                 PromptAssembler ──► FallbackChain ──► ResponseProcessor
//! ```

pub mod assembler;
pub mod bridge;
pub mod fallback;
pub mod manager;
pub mod orchestrator;
pub mod queue;

pub use assembler::PromptAssembler;
pub use bridge::{EventBridge, ToolUseEvent};
pub use fallback::{BackendSlot, ChainReply, FallbackChain, FallbackState, SlotStatus};
pub use manager::SessionManager;
pub use orchestrator::{DEFAULT_INPUT_SHARE_PERCENT, PassReport, SessionOrchestrator, TokenSplit};
pub use queue::{MessageIterator, StorageWorkSource, WorkSource};
