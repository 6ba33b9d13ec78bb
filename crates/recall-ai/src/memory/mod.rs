//! Conversation memory for extraction sessions
//!
//! - **ConversationHistory**: authoritative per-session log of turns
//! - **Truncation**: per-request budget that keeps the newest suffix
//!
//! ```text
//!   history (never shortened)      payload for backend A (small budget)
//!   ┌────┬────┬────┬────┬────┐              ┌────┬────┐
//!   │ u1 │ a1 │ u2 │ a2 │ u3 │   ──────▶    │ a2 │ u3 │
//!   └────┴────┴────┴────┴────┘              └────┴────┘
//! ```

mod conversation;

pub use conversation::{
    CHARS_PER_TOKEN, ConversationHistory, TruncatedHistory, TruncationPolicy, TruncationReport,
    estimate_tokens,
};
