//! Prompt assembly inputs, modes and builders

mod builder;
mod mode;

pub use builder::{
    MAX_TOOL_TEXT_CHARS, ObservationInput, SummaryInput, build_continuation_prompt,
    build_init_prompt, build_observation_prompt, build_summary_prompt, truncate_chars,
};
pub use mode::{Mode, ModeSource, SharedMode, StaticMode};
