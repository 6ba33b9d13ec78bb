//! Maps session state and work items to prompt text.
//!
//! No I/O happens here. The active mode is read on every call so a mode
//! switch applies to the very next prompt.

use std::sync::Arc;

use recall_ai::prompt::{
    build_continuation_prompt, build_init_prompt, build_observation_prompt, build_summary_prompt,
};
use recall_ai::{Mode, ModeSource, SummaryInput};

use crate::error::{RecallError, Result};
use crate::models::{SessionSnapshot, WorkItem};

#[derive(Clone)]
pub struct PromptAssembler {
    modes: Arc<dyn ModeSource>,
}

impl PromptAssembler {
    pub fn new(modes: Arc<dyn ModeSource>) -> Self {
        Self { modes }
    }

    pub fn active_mode(&self) -> Mode {
        self.modes.active_mode()
    }

    /// Init prompt for the first user turn, continuation prompt afterwards.
    pub fn turn_prompt(&self, session: &SessionSnapshot) -> String {
        let mode = self.active_mode();
        if session.prompt_number <= 1 {
            build_init_prompt(
                &session.project,
                &session.content_session_id,
                &session.user_prompt,
                &mode,
            )
        } else {
            build_continuation_prompt(
                &session.user_prompt,
                session.prompt_number,
                &session.content_session_id,
                &mode,
            )
        }
    }

    pub fn item_prompt(&self, session: &SessionSnapshot, item: &WorkItem) -> Result<String> {
        match item {
            WorkItem::Observation(input) => {
                Ok(build_observation_prompt(input, &self.active_mode()))
            }
            WorkItem::Summarize(input) => self.summary_prompt(session, input),
        }
    }

    /// Summaries continue an existing conversation; without a handle there is
    /// nothing to summarize.
    pub fn summary_prompt(&self, session: &SessionSnapshot, input: &SummaryInput) -> Result<String> {
        if session.memory_session_id.is_none() {
            return Err(RecallError::precondition(format!(
                "summary requested for session {} before any reply bound a conversational handle",
                session.content_session_id
            )));
        }
        Ok(build_summary_prompt(input, &self.active_mode()))
    }
}
