//! Prompt builders. Pure functions of their inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mode::Mode;

/// Longest tool input/output embedded in an observation prompt, in chars.
pub const MAX_TOOL_TEXT_CHARS: usize = 8_000;

/// One tool invocation captured from the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationInput {
    pub tool_name: String,
    pub tool_input: String,
    pub tool_response: String,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Milliseconds since the Unix epoch
    pub created_at_epoch: i64,
    #[serde(default)]
    pub prompt_number: Option<u32>,
}

/// Request to summarize the session so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryInput {
    #[serde(default)]
    pub last_assistant_message: Option<String>,
}

/// Keep at most `max_chars` chars, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}\n... [truncated]", &text[..byte_index]),
        None => text.to_string(),
    }
}

fn format_epoch_ms(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn output_format(mode: &Mode) -> String {
    format!(
        "Respond only with XML blocks in {language}:\n\
         <observation>\n\
         \x20 <type>one of: {types}</type>\n\
         \x20 <title>short title</title>\n\
         \x20 <subtitle>one sentence</subtitle>\n\
         \x20 <facts><fact>concise fact</fact></facts>\n\
         \x20 <narrative>what happened and why it matters</narrative>\n\
         \x20 <concepts><concept>one of: {concepts}</concept></concepts>\n\
         \x20 <files_read><file>path</file></files_read>\n\
         \x20 <files_modified><file>path</file></files_modified>\n\
         </observation>\n\
         Emit nothing when a tool use teaches nothing worth remembering.",
        language = mode.language,
        types = mode.observation_types.join(", "),
        concepts = mode.concepts.join(", "),
    )
}

/// First prompt of a session.
pub fn build_init_prompt(
    project: &str,
    content_session_id: &str,
    user_prompt: &str,
    mode: &Mode,
) -> String {
    format!(
        "You are a memory observer for a coding session ({mode_name} mode).\n\
         You watch tool uses from another assistant and record what is worth \
         remembering across sessions.\n\n\
         <project>{project}</project>\n\
         <session>{content_session_id}</session>\n\
         <user_request>{user_prompt}</user_request>\n\n\
         {format}",
        mode_name = mode.name,
        format = output_format(mode),
    )
}

/// A later user turn in the same session.
pub fn build_continuation_prompt(
    user_prompt: &str,
    prompt_number: u32,
    content_session_id: &str,
    mode: &Mode,
) -> String {
    format!(
        "The user started a new request in session {content_session_id} \
         (prompt #{prompt_number}). Keep observing in {mode_name} mode.\n\n\
         <user_request>{user_prompt}</user_request>\n\n\
         {format}",
        mode_name = mode.name,
        format = output_format(mode),
    )
}

pub fn build_observation_prompt(input: &ObservationInput, mode: &Mode) -> String {
    let mut prompt = format!(
        "<tool_use>\n\
         \x20 <tool>{tool}</tool>\n\
         \x20 <at>{at}</at>\n",
        tool = input.tool_name,
        at = format_epoch_ms(input.created_at_epoch),
    );
    if let Some(cwd) = &input.cwd {
        prompt.push_str(&format!("  <cwd>{}</cwd>\n", cwd));
    }
    prompt.push_str(&format!(
        "  <input>{}</input>\n  <output>{}</output>\n</tool_use>\n\n\
         Record observations of type {} if this tool use is worth remembering.",
        truncate_chars(&input.tool_input, MAX_TOOL_TEXT_CHARS),
        truncate_chars(&input.tool_response, MAX_TOOL_TEXT_CHARS),
        mode.observation_types.join(", "),
    ));
    prompt
}

pub fn build_summary_prompt(input: &SummaryInput, mode: &Mode) -> String {
    let last = input
        .last_assistant_message
        .as_deref()
        .map(|m| truncate_chars(m, MAX_TOOL_TEXT_CHARS))
        .unwrap_or_default();

    format!(
        "The session is pausing. Summarize it in {language}.\n\n\
         <last_assistant_message>{last}</last_assistant_message>\n\n\
         Respond with:\n\
         <summary>\n\
         \x20 <request>what the user asked for</request>\n\
         \x20 <investigated>what was explored</investigated>\n\
         \x20 <learned>what was learned</learned>\n\
         \x20 <completed>what was done</completed>\n\
         \x20 <next_steps>what remains</next_steps>\n\
         \x20 <notes>anything else</notes>\n\
         </summary>\n\
         or <skip_summary/> when nothing happened.",
        language = mode.language,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> ObservationInput {
        ObservationInput {
            tool_name: "Edit".to_string(),
            tool_input: "{\"file\":\"src/lib.rs\"}".to_string(),
            tool_response: "ok".to_string(),
            cwd: Some("/work/app".to_string()),
            created_at_epoch: 1_700_000_000_000,
            prompt_number: Some(2),
        }
    }

    #[test]
    fn test_init_prompt_carries_session_context() {
        let prompt = build_init_prompt("app", "content-1", "fix the build", &Mode::code());
        assert!(prompt.contains("<project>app</project>"));
        assert!(prompt.contains("<session>content-1</session>"));
        assert!(prompt.contains("fix the build"));
        assert!(prompt.contains("bugfix"));
    }

    #[test]
    fn test_continuation_prompt_has_prompt_number() {
        let prompt = build_continuation_prompt("add tests", 3, "content-1", &Mode::research());
        assert!(prompt.contains("prompt #3"));
        assert!(prompt.contains("research mode"));
    }

    #[test]
    fn test_observation_prompt_fields() {
        let prompt = build_observation_prompt(&observation(), &Mode::code());
        assert!(prompt.contains("<tool>Edit</tool>"));
        assert!(prompt.contains("<cwd>/work/app</cwd>"));
        assert!(prompt.contains("2023-11-14T22:13:20+00:00"));
    }

    #[test]
    fn test_tool_text_is_capped_on_char_boundary() {
        let mut input = observation();
        input.tool_response = "é".repeat(MAX_TOOL_TEXT_CHARS + 10);
        let prompt = build_observation_prompt(&input, &Mode::code());
        assert!(prompt.contains("... [truncated]"));
        assert!(prompt.chars().filter(|c| *c == 'é').count() == MAX_TOOL_TEXT_CHARS);
    }

    #[test]
    fn test_summary_prompt_mentions_skip() {
        let prompt = build_summary_prompt(
            &SummaryInput {
                last_assistant_message: Some("All done.".to_string()),
            },
            &Mode::code(),
        );
        assert!(prompt.contains("All done."));
        assert!(prompt.contains("<skip_summary/>"));
    }
}
