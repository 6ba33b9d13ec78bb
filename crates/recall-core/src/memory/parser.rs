//! Extraction of observation and summary blocks from backend replies.
//!
//! Replies are loosely XML shaped. Blocks that are malformed or empty are
//! skipped rather than rejected so a single bad block never loses the rest.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use recall_ai::Mode;

static OBSERVATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<observation>(.*?)</observation>").expect("Invalid regex"));

static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").expect("Invalid regex"));

static SKIP_SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<skip_summary\s*/>").expect("Invalid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedObservation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub facts: Vec<String>,
    pub narrative: Option<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
}

impl ParsedObservation {
    fn has_content(&self) -> bool {
        self.title.is_some()
            || self.subtitle.is_some()
            || self.narrative.is_some()
            || !self.facts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSummary {
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
}

impl ParsedSummary {
    fn has_content(&self) -> bool {
        [
            &self.request,
            &self.investigated,
            &self.learned,
            &self.completed,
            &self.next_steps,
            &self.notes,
        ]
        .iter()
        .any(|field| field.is_some())
    }
}

/// Text between the first `<tag>` and the following `</tag>`, trimmed.
/// Empty values count as absent.
fn extract_field(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    let value = block[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Every `<child>` value inside the `<container>` element.
fn extract_list(block: &str, container: &str, child: &str) -> Vec<String> {
    let Some(inner) = extract_field(block, container) else {
        return Vec::new();
    };

    let open = format!("<{child}>");
    let close = format!("</{child}>");
    let mut items = Vec::new();
    let mut rest = inner.as_str();
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        let value = after[..end].trim();
        if !value.is_empty() {
            items.push(value.to_string());
        }
        rest = &after[end + close.len()..];
    }
    items
}

/// Parse every `<observation>` block. Types outside the mode fall back to the
/// mode's default type; concepts outside the mode are dropped.
pub fn parse_observations(text: &str, mode: &Mode) -> Vec<ParsedObservation> {
    OBSERVATION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let block = caps.get(1)?.as_str();

            let kind = match extract_field(block, "type") {
                Some(kind) if mode.allows_type(&kind) => kind,
                _ => mode.default_type().to_string(),
            };

            let concepts = extract_list(block, "concepts", "concept")
                .into_iter()
                .filter(|c| mode.concepts.is_empty() || mode.concepts.contains(c))
                .collect();

            let observation = ParsedObservation {
                kind,
                title: extract_field(block, "title"),
                subtitle: extract_field(block, "subtitle"),
                facts: extract_list(block, "facts", "fact"),
                narrative: extract_field(block, "narrative"),
                concepts,
                files_read: extract_list(block, "files_read", "file"),
                files_modified: extract_list(block, "files_modified", "file"),
            };

            observation.has_content().then_some(observation)
        })
        .collect()
}

/// Parse the first `<summary>` block. `<skip_summary/>` means no summary.
pub fn parse_summary(text: &str) -> Option<ParsedSummary> {
    if SKIP_SUMMARY_RE.is_match(text) {
        return None;
    }

    let block = SUMMARY_RE.captures(text)?.get(1)?.as_str();
    let summary = ParsedSummary {
        request: extract_field(block, "request"),
        investigated: extract_field(block, "investigated"),
        learned: extract_field(block, "learned"),
        completed: extract_field(block, "completed"),
        next_steps: extract_field(block, "next_steps"),
        notes: extract_field(block, "notes"),
    };

    summary.has_content().then_some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"
Some preamble the model added.
<observation>
  <type>bugfix</type>
  <title>Fix off-by-one in pager</title>
  <subtitle>Last page was dropped</subtitle>
  <facts>
    <fact>pager used exclusive upper bound</fact>
    <fact> </fact>
    <fact>tests now cover the last page</fact>
  </facts>
  <narrative>The pager skipped the final page.</narrative>
  <concepts><concept>gotcha</concept><concept>made-up</concept></concepts>
  <files_read><file>src/pager.rs</file></files_read>
  <files_modified><file>src/pager.rs</file><file>tests/pager.rs</file></files_modified>
</observation>
<observation>
  <type>poem</type>
  <title>Unknown type</title>
</observation>
<observation></observation>
"#;

    #[test]
    fn test_parse_observations() {
        let parsed = parse_observations(REPLY, &Mode::code());
        assert_eq!(parsed.len(), 2);

        let first = &parsed[0];
        assert_eq!(first.kind, "bugfix");
        assert_eq!(first.title.as_deref(), Some("Fix off-by-one in pager"));
        assert_eq!(first.facts.len(), 2);
        assert_eq!(first.concepts, vec!["gotcha".to_string()]);
        assert_eq!(first.files_read, vec!["src/pager.rs".to_string()]);
        assert_eq!(first.files_modified.len(), 2);

        assert_eq!(parsed[1].kind, "change");
    }

    #[test]
    fn test_plain_text_has_no_observations() {
        assert!(parse_observations("Nothing to record.", &Mode::code()).is_empty());
        assert!(parse_observations("", &Mode::code()).is_empty());
    }

    #[test]
    fn test_parse_summary() {
        let text = "<summary><request>Add paging</request><learned>Bounds are exclusive</learned>\
                    <next_steps>Ship it</next_steps></summary>";
        let summary = parse_summary(text).unwrap();
        assert_eq!(summary.request.as_deref(), Some("Add paging"));
        assert_eq!(summary.learned.as_deref(), Some("Bounds are exclusive"));
        assert!(summary.investigated.is_none());
    }

    #[test]
    fn test_skip_summary() {
        assert!(parse_summary("<skip_summary />").is_none());
        assert!(parse_summary("<skip_summary/><summary><request>x</request></summary>").is_none());
        assert!(parse_summary("<summary></summary>").is_none());
    }
}
