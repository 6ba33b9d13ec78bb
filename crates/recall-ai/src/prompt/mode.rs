use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Extraction mode: which observation types and concept tags the backend may
/// use, and the language it should answer in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    pub name: String,
    /// Allowed observation types; the first one is the fallback for unknown types.
    pub observation_types: Vec<String>,
    pub concepts: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "English".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Mode {
    /// Software work: the default.
    pub fn code() -> Self {
        Self {
            name: "code".to_string(),
            observation_types: strings(&[
                "change",
                "bugfix",
                "feature",
                "refactor",
                "discovery",
                "decision",
            ]),
            concepts: strings(&[
                "how-it-works",
                "why-it-exists",
                "what-changed",
                "problem-solution",
                "gotcha",
                "pattern",
                "trade-off",
            ]),
            language: default_language(),
        }
    }

    /// Reading and investigation sessions.
    pub fn research() -> Self {
        Self {
            name: "research".to_string(),
            observation_types: strings(&["finding", "source", "question", "hypothesis", "decision"]),
            concepts: strings(&["evidence", "open-question", "contradiction", "summary", "method"]),
            language: default_language(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "code" => Some(Self::code()),
            "research" => Some(Self::research()),
            _ => None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn default_type(&self) -> &str {
        self.observation_types
            .first()
            .map(String::as_str)
            .unwrap_or("discovery")
    }

    pub fn allows_type(&self, kind: &str) -> bool {
        self.observation_types.iter().any(|t| t == kind)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::code()
    }
}

/// Process-wide mode selection, read on every prompt build.
pub trait ModeSource: Send + Sync {
    fn active_mode(&self) -> Mode;
}

/// A mode that never changes
#[derive(Debug, Clone, Default)]
pub struct StaticMode(pub Mode);

impl ModeSource for StaticMode {
    fn active_mode(&self) -> Mode {
        self.0.clone()
    }
}

/// A mode that can be switched while sessions are running
#[derive(Debug, Clone, Default)]
pub struct SharedMode {
    inner: Arc<RwLock<Mode>>,
}

impl SharedMode {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn set(&self, mode: Mode) {
        match self.inner.write() {
            Ok(mut guard) => *guard = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }
}

impl ModeSource for SharedMode {
    fn active_mode(&self) -> Mode {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(Mode::by_name("Research").unwrap().name, "research");
        assert!(Mode::by_name("poetry").is_none());
        assert_eq!(Mode::default().default_type(), "change");
    }

    #[test]
    fn test_shared_mode_switch_is_visible() {
        let shared = SharedMode::new(Mode::code());
        let reader: Arc<dyn ModeSource> = Arc::new(shared.clone());
        assert_eq!(reader.active_mode().name, "code");

        shared.set(Mode::research());
        assert_eq!(reader.active_mode().name, "research");
    }
}
