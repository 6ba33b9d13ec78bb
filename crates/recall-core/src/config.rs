//! Application configuration loaded from `config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use recall_ai::{BackendConfig, BackendKind, ClientOptions, TruncationPolicy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::paths;

const DB_PATH_ENV: &str = "RECALL_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    /// Backends in priority order; the first one is the primary.
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    pub kind: BackendKind,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
    pub max_context_tokens: Option<usize>,
    pub max_context_messages: Option<usize>,
    pub requests_per_minute: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl BackendEntry {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            api_key: None,
            endpoint: None,
            model: None,
            api_version: None,
            max_context_tokens: None,
            max_context_messages: None,
            requests_per_minute: None,
            timeout_secs: None,
        }
    }

    /// Per-call settings with unset fields filled from the backend defaults.
    pub fn backend_config(&self) -> BackendConfig {
        self.kind.with_defaults(BackendConfig {
            api_key: self.api_key.clone(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_version: self.api_version.clone(),
        })
    }

    pub fn truncation_policy(&self) -> TruncationPolicy {
        TruncationPolicy {
            max_tokens: self
                .max_context_tokens
                .unwrap_or_else(|| self.kind.default_max_context_tokens()),
            max_messages: self.max_context_messages,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout_secs: self.timeout_secs,
            requests_per_minute: self.requests_per_minute,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Share of a combined token total booked as input, in percent.
    #[serde(default = "default_input_share")]
    pub input_share_percent: u8,
    /// How long a pass waits for new items before ending, in milliseconds.
    #[serde(default)]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            input_share_percent: default_input_share(),
            idle_timeout_ms: 0,
            mode: default_mode(),
        }
    }
}

fn default_input_share() -> u8 {
    70
}

fn default_mode() -> String {
    "code".to_string()
}

impl RecallConfig {
    /// Load from the default location. A missing file yields defaults; a
    /// broken one is logged and replaced by defaults.
    pub fn load() -> Self {
        let path = paths::config_path();
        let mut config = if path.exists() {
            match Self::load_from_path(&path) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to load config, using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env();
        config
    }

    /// Load from an explicit path. Environment overrides are not applied.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: RecallConfig = toml::from_str(content)?;
        if config.agent.input_share_percent > 100 {
            anyhow::bail!(
                "agent.input_share_percent must be between 0 and 100, got {}",
                config.agent.input_share_percent
            );
        }
        config.backends.retain(|b| {
            let keep = b.max_context_tokens != Some(0);
            if !keep {
                warn!(backend = %b.kind, "Ignoring backend with zero context budget");
            }
            keep
        });
        Ok(config)
    }

    /// Fill missing API keys and the db path from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for backend in self.effective_backends_mut() {
            if backend.api_key.as_deref().map(str::trim).unwrap_or("").is_empty()
                && let Some(key) = lookup(backend.kind.api_key_env()).filter(|k| !k.trim().is_empty())
            {
                backend.api_key = Some(key);
            }
        }

        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.storage.db_path = Some(PathBuf::from(path));
        }
    }

    /// Materialize the default chain so env overrides have somewhere to land.
    fn effective_backends_mut(&mut self) -> &mut Vec<BackendEntry> {
        if self.backends.is_empty() {
            self.backends.push(BackendEntry::new(BackendKind::Claude));
        }
        &mut self.backends
    }

    /// Configured backends, or Claude alone when none are configured.
    pub fn effective_backends(&self) -> Vec<BackendEntry> {
        if self.backends.is_empty() {
            vec![BackendEntry::new(BackendKind::Claude)]
        } else {
            self.backends.clone()
        }
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => paths::database_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let config = RecallConfig::from_toml(
            r#"
            [storage]
            db_path = "/tmp/recall-test.db"

            [[backends]]
            kind = "gemini"
            model = "gemini-2.5-pro"
            max_context_tokens = 20000
            requests_per_minute = 10

            [[backends]]
            kind = "openrouter"
            api_key = "or-key"
            max_context_messages = 40

            [agent]
            input_share_percent = 60
            idle_timeout_ms = 250
            mode = "research"
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].kind, BackendKind::Gemini);
        assert_eq!(config.backends[0].truncation_policy().max_tokens, 20_000);
        assert_eq!(config.backends[0].client_options().requests_per_minute, Some(10));
        assert_eq!(
            config.backends[0].backend_config().model.as_deref(),
            Some("gemini-2.5-pro")
        );
        assert_eq!(config.backends[1].truncation_policy().max_messages, Some(40));
        assert_eq!(config.agent.input_share_percent, 60);
        assert_eq!(config.agent.idle_timeout_ms, 250);
        assert_eq!(config.db_path().unwrap(), PathBuf::from("/tmp/recall-test.db"));
    }

    #[test]
    fn test_defaults() {
        let config = RecallConfig::from_toml("").unwrap();
        assert_eq!(config.agent.input_share_percent, 70);
        assert_eq!(config.agent.mode, "code");
        let backends = config.effective_backends();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].kind, BackendKind::Claude);
    }

    #[test]
    fn test_invalid_share_is_rejected() {
        assert!(RecallConfig::from_toml("[agent]\ninput_share_percent = 150").is_err());
        assert!(RecallConfig::from_toml("[[backends]]\nkind = \"nope\"").is_err());
    }

    #[test]
    fn test_env_fills_missing_keys_only() {
        let mut config = RecallConfig::from_toml(
            r#"
            [[backends]]
            kind = "claude"
            api_key = "from-file"

            [[backends]]
            kind = "gemini"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "from-env"),
            ("GEMINI_API_KEY", "gem-env"),
            ("RECALL_DB_PATH", "/var/lib/recall.db"),
        ]);
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.backends[0].api_key.as_deref(), Some("from-file"));
        assert_eq!(config.backends[1].api_key.as_deref(), Some("gem-env"));
        assert_eq!(config.db_path().unwrap(), PathBuf::from("/var/lib/recall.db"));
    }

    #[test]
    fn test_env_key_reaches_default_chain() {
        let mut config = RecallConfig::default();
        config.apply_env_with(|key| (key == "ANTHROPIC_API_KEY").then(|| "k".to_string()));
        assert_eq!(config.effective_backends()[0].api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_load_from_path_errors_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[backends]\nkind = ").unwrap();
        assert!(RecallConfig::load_from_path(&path).is_err());
    }
}
