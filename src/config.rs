//! Configuration management for draftmill.
//!
//! Configuration can be set via environment variables:
//! - `DIFY_BASE_URL` - Required. Base URL of the Dify API (e.g. `https://api.dify.ai/v1`).
//! - `DIFY_KEY_RESEARCH` - Required. Workflow API key for the research stage.
//! - `DIFY_KEY_HEADERS` - Required. Workflow API key for the headers stage.
//! - `DIFY_KEY_KNOWLEDGE` - Required. Workflow API key for the knowledge-base stage.
//! - `DIFY_KEY_BRIEF` - Required. Workflow API key for the brief stage.
//! - `DIFY_KEY_WRITING` - Required. Workflow API key for the writing stage.
//! - `DIFY_TIMEOUT_SECS` - Optional. Per-call timeout in seconds. Defaults to `300`.
//! - `DIFY_USER` - Optional. Caller identifier sent with each workflow run. Defaults to `draftmill`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `STORE` - Optional. Record store backend, `sqlite` or `memory`. Defaults to `sqlite`.
//! - `DATA_DIR` - Optional. Directory for the sqlite database. Defaults to the current directory.
//! - `BRIEF_HEADINGS` - Optional. Heading source for the brief stage, `h2` or `final`. Defaults to `h2`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::Stage;
use crate::store::RecordStoreKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which heading list the brief stage feeds to its workflow.
///
/// Whichever source is preferred, the other list is used as a fallback when
/// the preferred one is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BriefHeadingSource {
    /// Generated H2 titles, falling back to the final section list.
    #[default]
    H2Titles,
    /// The user-editable final section list, falling back to H2 titles.
    FinalSections,
}

impl BriefHeadingSource {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "h2" => Some(Self::H2Titles),
            "final" => Some(Self::FinalSections),
            _ => None,
        }
    }
}

/// Per-stage Dify workflow API keys.
///
/// Each pipeline stage is backed by its own published workflow, and Dify
/// scopes the credential to the workflow, so the key doubles as the
/// capability identifier.
#[derive(Debug, Clone)]
pub struct StageKeys {
    pub research: String,
    pub headers: String,
    pub knowledge: String,
    pub brief: String,
    pub writing: String,
}

impl StageKeys {
    /// The API key for a given stage.
    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Research => &self.research,
            Stage::Headers => &self.headers,
            Stage::Knowledge => &self.knowledge,
            Stage::Brief => &self.brief,
            Stage::Writing => &self.writing,
        }
    }
}

/// Dify transport configuration.
#[derive(Debug, Clone)]
pub struct DifyConfig {
    /// Base URL of the Dify API
    pub base_url: String,

    /// Caller identifier sent as the `user` field of every run
    pub user: String,

    /// Per-call timeout; generation workflows run for minutes
    pub timeout: Duration,

    /// Per-stage workflow keys
    pub keys: StageKeys,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Record store backend
    pub store: RecordStoreKind,

    /// Directory for persistent data
    pub data_dir: PathBuf,

    /// Dify transport configuration
    pub dify: DifyConfig,

    /// Heading source for the brief stage
    pub brief_headings: BriefHeadingSource,
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `DIFY_BASE_URL` or any of the
    /// five stage keys is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = require_env("DIFY_BASE_URL")?;

        let keys = StageKeys {
            research: require_env("DIFY_KEY_RESEARCH")?,
            headers: require_env("DIFY_KEY_HEADERS")?,
            knowledge: require_env("DIFY_KEY_KNOWLEDGE")?,
            brief: require_env("DIFY_KEY_BRIEF")?,
            writing: require_env("DIFY_KEY_WRITING")?,
        };

        let timeout_secs: u64 = std::env::var("DIFY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("DIFY_TIMEOUT_SECS".to_string(), format!("{}", e))
            })?;

        let user = std::env::var("DIFY_USER").unwrap_or_else(|_| "draftmill".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let store = std::env::var("STORE")
            .map(|s| RecordStoreKind::from_str(&s))
            .unwrap_or_default();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let brief_headings = match std::env::var("BRIEF_HEADINGS") {
            Ok(v) => BriefHeadingSource::parse(&v)
                .ok_or_else(|| ConfigError::InvalidValue("BRIEF_HEADINGS".to_string(), v))?,
            Err(_) => BriefHeadingSource::default(),
        };

        Ok(Self {
            host,
            port,
            store,
            data_dir,
            dify: DifyConfig {
                base_url,
                user,
                timeout: Duration::from_secs(timeout_secs),
                keys,
            },
            brief_headings,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(base_url: String, keys: StageKeys) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            store: RecordStoreKind::Memory,
            data_dir: PathBuf::from("."),
            dify: DifyConfig {
                base_url,
                user: "draftmill".to_string(),
                timeout: Duration::from_secs(300),
                keys,
            },
            brief_headings: BriefHeadingSource::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brief_heading_source_parse() {
        assert_eq!(BriefHeadingSource::parse("h2"), Some(BriefHeadingSource::H2Titles));
        assert_eq!(BriefHeadingSource::parse("FINAL"), Some(BriefHeadingSource::FinalSections));
        assert_eq!(BriefHeadingSource::parse("markdown"), None);
    }

    #[test]
    fn test_stage_keys_lookup() {
        let keys = StageKeys {
            research: "app-r".to_string(),
            headers: "app-h".to_string(),
            knowledge: "app-k".to_string(),
            brief: "app-b".to_string(),
            writing: "app-w".to_string(),
        };
        assert_eq!(keys.for_stage(Stage::Research), "app-r");
        assert_eq!(keys.for_stage(Stage::Writing), "app-w");
    }
}
