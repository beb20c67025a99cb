//! Record storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database
//!
//! The store is the single source of truth for task records. All pipeline
//! writes go through [`RecordStore::update_record`] with a typed
//! [`RecordPatch`], one record at a time; nothing in the crate holds a
//! process-wide cache of records.

mod memory;
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::Stage;

/// Per-stage processing status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
    Failed(String),
}

/// Maximum length of a persisted failure reason.
const REASON_MAX: usize = 300;

impl StageStatus {
    /// Build a failed status, truncating an over-long reason.
    pub fn failed(reason: &str) -> Self {
        let mut reason: String = reason.chars().take(REASON_MAX).collect();
        if reason.is_empty() {
            reason.push_str("unknown error");
        }
        StageStatus::Failed(reason)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StageStatus::Complete)
    }

    /// Parse a persisted status string. Unknown values read as not started
    /// so a hand-edited cell can never wedge a record.
    pub fn parse(s: &str) -> Self {
        match s {
            "not_started" | "" => StageStatus::NotStarted,
            "in_progress" => StageStatus::InProgress,
            "complete" => StageStatus::Complete,
            other => {
                if let Some(reason) = other.strip_prefix("failed:") {
                    StageStatus::Failed(reason.trim_start().to_string())
                } else {
                    StageStatus::NotStarted
                }
            }
        }
    }
}

/// The durable status string stored and shown to users.
impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::NotStarted => write!(f, "not_started"),
            StageStatus::InProgress => write!(f, "in_progress"),
            StageStatus::Complete => write!(f, "complete"),
            StageStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

impl Serialize for StageStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StageStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(StageStatus::parse(&s))
    }
}

/// One topic moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Store-assigned identifier; immutable and unique
    pub id: i64,

    // Topic inputs
    pub keyword: String,
    pub language: String,
    #[serde(default)]
    pub seed_prompt: String,
    #[serde(default)]
    pub instructions: String,

    // Research outputs
    #[serde(default)]
    pub research_status: StageStatus,
    #[serde(default)]
    pub serp_phrases: String,
    #[serde(default)]
    pub secondary_phrases: String,
    #[serde(default)]
    pub information_graph: String,
    #[serde(default)]
    pub competitor_headers: String,
    #[serde(default)]
    pub knowledge_graph: String,

    // Headers outputs
    #[serde(default)]
    pub headers_status: StageStatus,
    #[serde(default)]
    pub expanded_headers: String,
    #[serde(default)]
    pub h2_headers: String,
    #[serde(default)]
    pub question_headers: String,
    /// Authoritative ordered section list for the writing stage. Derived
    /// once from the headers outputs, then owned by the user.
    #[serde(default)]
    pub final_sections: String,

    // Knowledge-base outputs
    #[serde(default)]
    pub knowledge_status: StageStatus,
    #[serde(default)]
    pub specific_knowledge: String,
    #[serde(default)]
    pub general_knowledge: String,

    // Brief outputs
    #[serde(default)]
    pub brief_status: StageStatus,
    #[serde(default)]
    pub brief_json: String,
    #[serde(default)]
    pub brief_html: String,

    // Writing outputs
    #[serde(default)]
    pub writing_status: StageStatus,
    #[serde(default)]
    pub article: String,

    pub created_at: String,
    pub updated_at: String,
}

impl TaskRecord {
    /// The status field owned by a stage.
    pub fn stage_status(&self, stage: Stage) -> &StageStatus {
        match stage {
            Stage::Research => &self.research_status,
            Stage::Headers => &self.headers_status,
            Stage::Knowledge => &self.knowledge_status,
            Stage::Brief => &self.brief_status,
            Stage::Writing => &self.writing_status,
        }
    }

    /// SERP and secondary phrases joined for downstream prompts.
    pub fn combined_phrases(&self, separator: &str) -> String {
        format!("{}{}{}", self.serp_phrases, separator, self.secondary_phrases)
    }
}

/// Inputs for creating a record. Everything else starts empty with all
/// stages not started.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRecord {
    pub keyword: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub seed_prompt: String,
    #[serde(default)]
    pub instructions: String,
}

/// A partial update to one record. Only populated fields are written; the
/// store applies the patch to the single addressed record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub keyword: Option<String>,
    pub language: Option<String>,
    pub seed_prompt: Option<String>,
    pub instructions: Option<String>,

    pub research_status: Option<StageStatus>,
    pub serp_phrases: Option<String>,
    pub secondary_phrases: Option<String>,
    pub information_graph: Option<String>,
    pub competitor_headers: Option<String>,
    pub knowledge_graph: Option<String>,

    pub headers_status: Option<StageStatus>,
    pub expanded_headers: Option<String>,
    pub h2_headers: Option<String>,
    pub question_headers: Option<String>,
    pub final_sections: Option<String>,

    pub knowledge_status: Option<StageStatus>,
    pub specific_knowledge: Option<String>,
    pub general_knowledge: Option<String>,

    pub brief_status: Option<StageStatus>,
    pub brief_json: Option<String>,
    pub brief_html: Option<String>,

    pub writing_status: Option<StageStatus>,
    pub article: Option<String>,
}

impl RecordPatch {
    /// A patch that only moves one stage's status.
    pub fn status(stage: Stage, status: StageStatus) -> Self {
        let mut patch = RecordPatch::default();
        patch.set_stage_status(stage, status);
        patch
    }

    /// Set the status field owned by `stage`.
    pub fn set_stage_status(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Research => self.research_status = Some(status),
            Stage::Headers => self.headers_status = Some(status),
            Stage::Knowledge => self.knowledge_status = Some(status),
            Stage::Brief => self.brief_status = Some(status),
            Stage::Writing => self.writing_status = Some(status),
        }
    }

    /// Apply this patch to a record in place.
    pub fn apply(&self, record: &mut TaskRecord) {
        fn set(target: &mut String, source: &Option<String>) {
            if let Some(v) = source {
                *target = v.clone();
            }
        }
        fn set_status(target: &mut StageStatus, source: &Option<StageStatus>) {
            if let Some(v) = source {
                *target = v.clone();
            }
        }

        set(&mut record.keyword, &self.keyword);
        set(&mut record.language, &self.language);
        set(&mut record.seed_prompt, &self.seed_prompt);
        set(&mut record.instructions, &self.instructions);

        set_status(&mut record.research_status, &self.research_status);
        set(&mut record.serp_phrases, &self.serp_phrases);
        set(&mut record.secondary_phrases, &self.secondary_phrases);
        set(&mut record.information_graph, &self.information_graph);
        set(&mut record.competitor_headers, &self.competitor_headers);
        set(&mut record.knowledge_graph, &self.knowledge_graph);

        set_status(&mut record.headers_status, &self.headers_status);
        set(&mut record.expanded_headers, &self.expanded_headers);
        set(&mut record.h2_headers, &self.h2_headers);
        set(&mut record.question_headers, &self.question_headers);
        set(&mut record.final_sections, &self.final_sections);

        set_status(&mut record.knowledge_status, &self.knowledge_status);
        set(&mut record.specific_knowledge, &self.specific_knowledge);
        set(&mut record.general_knowledge, &self.general_knowledge);

        set_status(&mut record.brief_status, &self.brief_status);
        set(&mut record.brief_json, &self.brief_json);
        set(&mut record.brief_html, &self.brief_html);

        set_status(&mut record.writing_status, &self.writing_status);
        set(&mut record.article, &self.article);
    }
}

/// Get current timestamp as RFC3339 string.
pub fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// Record store trait - implemented by all storage backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// List all records, ordered by id descending.
    async fn list_records(&self) -> Result<Vec<TaskRecord>, String>;

    /// Get a single record by id.
    async fn get_record(&self, id: i64) -> Result<Option<TaskRecord>, String>;

    /// Create a new record with empty stage outputs.
    async fn create_record(&self, input: NewRecord) -> Result<TaskRecord, String>;

    /// Apply a patch to one record. Errors if the record does not exist.
    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<(), String>;
}

/// Record store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStoreKind {
    Memory,
    #[default]
    Sqlite,
}

impl RecordStoreKind {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" => Self::Memory,
            "sqlite" | "db" => Self::Sqlite,
            _ => Self::default(),
        }
    }
}

/// Create a record store based on type and configuration.
pub async fn create_record_store(
    kind: RecordStoreKind,
    data_dir: PathBuf,
) -> Result<Box<dyn RecordStore>, String> {
    match kind {
        RecordStoreKind::Memory => Ok(Box::new(InMemoryRecordStore::new())),
        RecordStoreKind::Sqlite => {
            let store = SqliteRecordStore::new(data_dir).await?;
            Ok(Box::new(store))
        }
    }
}
