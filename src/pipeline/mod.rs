//! The content pipeline: five ordered stages applied per record.
//!
//! - `sections`: heading extraction from generated or hand-edited text
//! - `stages`: the per-stage processors (inputs, workflow call, outputs)
//! - `writer`: the writing stage's section-by-section generation loop
//! - `runner`: sequential batch execution with per-record isolation

pub mod runner;
pub mod sections;
pub mod stages;
pub mod writer;

pub use runner::{run_batch, BatchSummary};
pub use sections::extract_sections;
pub use stages::{processor_for, StageProcessor};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StageKeys;
use crate::dify::{DifyError, WorkflowRunner};
use crate::store::RecordStore;

/// One of the five ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Research,
    Headers,
    Knowledge,
    Brief,
    Writing,
}

impl Stage {
    /// All stages in pipeline order.
    pub fn all() -> [Stage; 5] {
        [
            Stage::Research,
            Stage::Headers,
            Stage::Knowledge,
            Stage::Brief,
            Stage::Writing,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Headers => "headers",
            Stage::Knowledge => "knowledge",
            Stage::Brief => "brief",
            Stage::Writing => "writing",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        match s.to_lowercase().as_str() {
            "research" => Some(Stage::Research),
            "headers" => Some(Stage::Headers),
            "knowledge" | "knowledge-base" => Some(Stage::Knowledge),
            "brief" => Some(Stage::Brief),
            "writing" => Some(Stage::Writing),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-record stage failure. Terminal for that record in this run;
/// recorded as the stage's `failed:` status.
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Workflow(#[from] DifyError),

    #[error("{0}")]
    Data(String),
}

/// Everything a stage processor may touch while handling one record.
pub struct StageContext<'a> {
    /// Workflow transport
    pub runner: &'a dyn WorkflowRunner,
    /// Record store, used by the writing stage for checkpoints
    pub store: &'a dyn RecordStore,
    /// Per-stage workflow keys
    pub keys: &'a StageKeys,
}
