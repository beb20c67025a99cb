//! Pipeline execution API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::pipeline::{processor_for, run_batch, BatchSummary, Stage, StageContext};
use crate::store::TaskRecord;

/// Create pipeline routes.
pub fn routes() -> Router<Arc<super::routes::AppState>> {
    Router::new().route("/:stage/run", post(run_stage))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunStageRequest {
    /// Record ids to process, in order. Omitted means every record,
    /// oldest first.
    #[serde(default)]
    pub ids: Option<Vec<i64>>,
}

/// POST /api/pipeline/:stage/run - Run one stage over the selection.
///
/// Blocks until the batch finishes; records are processed one at a time.
/// Per-record outcomes land in the records' status fields, the response
/// carries only the aggregate counts.
async fn run_stage(
    State(state): State<Arc<super::routes::AppState>>,
    Path(stage): Path<String>,
    Json(req): Json<RunStageRequest>,
) -> Result<Json<BatchSummary>, (StatusCode, String)> {
    let stage = Stage::parse(&stage)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown stage '{}'", stage)))?;

    let records = select_records(&state, req.ids).await?;
    tracing::info!("Starting {} batch over {} records", stage, records.len());

    let processor = processor_for(stage, state.config.brief_headings);
    let ctx = StageContext {
        runner: state.runner.as_ref(),
        store: state.store.as_ref(),
        keys: &state.config.dify.keys,
    };

    let summary = run_batch(&ctx, processor.as_ref(), &records).await;
    Ok(Json(summary))
}

async fn select_records(
    state: &super::routes::AppState,
    ids: Option<Vec<i64>>,
) -> Result<Vec<TaskRecord>, (StatusCode, String)> {
    match ids {
        Some(ids) => {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                let record = state
                    .store
                    .get_record(id)
                    .await
                    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?
                    .ok_or_else(|| {
                        (StatusCode::NOT_FOUND, format!("Record {} not found", id))
                    })?;
                records.push(record);
            }
            Ok(records)
        }
        None => {
            // The listing is newest-first; batches run oldest-first.
            let mut records = state
                .store
                .list_records()
                .await
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e))?;
            records.reverse();
            Ok(records)
        }
    }
}
