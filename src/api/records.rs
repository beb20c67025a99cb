//! Record management API endpoints.
//!
//! Provides the data operations the editing surface needs:
//! - List/create/fetch/update records
//! - Bulk CSV import with caller-selected column correspondence
//! - CSV export of every record in a fixed column order

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::csv;
use crate::store::{NewRecord, RecordPatch, TaskRecord};

/// Create record routes.
pub fn routes() -> Router<Arc<super::routes::AppState>> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/import", post(import_records))
        .route("/export", get(export_records))
        .route("/:id", get(get_record).put(update_record))
}

/// Export column order. Matches the record's field order, stage by stage.
const EXPORT_COLUMNS: [&str; 26] = [
    "id",
    "keyword",
    "language",
    "seed_prompt",
    "instructions",
    "research_status",
    "serp_phrases",
    "secondary_phrases",
    "information_graph",
    "competitor_headers",
    "knowledge_graph",
    "headers_status",
    "expanded_headers",
    "h2_headers",
    "question_headers",
    "final_sections",
    "knowledge_status",
    "specific_knowledge",
    "general_knowledge",
    "brief_status",
    "brief_json",
    "brief_html",
    "writing_status",
    "article",
    "created_at",
    "updated_at",
];

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// CSV text with a header row
    pub csv: String,
    /// Header name of the column holding the topic keyword
    #[serde(default = "default_keyword_column")]
    pub keyword_column: String,
    /// Header name of the language column, if any
    pub language_column: Option<String>,
    /// Header name of the seed prompt column, if any
    pub seed_prompt_column: Option<String>,
}

fn default_keyword_column() -> String {
    "keyword".to_string()
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    /// Rows inserted
    pub created: usize,
    /// Rows without a keyword, ignored
    pub skipped: usize,
}

fn internal(e: String) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e)
}

fn store_error(e: String) -> (StatusCode, String) {
    if e.contains("not found") {
        (StatusCode::NOT_FOUND, e)
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, e)
    }
}

/// GET /api/records - All records, newest first.
async fn list_records(
    State(state): State<Arc<super::routes::AppState>>,
) -> Result<Json<Vec<TaskRecord>>, (StatusCode, String)> {
    state.store.list_records().await.map(Json).map_err(internal)
}

/// POST /api/records - Create a record.
async fn create_record(
    State(state): State<Arc<super::routes::AppState>>,
    Json(req): Json<NewRecord>,
) -> Result<Json<TaskRecord>, (StatusCode, String)> {
    if req.keyword.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "keyword must not be empty".to_string()));
    }
    state
        .store
        .create_record(req)
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/records/:id - One record.
async fn get_record(
    State(state): State<Arc<super::routes::AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskRecord>, (StatusCode, String)> {
    match state.store.get_record(id).await.map_err(internal)? {
        Some(record) => Ok(Json(record)),
        None => Err((StatusCode::NOT_FOUND, format!("Record {} not found", id))),
    }
}

/// PUT /api/records/:id - Apply a manual field edit.
async fn update_record(
    State(state): State<Arc<super::routes::AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<TaskRecord>, (StatusCode, String)> {
    state
        .store
        .update_record(id, &patch)
        .await
        .map_err(store_error)?;
    match state.store.get_record(id).await.map_err(internal)? {
        Some(record) => Ok(Json(record)),
        None => Err((StatusCode::NOT_FOUND, format!("Record {} not found", id))),
    }
}

/// POST /api/records/import - Bulk import from CSV.
///
/// The first row must be a header row; the caller names which columns map
/// to the topic inputs. Rows with an empty keyword are skipped.
async fn import_records(
    State(state): State<Arc<super::routes::AppState>>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, (StatusCode, String)> {
    let rows = csv::parse(&req.csv);
    let Some((header, data)) = rows.split_first() else {
        return Err((StatusCode::BAD_REQUEST, "CSV has no header row".to_string()));
    };

    let column_index = |name: &str| header.iter().position(|h| h.trim() == name);

    let keyword_idx = column_index(&req.keyword_column).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("column '{}' not found in header", req.keyword_column),
        )
    })?;
    let language_idx = match &req.language_column {
        Some(name) => Some(column_index(name).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("column '{}' not found in header", name),
            )
        })?),
        None => None,
    };
    let seed_prompt_idx = match &req.seed_prompt_column {
        Some(name) => Some(column_index(name).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("column '{}' not found in header", name),
            )
        })?),
        None => None,
    };

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i)).cloned().unwrap_or_default()
    };

    let mut created = 0;
    let mut skipped = 0;
    for row in data {
        let keyword = cell(row, Some(keyword_idx));
        if keyword.trim().is_empty() {
            skipped += 1;
            continue;
        }
        state
            .store
            .create_record(NewRecord {
                keyword,
                language: cell(row, language_idx),
                seed_prompt: cell(row, seed_prompt_idx),
                instructions: String::new(),
            })
            .await
            .map_err(internal)?;
        created += 1;
    }

    tracing::info!("Imported {} records ({} rows skipped)", created, skipped);
    Ok(Json(ImportResponse { created, skipped }))
}

/// GET /api/records/export - Every record as CSV.
async fn export_records(
    State(state): State<Arc<super::routes::AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let records = state.store.list_records().await.map_err(internal)?;

    let mut out = String::new();
    csv::write_row(&mut out, &EXPORT_COLUMNS);
    for r in &records {
        let id = r.id.to_string();
        let research_status = r.research_status.to_string();
        let headers_status = r.headers_status.to_string();
        let knowledge_status = r.knowledge_status.to_string();
        let brief_status = r.brief_status.to_string();
        let writing_status = r.writing_status.to_string();
        csv::write_row(
            &mut out,
            &[
                &id,
                &r.keyword,
                &r.language,
                &r.seed_prompt,
                &r.instructions,
                &research_status,
                &r.serp_phrases,
                &r.secondary_phrases,
                &r.information_graph,
                &r.competitor_headers,
                &r.knowledge_graph,
                &headers_status,
                &r.expanded_headers,
                &r.h2_headers,
                &r.question_headers,
                &r.final_sections,
                &knowledge_status,
                &r.specific_knowledge,
                &r.general_knowledge,
                &brief_status,
                &r.brief_json,
                &r.brief_html,
                &writing_status,
                &r.article,
                &r.created_at,
                &r.updated_at,
            ],
        );
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"records.csv\"",
            ),
        ],
        out,
    ))
}
