//! SQLite-based record store.

use super::{now_string, NewRecord, RecordPatch, RecordStore, StageStatus, TaskRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT '',
    seed_prompt TEXT NOT NULL DEFAULT '',
    instructions TEXT NOT NULL DEFAULT '',
    research_status TEXT NOT NULL DEFAULT 'not_started',
    serp_phrases TEXT NOT NULL DEFAULT '',
    secondary_phrases TEXT NOT NULL DEFAULT '',
    information_graph TEXT NOT NULL DEFAULT '',
    competitor_headers TEXT NOT NULL DEFAULT '',
    knowledge_graph TEXT NOT NULL DEFAULT '',
    headers_status TEXT NOT NULL DEFAULT 'not_started',
    expanded_headers TEXT NOT NULL DEFAULT '',
    h2_headers TEXT NOT NULL DEFAULT '',
    question_headers TEXT NOT NULL DEFAULT '',
    final_sections TEXT NOT NULL DEFAULT '',
    knowledge_status TEXT NOT NULL DEFAULT 'not_started',
    specific_knowledge TEXT NOT NULL DEFAULT '',
    general_knowledge TEXT NOT NULL DEFAULT '',
    brief_status TEXT NOT NULL DEFAULT 'not_started',
    brief_json TEXT NOT NULL DEFAULT '',
    brief_html TEXT NOT NULL DEFAULT '',
    writing_status TEXT NOT NULL DEFAULT 'not_started',
    article TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_id ON records(id DESC);
"#;

const ALL_COLUMNS: &str = "id, keyword, language, seed_prompt, instructions, \
     research_status, serp_phrases, secondary_phrases, information_graph, competitor_headers, knowledge_graph, \
     headers_status, expanded_headers, h2_headers, question_headers, final_sections, \
     knowledge_status, specific_knowledge, general_knowledge, \
     brief_status, brief_json, brief_html, \
     writing_status, article, created_at, updated_at";

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self, String> {
        let db_path = data_dir.join("records.db");

        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| format!("Failed to create data dir: {}", e))?;

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| format!("Failed to open SQLite database: {}", e))?;

            conn.execute_batch(SCHEMA)
                .map_err(|e| format!("Failed to run schema: {}", e))?;

            Ok::<_, String>(conn)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        keyword: row.get(1)?,
        language: row.get(2)?,
        seed_prompt: row.get(3)?,
        instructions: row.get(4)?,
        research_status: StageStatus::parse(&row.get::<_, String>(5)?),
        serp_phrases: row.get(6)?,
        secondary_phrases: row.get(7)?,
        information_graph: row.get(8)?,
        competitor_headers: row.get(9)?,
        knowledge_graph: row.get(10)?,
        headers_status: StageStatus::parse(&row.get::<_, String>(11)?),
        expanded_headers: row.get(12)?,
        h2_headers: row.get(13)?,
        question_headers: row.get(14)?,
        final_sections: row.get(15)?,
        knowledge_status: StageStatus::parse(&row.get::<_, String>(16)?),
        specific_knowledge: row.get(17)?,
        general_knowledge: row.get(18)?,
        brief_status: StageStatus::parse(&row.get::<_, String>(19)?),
        brief_json: row.get(20)?,
        brief_html: row.get(21)?,
        writing_status: StageStatus::parse(&row.get::<_, String>(22)?),
        article: row.get(23)?,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

fn write_record(conn: &Connection, record: &TaskRecord) -> Result<(), String> {
    let updated = conn
        .execute(
            "UPDATE records SET
                keyword = ?2, language = ?3, seed_prompt = ?4, instructions = ?5,
                research_status = ?6, serp_phrases = ?7, secondary_phrases = ?8,
                information_graph = ?9, competitor_headers = ?10, knowledge_graph = ?11,
                headers_status = ?12, expanded_headers = ?13, h2_headers = ?14,
                question_headers = ?15, final_sections = ?16,
                knowledge_status = ?17, specific_knowledge = ?18, general_knowledge = ?19,
                brief_status = ?20, brief_json = ?21, brief_html = ?22,
                writing_status = ?23, article = ?24, updated_at = ?25
             WHERE id = ?1",
            params![
                record.id,
                record.keyword,
                record.language,
                record.seed_prompt,
                record.instructions,
                record.research_status.to_string(),
                record.serp_phrases,
                record.secondary_phrases,
                record.information_graph,
                record.competitor_headers,
                record.knowledge_graph,
                record.headers_status.to_string(),
                record.expanded_headers,
                record.h2_headers,
                record.question_headers,
                record.final_sections,
                record.knowledge_status.to_string(),
                record.specific_knowledge,
                record.general_knowledge,
                record.brief_status.to_string(),
                record.brief_json,
                record.brief_html,
                record.writing_status.to_string(),
                record.article,
                record.updated_at,
            ],
        )
        .map_err(|e| format!("Failed to update record: {}", e))?;

    if updated == 0 {
        return Err(format!("Record {} not found", record.id));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn list_records(&self) -> Result<Vec<TaskRecord>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM records ORDER BY id DESC",
                    ALL_COLUMNS
                ))
                .map_err(|e| format!("Failed to prepare query: {}", e))?;

            let records = stmt
                .query_map([], row_to_record)
                .map_err(|e| format!("Failed to query records: {}", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| format!("Failed to read record row: {}", e))?;

            Ok(records)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn get_record(&self, id: i64) -> Result<Option<TaskRecord>, String> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", ALL_COLUMNS),
                params![id],
                row_to_record,
            )
            .optional()
            .map_err(|e| format!("Failed to query record: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn create_record(&self, input: NewRecord) -> Result<TaskRecord, String> {
        if input.keyword.trim().is_empty() {
            return Err("keyword must not be empty".to_string());
        }

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let now = now_string();
            conn.execute(
                "INSERT INTO records (keyword, language, seed_prompt, instructions, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    input.keyword,
                    input.language,
                    input.seed_prompt,
                    input.instructions,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to insert record: {}", e))?;

            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", ALL_COLUMNS),
                params![id],
                row_to_record,
            )
            .map_err(|e| format!("Failed to read inserted record: {}", e))
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }

    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<(), String> {
        let conn = self.conn.clone();
        let patch = patch.clone();
        // Read-modify-write of the single addressed row; the connection
        // mutex serializes concurrent patches to the same record.
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut record = conn
                .query_row(
                    &format!("SELECT {} FROM records WHERE id = ?1", ALL_COLUMNS),
                    params![id],
                    row_to_record,
                )
                .optional()
                .map_err(|e| format!("Failed to query record: {}", e))?
                .ok_or_else(|| format!("Record {} not found", id))?;

            patch.apply(&mut record);
            record.updated_at = now_string();
            write_record(&conn, &record)
        })
        .await
        .map_err(|e| format!("Task join error: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    async fn temp_store() -> (SqliteRecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteRecordStore::new(dir.path().to_path_buf())
            .await
            .expect("open store");
        (store, dir)
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let (store, _dir) = temp_store().await;

        let created = store
            .create_record(NewRecord {
                keyword: "drip coffee".to_string(),
                language: "en".to_string(),
                seed_prompt: "focus on home brewing".to_string(),
                instructions: String::new(),
            })
            .await
            .expect("create");

        let fetched = store
            .get_record(created.id)
            .await
            .expect("get")
            .expect("record exists");

        assert_eq!(fetched.keyword, "drip coffee");
        assert_eq!(fetched.seed_prompt, "focus on home brewing");
        assert_eq!(fetched.research_status, StageStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_patch_survives_reload() {
        let (store, _dir) = temp_store().await;
        let record = store
            .create_record(NewRecord {
                keyword: "matcha".to_string(),
                language: "en".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        let mut patch = RecordPatch {
            serp_phrases: Some("matcha set, whisk".to_string()),
            ..Default::default()
        };
        patch.set_stage_status(Stage::Research, StageStatus::failed("timeout"));
        store.update_record(record.id, &patch).await.expect("update");

        let fetched = store
            .get_record(record.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.serp_phrases, "matcha set, whisk");
        assert_eq!(
            fetched.research_status,
            StageStatus::Failed("timeout".to_string())
        );
        // Other stages untouched.
        assert_eq!(fetched.writing_status, StageStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_list_descending() {
        let (store, _dir) = temp_store().await;
        for kw in ["a", "b", "c"] {
            store
                .create_record(NewRecord {
                    keyword: kw.to_string(),
                    ..Default::default()
                })
                .await
                .expect("create");
        }
        let records = store.list_records().await.expect("list");
        assert_eq!(records.len(), 3);
        assert!(records[0].id > records[1].id);
        assert!(records[1].id > records[2].id);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let (store, _dir) = temp_store().await;
        let err = store
            .update_record(999, &RecordPatch::default())
            .await
            .expect_err("should fail");
        assert!(err.contains("not found"));
    }
}
