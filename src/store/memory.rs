//! In-memory record store (non-persistent).

use super::{now_string, NewRecord, RecordPatch, RecordStore, StageStatus, TaskRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<i64, TaskRecord>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn list_records(&self) -> Result<Vec<TaskRecord>, String> {
        let mut records: Vec<TaskRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn get_record(&self, id: i64) -> Result<Option<TaskRecord>, String> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn create_record(&self, input: NewRecord) -> Result<TaskRecord, String> {
        if input.keyword.trim().is_empty() {
            return Err("keyword must not be empty".to_string());
        }

        let id = {
            let mut next = self.next_id.write().await;
            let id = *next;
            *next += 1;
            id
        };

        let now = now_string();
        let record = TaskRecord {
            id,
            keyword: input.keyword,
            language: input.language,
            seed_prompt: input.seed_prompt,
            instructions: input.instructions,
            research_status: StageStatus::NotStarted,
            serp_phrases: String::new(),
            secondary_phrases: String::new(),
            information_graph: String::new(),
            competitor_headers: String::new(),
            knowledge_graph: String::new(),
            headers_status: StageStatus::NotStarted,
            expanded_headers: String::new(),
            h2_headers: String::new(),
            question_headers: String::new(),
            final_sections: String::new(),
            knowledge_status: StageStatus::NotStarted,
            specific_knowledge: String::new(),
            general_knowledge: String::new(),
            brief_status: StageStatus::NotStarted,
            brief_json: String::new(),
            brief_html: String::new(),
            writing_status: StageStatus::NotStarted,
            article: String::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.records.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<(), String> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| format!("Record {} not found", id))?;
        patch.apply(record);
        record.updated_at = now_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryRecordStore::new();

        let a = store
            .create_record(NewRecord {
                keyword: "first".to_string(),
                ..Default::default()
            })
            .await
            .expect("create a");
        let b = store
            .create_record(NewRecord {
                keyword: "second".to_string(),
                ..Default::default()
            })
            .await
            .expect("create b");

        assert!(b.id > a.id);
        assert_eq!(a.research_status, StageStatus::NotStarted);
        assert!(a.article.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_id_descending() {
        let store = InMemoryRecordStore::new();
        for kw in ["one", "two", "three"] {
            store
                .create_record(NewRecord {
                    keyword: kw.to_string(),
                    ..Default::default()
                })
                .await
                .expect("create");
        }

        let records = store.list_records().await.expect("list");
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_keyword_rejected() {
        let store = InMemoryRecordStore::new();
        let result = store
            .create_record(NewRecord {
                keyword: "   ".to_string(),
                ..Default::default()
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_record_errors() {
        let store = InMemoryRecordStore::new();
        let patch = RecordPatch::default();
        assert!(store.update_record(42, &patch).await.is_err());
    }
}
