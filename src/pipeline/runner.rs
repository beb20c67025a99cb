//! Sequential batch execution with per-record failure isolation.
//!
//! One record at a time, in the order given. Each record moves through
//! in-progress to complete or failed before the next one starts. Nothing a
//! single record does (a transport failure, a data problem, even a panic in
//! a processor) can abort the rest of the batch or leave that record stuck
//! in progress.

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;

use super::stages::StageProcessor;
use super::StageContext;
use crate::store::{RecordPatch, StageStatus, TaskRecord};

/// Aggregate outcome of one batch run. Per-record outcomes live in the
/// records' durable status fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Records whose stage completed and whose outputs were persisted
    pub succeeded: usize,
    /// Records that ended in a failed status
    pub failed: usize,
    /// Records whose precondition was unmet; status untouched
    pub skipped: usize,
}

/// Run `processor` over `records`, sequentially.
///
/// Precondition-unmet records are skipped and reported separately from
/// failures. Already-complete work is expected to be excluded by the next
/// stage's precondition, not by this function.
pub async fn run_batch(
    ctx: &StageContext<'_>,
    processor: &dyn StageProcessor,
    records: &[TaskRecord],
) -> BatchSummary {
    let stage = processor.stage();
    let mut summary = BatchSummary::default();

    for record in records {
        if !processor.ready(record) {
            tracing::info!(
                "Skipping record {} ('{}'): not ready for {}",
                record.id,
                record.keyword,
                stage
            );
            summary.skipped += 1;
            continue;
        }

        tracing::info!("Running {} for record {} ('{}')", stage, record.id, record.keyword);

        if let Err(e) = ctx
            .store
            .update_record(record.id, &RecordPatch::status(stage, StageStatus::InProgress))
            .await
        {
            tracing::error!("Failed to mark record {} in progress: {}", record.id, e);
            summary.failed += 1;
            continue;
        }

        // A panicking processor is a bug, but it must not take the batch
        // down or strand the record in progress.
        let outcome = AssertUnwindSafe(processor.process(record, ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(mut patch)) => {
                patch.set_stage_status(stage, StageStatus::Complete);
                match ctx.store.update_record(record.id, &patch).await {
                    Ok(()) => {
                        tracing::info!("Record {} completed {}", record.id, stage);
                        summary.succeeded += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to persist {} outputs for record {}: {}",
                            stage,
                            record.id,
                            e
                        );
                        write_failed_status(ctx, record.id, stage, &format!("store write failed: {}", e))
                            .await;
                        summary.failed += 1;
                    }
                }
            }
            Ok(Err(failure)) => {
                let reason = failure.to_string();
                tracing::warn!("Record {} failed {}: {}", record.id, stage, reason);
                write_failed_status(ctx, record.id, stage, &reason).await;
                summary.failed += 1;
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(
                    "Processor for {} panicked on record {}: {}",
                    stage,
                    record.id,
                    reason
                );
                write_failed_status(ctx, record.id, stage, &format!("unexpected error: {}", reason))
                    .await;
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Batch {} finished: {} succeeded, {} failed, {} skipped",
        stage,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    summary
}

/// Write a failed status. This write is terminal: if the store itself is
/// down there is nothing left to record the failure in, so it is logged
/// and the batch moves on.
async fn write_failed_status(
    ctx: &StageContext<'_>,
    record_id: i64,
    stage: super::Stage,
    reason: &str,
) {
    let status = StageStatus::failed(reason);
    if let Err(e) = ctx
        .store
        .update_record(record_id, &RecordPatch::status(stage, status))
        .await
    {
        tracing::error!("Failed to record failure status for record {}: {}", record_id, e);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageKeys;
    use crate::dify::{DifyError, WorkflowOutputs, WorkflowRunner};
    use crate::pipeline::{Stage, StageFailure};
    use crate::store::{InMemoryRecordStore, NewRecord, RecordStore};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn test_keys() -> StageKeys {
        StageKeys {
            research: "app-r".to_string(),
            headers: "app-h".to_string(),
            knowledge: "app-k".to_string(),
            brief: "app-b".to_string(),
            writing: "app-w".to_string(),
        }
    }

    /// Transport that always fails; used to drive failure paths.
    struct FailingRunner;

    #[async_trait]
    impl WorkflowRunner for FailingRunner {
        async fn run_workflow(
            &self,
            _api_key: &str,
            _inputs: HashMap<String, String>,
        ) -> Result<WorkflowOutputs, DifyError> {
            Err(DifyError::Network("connection refused".to_string()))
        }
    }

    /// Processor that panics on a chosen keyword and succeeds otherwise.
    struct PanickyProcessor {
        panic_on: String,
    }

    #[async_trait]
    impl StageProcessor for PanickyProcessor {
        fn stage(&self) -> Stage {
            Stage::Research
        }

        fn ready(&self, _record: &TaskRecord) -> bool {
            true
        }

        async fn process(
            &self,
            record: &TaskRecord,
            _ctx: &StageContext<'_>,
        ) -> Result<RecordPatch, StageFailure> {
            if record.keyword == self.panic_on {
                panic!("boom on {}", record.keyword);
            }
            Ok(RecordPatch {
                serp_phrases: Some("phrases".to_string()),
                ..Default::default()
            })
        }
    }

    async fn seed_records(store: &InMemoryRecordStore, keywords: &[&str]) -> Vec<TaskRecord> {
        let mut records = Vec::new();
        for kw in keywords {
            records.push(
                store
                    .create_record(NewRecord {
                        keyword: kw.to_string(),
                        language: "en".to_string(),
                        ..Default::default()
                    })
                    .await
                    .expect("create"),
            );
        }
        records
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_outputs_untouched() {
        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["espresso"]).await;
        let runner = FailingRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = crate::pipeline::processor_for(Stage::Research, Default::default());

        let summary = run_batch(&ctx, processor.as_ref(), &records).await;
        assert_eq!(summary, BatchSummary { succeeded: 0, failed: 1, skipped: 0 });

        let record = store
            .get_record(records[0].id)
            .await
            .expect("get")
            .expect("exists");
        match &record.research_status {
            StageStatus::Failed(reason) => assert!(reason.contains("connection refused")),
            other => panic!("expected failed status, got {:?}", other),
        }
        // No partial writes on failure.
        assert!(record.serp_phrases.is_empty());
        assert!(record.information_graph.is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_one_record() {
        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["alpha", "bravo", "charlie"]).await;
        let runner = FailingRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = PanickyProcessor {
            panic_on: "bravo".to_string(),
        };

        let summary = run_batch(&ctx, &processor, &records).await;
        assert_eq!(summary, BatchSummary { succeeded: 2, failed: 1, skipped: 0 });

        let alpha = store.get_record(records[0].id).await.unwrap().unwrap();
        let bravo = store.get_record(records[1].id).await.unwrap().unwrap();
        let charlie = store.get_record(records[2].id).await.unwrap().unwrap();

        assert_eq!(alpha.research_status, StageStatus::Complete);
        assert_eq!(charlie.research_status, StageStatus::Complete);
        match &bravo.research_status {
            StageStatus::Failed(reason) => assert!(reason.contains("unexpected error")),
            other => panic!("expected failed status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unready_records_are_skipped_not_failed() {
        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["ready", "not ready"]).await;
        // Headers requires completed research; give it to one record only.
        store
            .update_record(
                records[0].id,
                &RecordPatch::status(Stage::Research, StageStatus::Complete),
            )
            .await
            .expect("update");
        let records: Vec<TaskRecord> = futures::future::join_all(
            records.iter().map(|r| store.get_record(r.id)),
        )
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

        struct NoopRunner;

        #[async_trait]
        impl WorkflowRunner for NoopRunner {
            async fn run_workflow(
                &self,
                _api_key: &str,
                _inputs: HashMap<String, String>,
            ) -> Result<WorkflowOutputs, DifyError> {
                Ok(WorkflowOutputs::default())
            }
        }

        let runner = NoopRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = crate::pipeline::processor_for(Stage::Headers, Default::default());

        let summary = run_batch(&ctx, processor.as_ref(), &records).await;
        assert_eq!(summary, BatchSummary { succeeded: 1, failed: 0, skipped: 1 });

        // Skipped record's status is untouched.
        let skipped = store.get_record(records[1].id).await.unwrap().unwrap();
        assert_eq!(skipped.headers_status, StageStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_no_record_left_in_progress() {
        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["one", "two"]).await;
        let runner = FailingRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = PanickyProcessor {
            panic_on: "one".to_string(),
        };

        run_batch(&ctx, &processor, &records).await;

        for record in store.list_records().await.expect("list") {
            assert_ne!(*record.stage_status(Stage::Research), StageStatus::InProgress);
        }
    }

    #[tokio::test]
    async fn test_headers_rerun_preserves_manual_section_list() {
        /// Returns fixed headers outputs on every call.
        struct HeadersRunner;

        #[async_trait]
        impl WorkflowRunner for HeadersRunner {
            async fn run_workflow(
                &self,
                _api_key: &str,
                _inputs: HashMap<String, String>,
            ) -> Result<WorkflowOutputs, DifyError> {
                let mut values = HashMap::new();
                values.insert("h2_headers".to_string(), "<h2>Generated title</h2>".to_string());
                values.insert(
                    "question_headers".to_string(),
                    "<h2>Generated question?</h2>".to_string(),
                );
                Ok(WorkflowOutputs::new(values))
            }
        }

        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["grinders"]).await;
        store
            .update_record(
                records[0].id,
                &RecordPatch::status(Stage::Research, StageStatus::Complete),
            )
            .await
            .expect("update");

        let runner = HeadersRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = crate::pipeline::processor_for(Stage::Headers, Default::default());

        // First run seeds the empty final section list from the questions.
        let snapshot = vec![store.get_record(records[0].id).await.unwrap().unwrap()];
        run_batch(&ctx, processor.as_ref(), &snapshot).await;
        let record = store.get_record(records[0].id).await.unwrap().unwrap();
        assert_eq!(record.final_sections, "<h2>Generated question?</h2>");

        // The user rewrites the outline by hand.
        store
            .update_record(
                record.id,
                &RecordPatch {
                    final_sections: Some("My outline\nKept as-is".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("manual edit");

        // A second headers run regenerates outputs but not the outline.
        let snapshot = vec![store.get_record(record.id).await.unwrap().unwrap()];
        let summary = run_batch(&ctx, processor.as_ref(), &snapshot).await;
        assert_eq!(summary.succeeded, 1);

        let record = store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(record.final_sections, "My outline\nKept as-is");
        assert_eq!(record.h2_headers, "<h2>Generated title</h2>");
    }

    #[tokio::test]
    async fn test_writing_failure_keeps_checkpointed_sections() {
        let store = InMemoryRecordStore::new();
        let records = seed_records(&store, &["guide"]).await;
        store
            .update_record(
                records[0].id,
                &RecordPatch {
                    final_sections: Some("<h2>Intro</h2><h2>Details</h2>".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        let records = vec![store.get_record(records[0].id).await.unwrap().unwrap()];

        let runner = FailingRunner;
        let keys = test_keys();
        let ctx = StageContext {
            runner: &runner,
            store: &store,
            keys: &keys,
        };
        let processor = crate::pipeline::processor_for(Stage::Writing, Default::default());

        let summary = run_batch(&ctx, processor.as_ref(), &records).await;
        // Every section degraded to a placeholder but the stage completes.
        assert_eq!(summary, BatchSummary { succeeded: 1, failed: 0, skipped: 0 });

        let record = store.get_record(records[0].id).await.unwrap().unwrap();
        assert_eq!(record.writing_status, StageStatus::Complete);
        assert!(record.article.contains("<h2>Intro</h2>"));
        assert!(record.article.contains("<h2>Details</h2>"));
    }
}
