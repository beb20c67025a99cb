//! Section-by-section article generation for the writing stage.
//!
//! The writing workflow produces one section body per call. Sections are
//! generated strictly in the order of the final section list, with the
//! accumulated article passed back in so later sections can stay coherent
//! with earlier ones. The accumulator is checkpointed to the store after
//! every section, so a crash mid-article loses at most one section.

use std::collections::HashMap;

use super::sections::extract_sections;
use super::{StageContext, StageFailure};
use crate::store::{RecordPatch, TaskRecord};

/// Placeholder body for a section whose generation call failed. One bad
/// section degrades the article; it does not abort the remaining sections.
const SECTION_FAILED: &str = "[SECTION GENERATION FAILED]";

/// Generate the full article for one record.
///
/// Returns the patch carrying the final document. Fails only when there
/// are no sections to write; per-section failures degrade to an inline
/// placeholder.
pub async fn write_article(
    record: &TaskRecord,
    ctx: &StageContext<'_>,
) -> Result<RecordPatch, StageFailure> {
    let sections = extract_sections(&record.final_sections);
    if sections.is_empty() {
        return Err(StageFailure::Data("no sections to write".to_string()));
    }

    let knowledge = format!(
        "{}\n{}",
        record.specific_knowledge, record.general_knowledge
    );
    let keywords = record.combined_phrases(", ");

    let total = sections.len();
    let mut done = String::new();

    for (index, title) in sections.iter().enumerate() {
        tracing::info!(
            "Writing section {}/{} of record {}: {}",
            index + 1,
            total,
            record.id,
            title
        );

        let mut inputs = HashMap::new();
        inputs.insert("section".to_string(), title.clone());
        inputs.insert("language".to_string(), record.language.clone());
        inputs.insert("knowledge".to_string(), knowledge.clone());
        inputs.insert("keywords".to_string(), keywords.clone());
        inputs.insert("headings".to_string(), record.expanded_headers.clone());
        inputs.insert("done".to_string(), done.clone());
        inputs.insert("keyword".to_string(), record.keyword.clone());
        inputs.insert("instruction".to_string(), record.instructions.clone());

        match ctx.runner.run_workflow(&ctx.keys.writing, inputs).await {
            Ok(out) => {
                done.push_str(&format!("<h2>{}</h2>\n{}\n\n", title, out.get("result")));
            }
            Err(e) => {
                tracing::warn!(
                    "Section '{}' of record {} failed, inserting placeholder: {}",
                    title,
                    record.id,
                    e
                );
                done.push_str(&format!("<h2>{}</h2>\n{}\n\n", title, SECTION_FAILED));
            }
        }

        // Checkpoint the partial article. A failed checkpoint is logged
        // and generation continues; the final merge writes it again.
        let checkpoint = RecordPatch {
            article: Some(done.clone()),
            ..Default::default()
        };
        if let Err(e) = ctx.store.update_record(record.id, &checkpoint).await {
            tracing::warn!("Failed to checkpoint record {}: {}", record.id, e);
        }
    }

    Ok(RecordPatch {
        article: Some(done),
        ..Default::default()
    })
}
