//! The five stage processors.
//!
//! Each processor is a pure mapping: a declared subset of the record's
//! fields feeds the stage's workflow, and the workflow's outputs land on
//! the stage's own output fields. Preconditions are declared here but
//! enforced by the batch runner, which skips (not fails) unready records.

use async_trait::async_trait;
use std::collections::HashMap;

use super::writer::write_article;
use super::{Stage, StageContext, StageFailure};
use crate::config::BriefHeadingSource;
use crate::store::{RecordPatch, TaskRecord};

/// One pipeline stage's processing logic.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// The stage this processor serves.
    fn stage(&self) -> Stage;

    /// Whether the record satisfies this stage's precondition. Input
    /// fields may only come from topic inputs and earlier stages' outputs.
    fn ready(&self, record: &TaskRecord) -> bool;

    /// Process one record snapshot into a field patch. The runner owns the
    /// stage status; the patch carries output fields only.
    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure>;
}

/// Build the processor for a stage.
pub fn processor_for(stage: Stage, brief_headings: BriefHeadingSource) -> Box<dyn StageProcessor> {
    match stage {
        Stage::Research => Box::new(ResearchStage),
        Stage::Headers => Box::new(HeadersStage),
        Stage::Knowledge => Box::new(KnowledgeStage),
        Stage::Brief => Box::new(BriefStage {
            headings: brief_headings,
        }),
        Stage::Writing => Box::new(WritingStage),
    }
}

fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Stage 1: SERP research and knowledge graphs for the topic keyword.
pub struct ResearchStage;

#[async_trait]
impl StageProcessor for ResearchStage {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    fn ready(&self, record: &TaskRecord) -> bool {
        !record.keyword.trim().is_empty()
    }

    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure> {
        let out = ctx
            .runner
            .run_workflow(
                &ctx.keys.research,
                inputs(&[
                    ("keyword", &record.keyword),
                    ("language", &record.language),
                    ("seed_prompt", &record.seed_prompt),
                ]),
            )
            .await?;

        Ok(RecordPatch {
            serp_phrases: Some(out.get("serp_phrases")),
            secondary_phrases: Some(out.get("secondary_phrases")),
            information_graph: Some(out.get("information_graph")),
            competitor_headers: Some(out.get("competitor_headers")),
            knowledge_graph: Some(out.get("knowledge_graph")),
            ..Default::default()
        })
    }
}

/// Stage 2: heading structure built from the research outputs.
pub struct HeadersStage;

#[async_trait]
impl StageProcessor for HeadersStage {
    fn stage(&self) -> Stage {
        Stage::Headers
    }

    fn ready(&self, record: &TaskRecord) -> bool {
        record.research_status.is_complete()
    }

    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure> {
        let phrases = record.combined_phrases("\n");
        let out = ctx
            .runner
            .run_workflow(
                &ctx.keys.headers,
                inputs(&[
                    ("keyword", &record.keyword),
                    ("language", &record.language),
                    ("phrases", &phrases),
                    ("graph", &record.information_graph),
                    ("headings", &record.competitor_headers),
                ]),
            )
            .await?;

        let h2_headers = out.get("h2_headers");
        let question_headers = out.get("question_headers");

        // The final section list is seeded exactly once. After that it
        // belongs to the user; a re-run never overwrites manual edits.
        let final_sections = if record.final_sections.trim().is_empty() {
            let derived = if question_headers.trim().is_empty() {
                h2_headers.clone()
            } else {
                question_headers.clone()
            };
            Some(derived)
        } else {
            None
        };

        Ok(RecordPatch {
            expanded_headers: Some(out.get("expanded_headers")),
            h2_headers: Some(h2_headers),
            question_headers: Some(question_headers),
            final_sections,
            ..Default::default()
        })
    }
}

/// Stage 3: topic knowledge base scraped along the competitor headings.
pub struct KnowledgeStage;

#[async_trait]
impl StageProcessor for KnowledgeStage {
    fn stage(&self) -> Stage {
        Stage::Knowledge
    }

    fn ready(&self, record: &TaskRecord) -> bool {
        !record.competitor_headers.trim().is_empty()
    }

    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure> {
        let out = ctx
            .runner
            .run_workflow(
                &ctx.keys.knowledge,
                inputs(&[
                    ("keyword", &record.keyword),
                    ("language", &record.language),
                    ("headings", &record.competitor_headers),
                ]),
            )
            .await?;

        Ok(RecordPatch {
            specific_knowledge: Some(out.get("specific")),
            general_knowledge: Some(out.get("general")),
            ..Default::default()
        })
    }
}

/// Stage 4: the content brief.
pub struct BriefStage {
    pub headings: BriefHeadingSource,
}

impl BriefStage {
    /// The heading list fed to the brief workflow: the configured source,
    /// falling back to the other list when the preferred one is empty.
    fn resolve_headings<'r>(&self, record: &'r TaskRecord) -> &'r str {
        let (preferred, fallback) = match self.headings {
            BriefHeadingSource::H2Titles => (&record.h2_headers, &record.final_sections),
            BriefHeadingSource::FinalSections => (&record.final_sections, &record.h2_headers),
        };
        if preferred.trim().is_empty() {
            fallback
        } else {
            preferred
        }
    }
}

#[async_trait]
impl StageProcessor for BriefStage {
    fn stage(&self) -> Stage {
        Stage::Brief
    }

    fn ready(&self, record: &TaskRecord) -> bool {
        !self.resolve_headings(record).trim().is_empty()
            && !record.information_graph.trim().is_empty()
    }

    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure> {
        let keywords = record.combined_phrases("\n");
        let out = ctx
            .runner
            .run_workflow(
                &ctx.keys.brief,
                inputs(&[
                    ("keyword", &record.keyword),
                    ("keywords", &keywords),
                    ("headings", self.resolve_headings(record)),
                    ("knowledge_graph", &record.knowledge_graph),
                    ("information_graph", &record.information_graph),
                ]),
            )
            .await?;

        Ok(RecordPatch {
            brief_json: Some(out.get("brief")),
            brief_html: Some(out.get("html")),
            ..Default::default()
        })
    }
}

/// Stage 5: the article, generated section by section.
pub struct WritingStage;

#[async_trait]
impl StageProcessor for WritingStage {
    fn stage(&self) -> Stage {
        Stage::Writing
    }

    fn ready(&self, record: &TaskRecord) -> bool {
        !record.final_sections.trim().is_empty()
    }

    async fn process(
        &self,
        record: &TaskRecord,
        ctx: &StageContext<'_>,
    ) -> Result<RecordPatch, StageFailure> {
        write_article(record, ctx).await
    }
}
