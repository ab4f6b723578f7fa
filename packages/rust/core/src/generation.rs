//! Keyword-scoped generators: gap commentary, content drafts, and JSON-LD
//! markup.
//!
//! Model output is validated into [`ContentDraft`] here, at the stage
//! boundary. Anything that does not fit is rejected as
//! [`SeoscopeError::Generation`] instead of travelling on untyped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use seoscope_llm::{GenerationRequest, GenerationTask, TextGenerator, extract_json};
use seoscope_shared::{
    AnalysisResult, ContentDraft, Intent, OutlineSection, Result, RetryPolicy, SchemaMarkup,
    SeoscopeError, StrategyBrief,
};

/// Longest meta description kept; longer ones are cut at a word boundary.
pub const MAX_META_DESCRIPTION: usize = 160;

/// Schema.org caps `headline` at 110 characters.
const MAX_HEADLINE: usize = 110;

// ---------------------------------------------------------------------------
// Content drafting
// ---------------------------------------------------------------------------

/// Produces a [`ContentDraft`] conditioned on a keyword's strategy.
#[derive(Clone)]
pub struct ContentDrafter {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ContentDrafter {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            generator,
            retry,
            timeout,
        }
    }

    #[instrument(skip_all, fields(keyword = %keyword, generator = self.generator.name()))]
    pub async fn draft(
        &self,
        keyword: &str,
        intent: Intent,
        brief: &StrategyBrief,
    ) -> Result<ContentDraft> {
        let request = GenerationRequest::new(
            GenerationTask::DraftContent,
            json!({
                "keyword": keyword,
                "intent": intent.as_str(),
                "recommendations": brief.recommendations,
            }),
        );

        let raw = self
            .retry
            .run("draft", self.timeout, || self.generator.generate(&request))
            .await?;

        let value = extract_json(&raw)
            .ok_or_else(|| SeoscopeError::Generation("draft is not valid JSON".to_string()))?;
        parse_draft(keyword, &value)
    }
}

fn parse_draft(keyword: &str, value: &Value) -> Result<ContentDraft> {
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let title = text("title");
    if title.is_empty() {
        return Err(SeoscopeError::Generation("draft has no title".to_string()));
    }

    let Some(items) = value.get("outline").and_then(Value::as_array) else {
        return Err(SeoscopeError::Generation("draft has no outline".to_string()));
    };

    let mut outline = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let section: OutlineSection = serde_json::from_value(item.clone()).map_err(|e| {
            SeoscopeError::Generation(format!("outline section {i} is malformed: {e}"))
        })?;
        if !(1..=6).contains(&section.level) || section.heading.trim().is_empty() {
            return Err(SeoscopeError::Generation(format!(
                "outline section {i} needs a level in 1..=6 and a heading"
            )));
        }
        outline.push(OutlineSection {
            heading: section.heading.trim().to_string(),
            ..section
        });
    }
    if outline.is_empty() {
        return Err(SeoscopeError::Generation("draft outline is empty".to_string()));
    }

    let mut meta_description = text("meta_description");
    if meta_description.chars().count() > MAX_META_DESCRIPTION {
        warn!(keyword, "meta description too long, truncating");
        meta_description = truncate_words(&meta_description, MAX_META_DESCRIPTION);
    }

    Ok(ContentDraft {
        keyword: keyword.to_string(),
        title,
        meta_description,
        outline,
        body: text("body"),
    })
}

/// Cut `s` to at most `max` chars, preferring the last word boundary.
fn truncate_words(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

/// Builds JSON-LD markup from a draft. Pure; no model call.
#[derive(Debug, Clone, Default)]
pub struct MarkupGenerator;

impl MarkupGenerator {
    pub fn new() -> Self {
        Self
    }

    /// An `@graph` with one `Article`, plus an `FAQPage` when the outline
    /// has question headings.
    pub fn generate(&self, draft: &ContentDraft, target_url: &str) -> Result<SchemaMarkup> {
        if draft.title.trim().is_empty() {
            return Err(SeoscopeError::Generation(
                "cannot mark up a draft without a title".to_string(),
            ));
        }

        let mut article = json!({
            "@type": "Article",
            "headline": truncate_words(&draft.title, MAX_HEADLINE),
            "about": draft.keyword,
            "keywords": draft.keyword,
            "mainEntityOfPage": target_url,
            "articleSection": draft
                .outline
                .iter()
                .map(|s| s.heading.as_str())
                .collect::<Vec<_>>(),
            "wordCount": draft.body.split_whitespace().count(),
        });
        if !draft.meta_description.is_empty() {
            article["description"] = json!(draft.meta_description);
        }

        let mut graph = vec![article];

        let questions: Vec<Value> = draft
            .outline
            .iter()
            .filter(|s| s.heading.ends_with('?'))
            .map(|s| {
                let answer = if s.points.is_empty() {
                    s.heading.trim_end_matches('?').to_string()
                } else {
                    s.points.join(" ")
                };
                json!({
                    "@type": "Question",
                    "name": s.heading,
                    "acceptedAnswer": {"@type": "Answer", "text": answer},
                })
            })
            .collect();
        if !questions.is_empty() {
            graph.push(json!({"@type": "FAQPage", "mainEntity": questions}));
        }

        debug!(keyword = %draft.keyword, nodes = graph.len(), "markup generated");
        Ok(SchemaMarkup {
            keyword: draft.keyword.clone(),
            json_ld: json!({
                "@context": "https://schema.org",
                "@graph": graph,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Gap commentary
// ---------------------------------------------------------------------------

/// Optional prose explanation of an analysis. Never fails a keyword.
#[derive(Clone)]
pub struct GapCommentator {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GapCommentator {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            generator,
            retry,
            timeout,
        }
    }

    /// Commentary text, or `None` if generation failed.
    pub async fn comment(&self, analysis: &AnalysisResult) -> Option<String> {
        let request = GenerationRequest::new(
            GenerationTask::GapCommentary,
            json!({
                "keyword": analysis.keyword,
                "score": analysis.score,
                "gaps": analysis.gaps,
            }),
        );

        match self
            .retry
            .run("commentary", self.timeout, || self.generator.generate(&request))
            .await
        {
            Ok(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(keyword = %analysis.keyword, error = %e, "gap commentary skipped");
                None
            }
        }
    }
}
