//! Prompt construction for each [`GenerationTask`].

use serde_json::Value;

use crate::{GenerationRequest, GenerationTask};

const PLAN_SCHEMA: &str = r#"{"items": [{"keyword": "string", "intent": "KNOW|COMPARE|BUY|NAVIGATE", "category": "string", "priority": 1, "reason": "string", "signals": {"search_volume": 0.0, "conversion_proximity": 0.0, "vertical_relevance": 0.0, "content_investment": 0.0}}]}"#;

const DRAFT_SCHEMA: &str = r#"{"title": "string", "meta_description": "string", "outline": [{"level": 2, "heading": "string", "points": ["string"]}], "body": "string"}"#;

/// System message for `task`.
pub fn system_prompt(task: GenerationTask) -> String {
    match task {
        GenerationTask::PlanKeywords => format!(
            "You are an SEO keyword strategist. Respond ONLY with JSON matching this schema:\n{PLAN_SCHEMA}\n\
             Signals are estimates in 0..1. Priority is 1 (low) to 5 (high)."
        ),
        GenerationTask::GapCommentary => "You are an SEO analyst. Explain in a short paragraph \
             what the target page should fix first. Plain text, no markdown."
            .to_string(),
        GenerationTask::DraftContent => format!(
            "You are an SEO content writer. Respond ONLY with JSON matching this schema:\n{DRAFT_SCHEMA}\n\
             The meta description must be under 160 characters."
        ),
    }
}

/// User message for `request`.
pub fn user_prompt(request: &GenerationRequest) -> String {
    let context = pretty(&request.context);
    match request.task {
        GenerationTask::PlanKeywords => format!(
            "Expand the seed keyword \"{}\" for the \"{}\" vertical into at most {} \
             keyword candidates covering every search intent.\n\nContext:\n{context}",
            request.context_str("seed"),
            request.context_str("vertical"),
            request
                .context
                .get("max_keywords")
                .and_then(Value::as_u64)
                .unwrap_or(10),
        ),
        GenerationTask::GapCommentary => format!(
            "Keyword: \"{}\"\nAnalysis:\n{context}",
            request.context_str("keyword")
        ),
        GenerationTask::DraftContent => format!(
            "Draft an article for \"{}\" that addresses these recommendations.\n\nContext:\n{context}",
            request.context_str("keyword")
        ),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
