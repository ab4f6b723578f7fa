//! Deterministic offline generator.
//!
//! Produces well-formed output for every task without a model, so the whole
//! pipeline runs without network access to a provider. Identical requests
//! always yield identical text.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use seoscope_shared::Result;

use crate::{GenerationRequest, GenerationTask, TextGenerator};

/// Keyword expansions: (pattern, intent, category, priority).
/// `{}` is replaced by the seed.
const PLAN_TEMPLATE: &[(&str, &str, &str, u8)] = &[
    ("{}", "KNOW", "core", 5),
    ("what is {}", "KNOW", "basics", 5),
    ("{} types", "KNOW", "basics", 4),
    ("{} comparison", "COMPARE", "comparison", 4),
    ("{} case studies", "KNOW", "proof", 4),
    ("{} design", "KNOW", "technical", 3),
    ("{} specifications", "KNOW", "technical", 3),
    ("{} price", "BUY", "commercial", 3),
    ("{} quote", "BUY", "commercial", 3),
    ("{} manufacturers", "NAVIGATE", "vendors", 2),
];

/// [`TextGenerator`] that fills fixed templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(task = request.task.as_str(), "template generation");
        let text = match request.task {
            GenerationTask::PlanKeywords => plan(request).to_string(),
            GenerationTask::GapCommentary => commentary(request),
            GenerationTask::DraftContent => draft(request).to_string(),
        };
        Ok(text)
    }

    fn name(&self) -> &str {
        "template"
    }
}

fn plan(request: &GenerationRequest) -> Value {
    let seed = request.context_str("seed").trim();
    let items: Vec<Value> = PLAN_TEMPLATE
        .iter()
        .map(|(pattern, intent, category, priority)| {
            json!({
                "keyword": pattern.replace("{}", seed),
                "intent": intent,
                "category": category,
                "priority": priority,
                "reason": format!("{category} query around \"{seed}\""),
            })
        })
        .collect();
    json!({ "items": items })
}

fn commentary(request: &GenerationRequest) -> String {
    let keyword = request.context_str("keyword");
    let gaps: Vec<&str> = request
        .context
        .get("gaps")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    match gaps.as_slice() {
        [] => format!("The target page for \"{keyword}\" matches or beats the competitor median on every tracked metric."),
        [first, rest @ ..] => format!(
            "The target page for \"{keyword}\" trails competitors on {} metric(s). Start with {first}{}.",
            gaps.len(),
            if rest.is_empty() {
                String::new()
            } else {
                format!(", then address: {}", rest.join("; "))
            }
        ),
    }
}

fn draft(request: &GenerationRequest) -> Value {
    let keyword = request.context_str("keyword").trim();
    let display = title_case(keyword);

    let actions: Vec<&str> = request
        .context
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|recs| {
            recs.iter()
                .filter_map(|r| r.get("action").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let mut outline = vec![
        json!({"level": 2, "heading": format!("What is {keyword}?"), "points": [format!("Definition and scope of {keyword}")]}),
        json!({"level": 2, "heading": format!("Types of {keyword}"), "points": ["Main categories", "Typical applications"]}),
        json!({"level": 2, "heading": format!("How to choose {keyword}"), "points": ["Selection criteria", "Common mistakes"]}),
    ];
    if !actions.is_empty() {
        outline.push(json!({"level": 2, "heading": "Key considerations", "points": actions}));
    }
    outline.push(json!({"level": 2, "heading": "Summary", "points": [format!("Next steps for {keyword}")]}));

    let body = outline
        .iter()
        .filter_map(|s| s.get("heading").and_then(Value::as_str))
        .map(|h| format!("## {h}\n\nThis section covers {}.", h.to_lowercase().trim_end_matches('?')))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut meta = format!(
        "Learn what {keyword} are, how they compare, and how to choose the right option for your project."
    );
    if meta.chars().count() > 155 {
        meta = meta.chars().take(155).collect();
    }

    json!({
        "title": format!("{display}: A Complete Guide"),
        "meta_description": meta,
        "outline": outline,
        "body": body,
    })
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
