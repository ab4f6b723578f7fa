//! Generative-text services.
//!
//! Every model-backed step goes through [`TextGenerator`]. Two
//! implementations ship with the crate:
//! - [`ChatCompletionsClient`]: any OpenAI-compatible `/chat/completions` endpoint
//! - [`TemplateGenerator`]: deterministic offline output, used when no API key is configured
//!
//! Generators return raw text. Callers validate it into typed records, using
//! [`extract_json`] for structured tasks.

pub mod chat;
pub mod json;
pub mod prompts;
pub mod template;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use seoscope_shared::Result;

pub use chat::ChatCompletionsClient;
pub use json::extract_json;
pub use template::TemplateGenerator;

/// What a generation call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    /// Expand a seed keyword into candidates. JSON output.
    PlanKeywords,
    /// Natural-language commentary on analysis gaps. Plain text output.
    GapCommentary,
    /// Article outline and body. JSON output.
    DraftContent,
}

impl GenerationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanKeywords => "plan_keywords",
            Self::GapCommentary => "gap_commentary",
            Self::DraftContent => "draft_content",
        }
    }

    /// Whether the task expects a JSON object back.
    pub fn wants_json(&self) -> bool {
        !matches!(self, Self::GapCommentary)
    }
}

/// Input to one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    /// Task-specific context, e.g. `{"seed": ..., "vertical": ...}`.
    pub context: Value,
}

impl GenerationRequest {
    pub fn new(task: GenerationTask, context: Value) -> Self {
        Self { task, context }
    }

    /// String field from the context, empty when absent.
    pub fn context_str(&self, key: &str) -> &str {
        self.context.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

/// An unreliable, non-deterministic text source.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Human-readable generator name for tracing.
    fn name(&self) -> &str;
}
