//! Keyword planning: one seed keyword in, a ranked [`KeywordPlan`] out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use seoscope_llm::{GenerationRequest, GenerationTask, TextGenerator, extract_json};
use seoscope_shared::{
    AppConfig, Intent, KeywordCandidate, KeywordPlan, MAX_PRIORITY, MIN_PRIORITY, PriorityWeights,
    Result, RetryPolicy, SeoscopeError,
};

/// Priority used when the generator supplies neither a priority nor signals.
const DEFAULT_PRIORITY: u8 = 3;

// ---------------------------------------------------------------------------
// Priority policy
// ---------------------------------------------------------------------------

/// The four planning factors, each estimated in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrioritySignals {
    pub search_volume: f64,
    pub conversion_proximity: f64,
    pub vertical_relevance: f64,
    pub content_investment: f64,
}

impl PrioritySignals {
    fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |name: &str| obj.get(name).and_then(number).unwrap_or(0.0).clamp(0.0, 1.0);
        Some(Self {
            search_volume: field("search_volume"),
            conversion_proximity: field("conversion_proximity"),
            vertical_relevance: field("vertical_relevance"),
            content_investment: field("content_investment"),
        })
    }
}

/// Combines planning factors into a 1..=5 priority.
pub trait PriorityPolicy: Send + Sync {
    /// `stated` is the generator's own priority, if any.
    fn priority(&self, stated: Option<f64>, signals: Option<&PrioritySignals>) -> u8;
}

/// Weighted sum of the four signals, mapped onto 1..=5.
///
/// Without signals, the generator's stated priority is clamped into range,
/// and a missing priority becomes 3.
#[derive(Debug, Clone, Default)]
pub struct WeightedPriority {
    weights: PriorityWeights,
}

impl WeightedPriority {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }
}

impl PriorityPolicy for WeightedPriority {
    fn priority(&self, stated: Option<f64>, signals: Option<&PrioritySignals>) -> u8 {
        let w = &self.weights;
        let total = w.search_volume.max(0.0)
            + w.conversion_proximity.max(0.0)
            + w.vertical_relevance.max(0.0)
            + w.content_investment.max(0.0);

        if let Some(s) = signals.filter(|_| total > 0.0) {
            let score = (w.search_volume.max(0.0) * s.search_volume
                + w.conversion_proximity.max(0.0) * s.conversion_proximity
                + w.vertical_relevance.max(0.0) * s.vertical_relevance
                + w.content_investment.max(0.0) * s.content_investment)
                / total;
            return 1 + (4.0 * score).round() as u8;
        }

        match stated {
            Some(p) if p.is_finite() => {
                (p.round().clamp(f64::from(MIN_PRIORITY), f64::from(MAX_PRIORITY))) as u8
            }
            _ => DEFAULT_PRIORITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Expands a seed keyword through a [`TextGenerator`].
#[derive(Clone)]
pub struct KeywordPlanner {
    generator: Arc<dyn TextGenerator>,
    policy: Arc<dyn PriorityPolicy>,
    retry: RetryPolicy,
    timeout: Duration,
    max_keywords: usize,
}

impl KeywordPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self {
            generator,
            policy: Arc::new(WeightedPriority::default()),
            retry,
            timeout: Duration::from_secs(60),
            max_keywords: 10,
        }
    }

    /// Planner with the retry, timeout, priority weights, and keyword limit
    /// from `config`.
    pub fn from_config(config: &AppConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(generator, RetryPolicy::from(&config.retry))
            .with_policy(Arc::new(WeightedPriority::new(config.priority.clone())))
            .with_timeout(Duration::from_secs(config.llm.timeout_secs))
            .with_max_keywords(config.defaults.max_keywords)
    }

    pub fn with_policy(mut self, policy: Arc<dyn PriorityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_keywords(mut self, max_keywords: usize) -> Self {
        self.max_keywords = max_keywords.max(1);
        self
    }

    /// Build the plan for `seed`.
    ///
    /// Every failure here is a [`SeoscopeError::Planning`]: an unusable
    /// seed, a generator that keeps failing, malformed output, or output
    /// with no usable candidates.
    #[instrument(skip(self), fields(generator = self.generator.name()))]
    pub async fn plan(&self, seed: &str, vertical: &str) -> Result<KeywordPlan> {
        let seed = seed.split_whitespace().collect::<Vec<_>>().join(" ");
        if !seed.chars().any(char::is_alphanumeric) {
            return Err(SeoscopeError::Planning(
                "seed keyword is empty or has no readable characters".to_string(),
            ));
        }

        let request = GenerationRequest::new(
            GenerationTask::PlanKeywords,
            json!({
                "seed": seed,
                "vertical": vertical,
                "max_keywords": self.max_keywords,
            }),
        );

        let raw = self
            .retry
            .run("plan", self.timeout, || self.generator.generate(&request))
            .await
            .map_err(|e| SeoscopeError::Planning(format!("keyword generation failed: {e}")))?;

        let value = extract_json(&raw).ok_or_else(|| {
            SeoscopeError::Planning("keyword generator returned malformed output".to_string())
        })?;

        let candidates = self.parse_candidates(&value);
        if candidates.is_empty() {
            return Err(SeoscopeError::Planning(format!(
                "no keyword candidates produced for '{seed}'"
            )));
        }

        let mut plan = KeywordPlan::new(seed.clone(), candidates);
        plan.truncate(self.max_keywords);

        info!(seed = %seed, candidates = plan.len(), "keyword plan ready");
        Ok(plan)
    }

    /// Validate loosely-typed items into candidates, in generation order.
    /// Items without a keyword are dropped, as are case-insensitive repeats.
    fn parse_candidates(&self, value: &Value) -> Vec<KeywordCandidate> {
        let items = match value {
            Value::Array(items) => items.as_slice(),
            other => match other.get("items").and_then(Value::as_array) {
                Some(items) => items.as_slice(),
                None => &[],
            },
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(items.len());

        for item in items {
            let Some(keyword) = item
                .get("keyword")
                .and_then(Value::as_str)
                .map(|k| k.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|k| !k.is_empty())
            else {
                debug!(?item, "dropping item without keyword");
                continue;
            };

            if !seen.insert(keyword.to_lowercase()) {
                continue;
            }

            let signals = item.get("signals").and_then(PrioritySignals::from_json);
            let stated = item.get("priority").and_then(number);

            candidates.push(KeywordCandidate {
                intent: Intent::normalize(item.get("intent").and_then(Value::as_str)),
                category: item
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or("general")
                    .to_string(),
                priority: self.policy.priority(stated, signals.as_ref()),
                reason: item
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
                keyword,
            });
        }

        if candidates.len() < items.len() {
            warn!(
                kept = candidates.len(),
                received = items.len(),
                "some planning items were invalid or duplicated"
            );
        }
        candidates
    }
}

/// A JSON number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
