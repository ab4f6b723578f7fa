//! Core domain types passed between pipeline stages.
//!
//! Every inter-stage payload is an explicit record. Loosely-typed model output
//! is validated into these types at the stage boundary and never travels
//! through the pipeline untyped.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Keyword planning
// ---------------------------------------------------------------------------

/// Search intent taxonomy. Every candidate carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Know,
    Compare,
    Buy,
    Navigate,
}

impl Intent {
    pub const ALL: [Intent; 4] = [Intent::Know, Intent::Compare, Intent::Buy, Intent::Navigate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Know => "KNOW",
            Self::Compare => "COMPARE",
            Self::Buy => "BUY",
            Self::Navigate => "NAVIGATE",
        }
    }

    /// Map a free-form intent label onto the fixed taxonomy.
    ///
    /// Unknown or missing labels fall back to [`Intent::Know`].
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Know;
        };
        let upper = raw.trim().to_uppercase();
        if upper.contains("NAV") {
            Self::Navigate
        } else if upper.contains("COMP") {
            Self::Compare
        } else if upper.contains("BUY") || upper.contains("PURCHASE") || upper.contains("TRANSACT") {
            Self::Buy
        } else {
            Self::Know
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowest allowed candidate priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest allowed candidate priority.
pub const MAX_PRIORITY: u8 = 5;

/// One planned keyword. Immutable once the plan is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCandidate {
    pub keyword: String,
    pub intent: Intent,
    pub category: String,
    /// 1..=5, higher is more important.
    pub priority: u8,
    pub reason: String,
}

/// Ordered keyword plan: priority descending, ties in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPlan {
    pub seed_keyword: String,
    candidates: Vec<KeywordCandidate>,
}

impl KeywordPlan {
    /// Build a plan from candidates in generation order.
    ///
    /// Priorities are clamped into range and the list is stably sorted, so
    /// equal priorities keep the order they were generated in.
    pub fn new(seed_keyword: impl Into<String>, mut candidates: Vec<KeywordCandidate>) -> Self {
        for c in &mut candidates {
            c.priority = c.priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        }
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            seed_keyword: seed_keyword.into(),
            candidates,
        }
    }

    pub fn candidates(&self) -> &[KeywordCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.candidates.iter().any(|c| c.keyword == keyword)
    }

    /// Keep only the first `limit` candidates.
    pub fn truncate(&mut self, limit: usize) {
        self.candidates.truncate(limit);
    }

    /// Candidates grouped by intent, each group in plan order.
    pub fn group_by_intent(&self) -> BTreeMap<&'static str, Vec<&KeywordCandidate>> {
        let mut groups: BTreeMap<&'static str, Vec<&KeywordCandidate>> = Intent::ALL
            .iter()
            .map(|i| (i.as_str(), Vec::new()))
            .collect();
        for c in &self.candidates {
            groups.entry(c.intent.as_str()).or_default().push(c);
        }
        groups
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// One ranked search result, in the provider's own order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    /// 1-based rank as reported by the provider.
    pub rank: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Raw markup fetched for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    /// Search rank, `0` for the target site.
    pub rank: u32,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub content: String,
}

/// A page that was skipped during research or extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGap {
    pub url: String,
    pub rank: u32,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// A single heading in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1..=6
    pub level: u8,
    pub text: String,
}

/// Nested heading outline derived from the flat heading list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingNode {
    pub level: u8,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HeadingNode>,
}

/// Normalized structural record of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStructure {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    #[serde(default)]
    pub body_excerpt: String,
    /// Word count of the full body text, not only the excerpt.
    #[serde(default)]
    pub word_count: usize,
}

impl SiteStructure {
    /// Text of every level-1 heading.
    pub fn h1_texts(&self) -> impl Iterator<Item = &str> {
        self.headings
            .iter()
            .filter(|h| h.level == 1)
            .map(|h| h.text.as_str())
    }

    /// Build a nested outline: each heading becomes a child of the closest
    /// preceding heading with a lower level.
    pub fn heading_tree(&self) -> Vec<HeadingNode> {
        fn attach(nodes: &mut Vec<HeadingNode>, node: HeadingNode) {
            match nodes.last_mut() {
                Some(last) if last.level < node.level => attach(&mut last.children, node),
                _ => nodes.push(node),
            }
        }

        let mut roots = Vec::new();
        for h in &self.headings {
            attach(
                &mut roots,
                HeadingNode {
                    level: h.level,
                    text: h.text.clone(),
                    children: Vec::new(),
                },
            );
        }
        roots
    }
}

// ---------------------------------------------------------------------------
// Analysis & strategy
// ---------------------------------------------------------------------------

/// A metric where the target trails the competitor median.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFinding {
    pub metric: String,
    pub target: f64,
    pub competitor_median: f64,
    /// Relative shortfall, `(median - target) / median`.
    pub shortfall: f64,
}

/// A competitor ordered by composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCompetitor {
    pub url: String,
    pub serp_rank: u32,
    pub score: f64,
}

/// Comparative analysis of the target against one keyword's competitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub keyword: String,
    pub metrics: BTreeMap<String, f64>,
    /// Human-readable findings, in discovery order.
    pub gaps: Vec<String>,
    /// Structured counterpart of `gaps`, same order.
    pub findings: Vec<GapFinding>,
    /// Composite score of the target page.
    pub score: f64,
    pub competitor_ranking: Vec<RankedCompetitor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

/// One actionable recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub rationale: String,
    pub priority: u8,
}

/// Prioritized recommendations for one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBrief {
    pub keyword: String,
    pub recommendations: Vec<Recommendation>,
}

// ---------------------------------------------------------------------------
// Generated artifacts
// ---------------------------------------------------------------------------

/// One section of a drafted article outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub level: u8,
    pub heading: String,
    #[serde(default)]
    pub points: Vec<String>,
}

/// Article draft for one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDraft {
    pub keyword: String,
    pub title: String,
    pub meta_description: String,
    pub outline: Vec<OutlineSection>,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Run-level strategy
// ---------------------------------------------------------------------------

/// A fix that recurs across several keywords of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecommendation {
    pub action: String,
    /// Gap metric the fix addresses.
    pub metric: String,
    /// Keywords whose analysis reported the gap, in plan order.
    pub keywords: Vec<String>,
}

/// Per-keyword direction within the run strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordStrategy {
    pub keyword: String,
    pub intent: Intent,
    pub priority: u8,
    pub recommended_content_type: String,
    pub recommended_actions: Vec<String>,
    pub score: f64,
}

/// Cross-keyword strategy for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStrategy {
    pub seed_keyword: String,
    pub overview: String,
    pub global_recommendations: Vec<SiteRecommendation>,
    pub keyword_strategies: Vec<KeywordStrategy>,
}

/// Structured-data markup (JSON-LD) for one keyword's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMarkup {
    pub keyword: String,
    pub json_ld: serde_json::Value,
}
