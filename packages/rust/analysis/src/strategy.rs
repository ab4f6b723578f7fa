//! Turns gap findings into prioritized recommendations, per keyword and
//! across a whole run.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use seoscope_shared::{
    AnalysisResult, GapFinding, Intent, KeywordCandidate, KeywordStrategy, MAX_PRIORITY,
    MIN_PRIORITY, Recommendation, RunStrategy, SiteRecommendation, StrategyBrief,
};

use crate::metrics::GAP_METRICS;

/// Shortfall at or above which a recommendation is bumped one priority level.
const SEVERE_SHORTFALL: f64 = 0.5;

/// Keywords that must share a gap before it becomes a site-wide fix.
const SHARED_GAP_MIN_KEYWORDS: usize = 2;

/// Actions carried into each keyword's entry of the run strategy.
const ACTIONS_PER_KEYWORD: usize = 3;

/// One finished keyword's inputs to [`StrategySynthesizer::summarize`].
#[derive(Debug, Clone, Copy)]
pub struct KeywordOutcome<'a> {
    pub candidate: &'a KeywordCandidate,
    pub analysis: &'a AnalysisResult,
    pub brief: &'a StrategyBrief,
}

/// Builds a [`StrategyBrief`] from an [`AnalysisResult`].
#[derive(Debug, Clone, Default)]
pub struct StrategySynthesizer;

impl StrategySynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// One recommendation per gap, ordered by priority descending. Equal
    /// priorities keep the order the gaps were found in. No gaps yields an
    /// empty brief.
    #[instrument(skip_all, fields(keyword = %analysis.keyword, gaps = analysis.gaps.len()))]
    pub fn synthesize(&self, analysis: &AnalysisResult) -> StrategyBrief {
        let keyword = analysis.keyword.as_str();

        let mut recommendations: Vec<Recommendation> = analysis
            .gaps
            .iter()
            .enumerate()
            .map(|(i, gap)| match analysis.findings.get(i) {
                Some(finding) => recommend(keyword, finding, gap),
                None => Recommendation {
                    action: format!("Close the gap: {gap}"),
                    rationale: gap.clone(),
                    priority: 3,
                },
            })
            .collect();

        // sort_by_key is stable
        recommendations.sort_by_key(|r| std::cmp::Reverse(r.priority));

        debug!(recommendations = recommendations.len(), "strategy synthesized");
        StrategyBrief {
            keyword: keyword.to_string(),
            recommendations,
        }
    }

    /// Fold finished keywords, given in plan order, into a [`RunStrategy`].
    ///
    /// Gaps reported for at least two keywords become site-wide
    /// recommendations, most widespread first and in gap discovery order
    /// on ties. Each keyword gets a content type from its intent and the top
    /// actions of its brief.
    #[instrument(skip_all, fields(seed = %seed_keyword, keywords = outcomes.len()))]
    pub fn summarize(&self, seed_keyword: &str, outcomes: &[KeywordOutcome<'_>]) -> RunStrategy {
        let mut by_metric: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for outcome in outcomes {
            for finding in &outcome.analysis.findings {
                let keywords = by_metric.entry(finding.metric.as_str()).or_default();
                if !keywords.contains(&outcome.candidate.keyword) {
                    keywords.push(outcome.candidate.keyword.clone());
                }
            }
        }

        let mut global_recommendations: Vec<SiteRecommendation> = by_metric
            .into_iter()
            .filter(|(_, keywords)| keywords.len() >= SHARED_GAP_MIN_KEYWORDS)
            .map(|(metric, keywords)| SiteRecommendation {
                action: site_action(metric),
                metric: metric.to_string(),
                keywords,
            })
            .collect();
        global_recommendations.sort_by_key(|r| metric_order(&r.metric));
        global_recommendations.sort_by_key(|r| std::cmp::Reverse(r.keywords.len()));

        let keyword_strategies: Vec<KeywordStrategy> = outcomes
            .iter()
            .map(|o| KeywordStrategy {
                keyword: o.candidate.keyword.clone(),
                intent: o.candidate.intent,
                priority: o.candidate.priority,
                recommended_content_type: content_type(o.candidate.intent).to_string(),
                recommended_actions: o
                    .brief
                    .recommendations
                    .iter()
                    .take(ACTIONS_PER_KEYWORD)
                    .map(|r| r.action.clone())
                    .collect(),
                score: o.analysis.score,
            })
            .collect();

        let overview = overview(seed_keyword, outcomes, global_recommendations.len());
        debug!(
            shared_gaps = global_recommendations.len(),
            "run strategy summarized"
        );
        RunStrategy {
            seed_keyword: seed_keyword.to_string(),
            overview,
            global_recommendations,
            keyword_strategies,
        }
    }
}

/// Page type best suited to a search intent.
pub fn content_type(intent: Intent) -> &'static str {
    match intent {
        Intent::Know => "explainer article",
        Intent::Compare => "comparison page",
        Intent::Buy => "product or pricing page",
        Intent::Navigate => "category or landing page",
    }
}

fn overview(seed_keyword: &str, outcomes: &[KeywordOutcome<'_>], shared: usize) -> String {
    if outcomes.is_empty() {
        return format!(
            "No keyword for \"{seed_keyword}\" completed, so there is no strategy to report."
        );
    }
    let mean = outcomes.iter().map(|o| o.analysis.score).sum::<f64>() / outcomes.len() as f64;
    let weakest = outcomes
        .iter()
        .min_by(|a, b| a.analysis.score.total_cmp(&b.analysis.score))
        .map(|o| o.candidate.keyword.as_str())
        .unwrap_or_default();
    format!(
        "{} keyword(s) for \"{seed_keyword}\" completed with a mean page score of {mean:.1}. \
         {shared} gap(s) recur across keywords. Weakest keyword: \"{weakest}\".",
        outcomes.len()
    )
}

fn metric_order(metric: &str) -> usize {
    GAP_METRICS
        .iter()
        .position(|m| m.name == metric)
        .unwrap_or(GAP_METRICS.len())
}

fn site_action(metric: &str) -> String {
    let action = match metric {
        "keyword_in_title" => "Put each page's target keyword in its title",
        "keyword_in_h1" => "Put each page's target keyword in its H1 heading",
        "title_length" => "Bring page titles up to competitor length",
        "meta_description_length" => "Write full-length meta descriptions across the site",
        "h1_count" => "Give every page one descriptive H1 heading",
        "h2_count" => "Split pages into more H2 sections",
        "h3_count" => "Add H3 subsections under long sections",
        "word_count" => "Expand thin pages toward competitor depth",
        "heading_keyword_coverage" => "Use target keywords in section headings",
        "keyword_density" => "Mention target keywords more often in body copy",
        "breadcrumb_depth" => "Add breadcrumb navigation site-wide",
        other => return format!("Improve {other} across the site"),
    };
    action.to_string()
}

fn recommend(keyword: &str, finding: &GapFinding, gap: &str) -> Recommendation {
    let median = finding.competitor_median;
    let (action, base) = match finding.metric.as_str() {
        "keyword_in_title" => (format!("Include \"{keyword}\" in the page title"), 5),
        "keyword_in_h1" => (format!("Use \"{keyword}\" in the main H1 heading"), 5),
        "word_count" => (
            format!("Expand the body copy to roughly {median:.0} words"),
            4,
        ),
        "h2_count" => (
            format!("Add H2 sections to cover about {median:.0} subtopics"),
            4,
        ),
        "h1_count" => ("Add a single descriptive H1 heading".to_string(), 3),
        "heading_keyword_coverage" => (
            format!("Work \"{keyword}\" and close variants into section headings"),
            3,
        ),
        "title_length" => (
            format!("Lengthen the title toward {median:.0} characters"),
            3,
        ),
        "meta_description_length" => (
            format!("Write a meta description of about {median:.0} characters"),
            3,
        ),
        "h3_count" => (
            "Break long sections into H3 subsections".to_string(),
            2,
        ),
        "keyword_density" => (
            format!("Mention \"{keyword}\" more often in the body copy"),
            2,
        ),
        "breadcrumb_depth" => (
            "Add breadcrumb navigation that reflects the site hierarchy".to_string(),
            1,
        ),
        other => (format!("Improve {other}"), 2),
    };

    let bump = u8::from(finding.shortfall >= SEVERE_SHORTFALL);
    Recommendation {
        action,
        rationale: gap.to_string(),
        priority: (base + bump).clamp(MIN_PRIORITY, MAX_PRIORITY),
    }
}
