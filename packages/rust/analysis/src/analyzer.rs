//! Comparative analysis of a target page against ranked competitors.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use seoscope_shared::{
    AnalysisResult, GapFinding, RankedCompetitor, Result, SeoscopeError, SiteStructure,
};

use crate::metrics::{GAP_METRICS, MetricSpec, PageMetrics, round2};

/// A competitor page with its search rank.
#[derive(Debug, Clone)]
pub struct Competitor {
    pub serp_rank: u32,
    pub structure: SiteStructure,
}

/// Compares a target page with its competitors for one keyword.
#[derive(Debug, Clone)]
pub struct ComparativeAnalyzer {
    /// Relative shortfall below the competitor median that counts as a gap.
    gap_threshold: f64,
}

impl Default for ComparativeAnalyzer {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl ComparativeAnalyzer {
    pub fn new(gap_threshold: f64) -> Self {
        Self {
            gap_threshold: gap_threshold.max(0.0),
        }
    }

    /// Produce the analysis for `keyword`.
    ///
    /// The metrics map holds `target.<metric>`, `competitor_median.<metric>`
    /// and `delta.<metric>` for every metric, plus `competitor_count`.
    /// Fails with [`SeoscopeError::InsufficientData`] when there are no
    /// competitors.
    #[instrument(skip_all, fields(keyword = %keyword, competitors = competitors.len()))]
    pub fn analyze(
        &self,
        keyword: &str,
        target: &SiteStructure,
        competitors: &[Competitor],
    ) -> Result<AnalysisResult> {
        if competitors.is_empty() {
            return Err(SeoscopeError::InsufficientData(format!(
                "no competitor pages to compare for '{keyword}'"
            )));
        }

        let target_metrics = PageMetrics::compute(target, keyword);
        let competitor_metrics: Vec<PageMetrics> = competitors
            .iter()
            .map(|c| PageMetrics::compute(&c.structure, keyword))
            .collect();

        let mut metrics = BTreeMap::new();
        metrics.insert("competitor_count".to_string(), competitors.len() as f64);
        for name in PageMetrics::names() {
            let Some(target_value) = target_metrics.get(name) else {
                continue;
            };
            let median = median(competitor_metrics.iter().filter_map(|m| m.get(name)));
            metrics.insert(format!("target.{name}"), round2(target_value));
            metrics.insert(format!("competitor_median.{name}"), round2(median));
            metrics.insert(format!("delta.{name}"), round2(target_value - median));
        }

        let mut gaps = Vec::new();
        let mut findings = Vec::new();
        for spec in GAP_METRICS {
            let Some(t) = target_metrics.get(spec.name) else {
                continue;
            };
            let m = median(competitor_metrics.iter().filter_map(|c| c.get(spec.name)));
            if let Some(finding) = self.gap(spec, t, m) {
                gaps.push(describe_gap(spec, &finding));
                findings.push(finding);
            }
        }

        let mut competitor_ranking: Vec<RankedCompetitor> = competitors
            .iter()
            .zip(&competitor_metrics)
            .map(|(c, m)| RankedCompetitor {
                url: c.structure.url.clone(),
                serp_rank: c.serp_rank,
                score: m.composite_score(),
            })
            .collect();
        // Stable: equal scores keep search order
        competitor_ranking.sort_by(|a, b| b.score.total_cmp(&a.score));

        let score = target_metrics.composite_score();
        debug!(score, gaps = gaps.len(), "analysis complete");

        Ok(AnalysisResult {
            keyword: keyword.to_string(),
            metrics,
            gaps,
            findings,
            score,
            competitor_ranking,
            commentary: None,
        })
    }

    fn gap(&self, spec: &MetricSpec, target: f64, median: f64) -> Option<GapFinding> {
        if median <= 0.0 {
            return None;
        }
        let shortfall = (median - target) / median;
        (shortfall > self.gap_threshold).then(|| GapFinding {
            metric: spec.name.to_string(),
            target: round2(target),
            competitor_median: round2(median),
            shortfall: round2(shortfall),
        })
    }
}

fn describe_gap(spec: &MetricSpec, finding: &GapFinding) -> String {
    let pct = (finding.shortfall * 100.0).round();
    if spec.ratio {
        format!(
            "{}: target {:.2} vs competitor median {:.2} ({pct}% below)",
            spec.label, finding.target, finding.competitor_median
        )
    } else {
        format!(
            "{}: target {:.0} vs competitor median {:.0} ({pct}% below)",
            spec.label, finding.target, finding.competitor_median
        )
    }
}

/// Median of the values; `0.0` for an empty input.
pub fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoscope_shared::Heading;

    fn structure(url: &str, title: &str, h2: usize, words: usize) -> SiteStructure {
        let mut headings = vec![Heading { level: 1, text: title.to_string() }];
        headings.extend((0..h2).map(|i| Heading { level: 2, text: format!("Industrial sensors part {i}") }));
        SiteStructure {
            url: url.into(),
            title: title.into(),
            meta_description: "d".repeat(120),
            headings,
            breadcrumbs: vec!["Home".into()],
            body_excerpt: "industrial sensors ".repeat(words / 50),
            word_count: words,
        }
    }

    fn competitor(rank: u32, s: SiteStructure) -> Competitor {
        Competitor { serp_rank: rank, structure: s }
    }

    #[test]
    fn no_competitors_is_insufficient_data() {
        let target = structure("https://mine.example.com/", "Industrial sensors", 2, 500);
        let err = ComparativeAnalyzer::default()
            .analyze("industrial sensors", &target, &[])
            .unwrap_err();
        assert!(matches!(err, SeoscopeError::InsufficientData(_)));
    }

    #[test]
    fn finds_gaps_below_median() {
        let target = structure("https://mine.example.com/", "Industrial sensors overview", 1, 300);
        let competitors = vec![
            competitor(1, structure("https://a.example.com/", "Industrial sensors guide", 6, 1800)),
            competitor(2, structure("https://b.example.com/", "Industrial sensors explained", 5, 1200)),
            competitor(3, structure("https://c.example.com/", "Industrial sensors buying", 4, 900)),
        ];

        let result = ComparativeAnalyzer::new(0.2)
            .analyze("industrial sensors", &target, &competitors)
            .unwrap();

        let metrics: Vec<_> = result.findings.iter().map(|f| f.metric.as_str()).collect();
        assert_eq!(metrics, ["h2_count", "word_count"]);
        assert_eq!(result.gaps.len(), result.findings.len());
        assert!(result.gaps[1].starts_with("word count: target 300 vs competitor median 1200"));

        let word_gap = &result.findings[1];
        assert_eq!(word_gap.competitor_median, 1200.0);
        assert_eq!(word_gap.shortfall, 0.75);

        assert_eq!(result.metrics["competitor_count"], 3.0);
        assert_eq!(result.metrics["target.word_count"], 300.0);
        assert_eq!(result.metrics["competitor_median.word_count"], 1200.0);
        assert_eq!(result.metrics["delta.word_count"], -900.0);
    }

    #[test]
    fn no_gaps_when_target_leads() {
        let target = structure("https://mine.example.com/", "Industrial sensors complete guide", 6, 2000);
        let competitors = vec![competitor(
            1,
            structure("https://a.example.com/", "Industrial sensors", 2, 400),
        )];
        let result = ComparativeAnalyzer::default()
            .analyze("industrial sensors", &target, &competitors)
            .unwrap();
        assert!(result.gaps.is_empty());
        assert!(result.findings.is_empty());
    }

    #[test]
    fn ranking_is_by_score_then_search_order() {
        let target = structure("https://mine.example.com/", "Industrial sensors", 2, 500);
        let weak = structure("https://weak.example.com/", "Industrial sensors", 0, 100);
        let strong = structure("https://strong.example.com/", "Industrial sensors", 6, 1500);
        let competitors = vec![
            competitor(1, weak.clone()),
            competitor(2, strong),
            competitor(3, SiteStructure { url: "https://weak2.example.com/".into(), ..weak }),
        ];

        let result = ComparativeAnalyzer::default()
            .analyze("industrial sensors", &target, &competitors)
            .unwrap();
        let order: Vec<_> = result.competitor_ranking.iter().map(|c| c.serp_rank).collect();
        assert_eq!(order, [2, 1, 3]);
    }

    #[test]
    fn analysis_is_deterministic() {
        let target = structure("https://mine.example.com/", "Sensors", 1, 300);
        let competitors = vec![
            competitor(1, structure("https://a.example.com/", "Industrial sensors", 4, 900)),
            competitor(2, structure("https://b.example.com/", "Industrial sensors", 3, 1100)),
        ];
        let analyzer = ComparativeAnalyzer::default();
        let a = analyzer.analyze("industrial sensors", &target, &competitors).unwrap();
        let b = analyzer.analyze("industrial sensors", &target, &competitors).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median([3.0, 1.0, 2.0].into_iter()), 2.0);
        assert_eq!(median([4.0, 1.0, 3.0, 2.0].into_iter()), 2.5);
        assert_eq!(median(std::iter::empty()), 0.0);
    }
}
