//! Per-page SEO metrics.
//!
//! Every metric is a plain `f64` so the analyzer can take medians and deltas
//! uniformly. Booleans are encoded as `0.0` / `1.0`.

use serde::{Deserialize, Serialize};

use seoscope_shared::SiteStructure;

/// Descriptor for a metric that takes part in gap detection.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub label: &'static str,
    /// Ratio metrics are printed with two decimals, counts with none.
    pub ratio: bool,
}

/// Metrics compared against the competitor median, in gap discovery order.
pub const GAP_METRICS: &[MetricSpec] = &[
    MetricSpec { name: "keyword_in_title", label: "keyword in title", ratio: true },
    MetricSpec { name: "keyword_in_h1", label: "keyword in H1", ratio: true },
    MetricSpec { name: "title_length", label: "title length", ratio: false },
    MetricSpec { name: "meta_description_length", label: "meta description length", ratio: false },
    MetricSpec { name: "h1_count", label: "H1 headings", ratio: false },
    MetricSpec { name: "h2_count", label: "H2 headings", ratio: false },
    MetricSpec { name: "h3_count", label: "H3 headings", ratio: false },
    MetricSpec { name: "word_count", label: "word count", ratio: false },
    MetricSpec { name: "heading_keyword_coverage", label: "heading keyword coverage", ratio: true },
    MetricSpec { name: "keyword_density", label: "keyword density", ratio: true },
    MetricSpec { name: "breadcrumb_depth", label: "breadcrumb depth", ratio: false },
];

/// Scalar metrics for one page against one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    pub title_length: f64,
    pub meta_description_length: f64,
    /// Counts for H1..=H6.
    pub heading_counts: [f64; 6],
    pub word_count: f64,
    /// Keyword occurrences in the body excerpt.
    pub keyword_occurrences: f64,
    /// Keyword occurrences per word of the body excerpt.
    pub keyword_density: f64,
    /// Mean share of keyword tokens present in each heading.
    pub heading_keyword_coverage: f64,
    pub keyword_in_title: f64,
    pub keyword_in_h1: f64,
    pub breadcrumb_depth: f64,
}

impl PageMetrics {
    pub fn compute(structure: &SiteStructure, keyword: &str) -> Self {
        let needle = keyword.trim().to_lowercase();
        let tokens = tokenize(&needle);

        let mut heading_counts = [0.0; 6];
        for h in &structure.headings {
            if (1..=6).contains(&h.level) {
                heading_counts[usize::from(h.level - 1)] += 1.0;
            }
        }

        let body = structure.body_excerpt.to_lowercase();
        let keyword_occurrences = if needle.is_empty() {
            0.0
        } else {
            body.matches(needle.as_str()).count() as f64
        };
        let word_count = structure.word_count as f64;
        // The excerpt may be a prefix of the body; density must not mix it
        // with the full-body word count.
        let excerpt_words = structure.body_excerpt.split_whitespace().count() as f64;

        let heading_keyword_coverage = if structure.headings.is_empty() || tokens.is_empty() {
            0.0
        } else {
            let total: f64 = structure
                .headings
                .iter()
                .map(|h| token_coverage(&tokens, &h.text))
                .sum();
            total / structure.headings.len() as f64
        };

        let contains = |text: &str| !needle.is_empty() && text.to_lowercase().contains(&needle);

        Self {
            title_length: structure.title.chars().count() as f64,
            meta_description_length: structure.meta_description.chars().count() as f64,
            heading_counts,
            word_count,
            keyword_occurrences,
            keyword_density: keyword_occurrences / excerpt_words.max(1.0),
            heading_keyword_coverage,
            keyword_in_title: flag(contains(&structure.title)),
            keyword_in_h1: flag(structure.h1_texts().any(contains)),
            breadcrumb_depth: structure.breadcrumbs.len() as f64,
        }
    }

    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "title_length" => self.title_length,
            "meta_description_length" => self.meta_description_length,
            "h1_count" => self.heading_counts[0],
            "h2_count" => self.heading_counts[1],
            "h3_count" => self.heading_counts[2],
            "h4_count" => self.heading_counts[3],
            "h5_count" => self.heading_counts[4],
            "h6_count" => self.heading_counts[5],
            "word_count" => self.word_count,
            "keyword_occurrences" => self.keyword_occurrences,
            "keyword_density" => self.keyword_density,
            "heading_keyword_coverage" => self.heading_keyword_coverage,
            "keyword_in_title" => self.keyword_in_title,
            "keyword_in_h1" => self.keyword_in_h1,
            "breadcrumb_depth" => self.breadcrumb_depth,
            "composite_score" => self.composite_score(),
            _ => return None,
        };
        Some(value)
    }

    /// All metric names, in a stable order.
    pub fn names() -> &'static [&'static str] {
        &[
            "title_length",
            "meta_description_length",
            "h1_count",
            "h2_count",
            "h3_count",
            "h4_count",
            "h5_count",
            "h6_count",
            "word_count",
            "keyword_occurrences",
            "keyword_density",
            "heading_keyword_coverage",
            "keyword_in_title",
            "keyword_in_h1",
            "breadcrumb_depth",
            "composite_score",
        ]
    }

    /// Weighted 0..=100 score across title, description, structure, depth,
    /// and keyword targeting.
    pub fn composite_score(&self) -> f64 {
        let title = band_score(self.title_length, 30.0, 65.0);
        let meta = band_score(self.meta_description_length, 70.0, 160.0);

        let h1 = match self.heading_counts[0] {
            n if n == 1.0 => 1.0,
            n if n > 1.0 => 0.5,
            _ => 0.0,
        };
        let structure = 0.3 * h1 + 0.7 * (self.heading_counts[1].min(6.0) / 6.0);

        let depth = (self.word_count / 1500.0).min(1.0);

        let density = (self.keyword_density / 0.01).min(1.0);
        let keyword = 0.25 * self.keyword_in_title
            + 0.25 * self.keyword_in_h1
            + 0.3 * self.heading_keyword_coverage
            + 0.2 * density;

        let score =
            100.0 * (0.15 * title + 0.10 * meta + 0.25 * structure + 0.25 * depth + 0.25 * keyword);
        round2(score)
    }
}

/// 1.0 inside `[low, high]`, scaled down linearly outside it.
fn band_score(value: f64, low: f64, high: f64) -> f64 {
    if value <= 0.0 {
        0.0
    } else if value < low {
        value / low
    } else if value > high {
        high / value
    } else {
        1.0
    }
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Lowercase alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn token_coverage(tokens: &[String], heading: &str) -> f64 {
    let heading = heading.to_lowercase();
    let present = tokens.iter().filter(|t| heading.contains(t.as_str())).count();
    present as f64 / tokens.len() as f64
}
