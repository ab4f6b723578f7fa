//! Metric computation, comparative analysis, and strategy synthesis.
//!
//! - [`PageMetrics`]: scalar metrics for one page
//! - [`ComparativeAnalyzer`]: target vs. competitor medians, gap findings, competitor ranking
//! - [`StrategySynthesizer`]: prioritized recommendations per keyword and a run-wide strategy

pub mod analyzer;
pub mod metrics;
pub mod strategy;

pub use analyzer::{ComparativeAnalyzer, Competitor, median};
pub use metrics::{GAP_METRICS, MetricSpec, PageMetrics};
pub use strategy::{KeywordOutcome, StrategySynthesizer, content_type};
