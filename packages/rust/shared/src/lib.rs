//! Shared types, error model, configuration, and retry policy for seoscope.
//!
//! This crate is the foundation depended on by all other seoscope crates.
//! It provides:
//! - [`SeoscopeError`] — the unified error type
//! - Domain types passed between pipeline stages ([`KeywordPlan`], [`SiteStructure`], ...)
//! - Configuration ([`AppConfig`], config loading)
//! - [`RetryPolicy`] for network-bound calls

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisConfig, AppConfig, DefaultsConfig, FetchConfig, LlmConfig, PriorityWeights,
    RetryConfig, SearchConfig, config_dir, config_file_path, env_secret, init_config, load_config,
    load_config_from, search_credentials,
};
pub use error::{Result, SeoscopeError};
pub use retry::RetryPolicy;
pub use types::{
    AnalysisResult, ContentDraft, GapFinding, Heading, HeadingNode, Intent, KeywordCandidate,
    KeywordPlan, KeywordStrategy, MAX_PRIORITY, MIN_PRIORITY, OutlineSection, PageGap,
    RankedCompetitor, RawPage, Recommendation, RunStrategy, SchemaMarkup, SearchHit,
    SiteRecommendation, SiteStructure, StrategyBrief,
};
