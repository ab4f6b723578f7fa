//! Workflow orchestration for seoscope.
//!
//! This crate plans keywords from a seed, fans the per-keyword stages out
//! over a bounded worker pool (research, structure, analysis, strategy,
//! drafting, markup), and merges every outcome into one [`PipelineState`].

pub mod generation;
pub mod pipeline;
pub mod planner;
pub mod state;

pub use generation::{ContentDrafter, GapCommentator, MarkupGenerator};
pub use pipeline::{
    AnalyzeRequest, Orchestrator, PipelineOptions, ProgressReporter, SilentProgress, Stages,
};
pub use planner::{KeywordPlanner, PriorityPolicy, PrioritySignals, WeightedPriority};
pub use state::{
    FailureKind, KeywordRecord, KeywordStage, KeywordStatus, PipelineState, RunStatus, RunSummary,
    StageEvent, StageFailure, StageOutcome,
};
