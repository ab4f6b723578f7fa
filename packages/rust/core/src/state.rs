//! Pipeline state and the per-keyword state machine.
//!
//! [`PipelineState`] is owned by the orchestrator for the lifetime of one
//! run. Workers never touch it: they emit [`StageEvent`]s, and the
//! orchestrator folds them in through [`PipelineState::apply`], which is the
//! only place per-keyword records change.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seoscope_shared::{
    AnalysisResult, ContentDraft, HeadingNode, KeywordCandidate, KeywordPlan, PageGap, RawPage,
    Result, RunStrategy, SchemaMarkup, SeoscopeError, SiteStructure, StrategyBrief,
};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Successful stages a keyword moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordStage {
    Pending,
    Researched,
    Structured,
    Analyzed,
    Strategized,
    Drafted,
    MarkedUp,
}

impl KeywordStage {
    pub const SEQUENCE: [KeywordStage; 7] = [
        Self::Pending,
        Self::Researched,
        Self::Structured,
        Self::Analyzed,
        Self::Strategized,
        Self::Drafted,
        Self::MarkedUp,
    ];

    /// The stage after this one, `None` for the terminal stage.
    pub fn next(self) -> Option<Self> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == Self::MarkedUp
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Researched => "RESEARCHED",
            Self::Structured => "STRUCTURED",
            Self::Analyzed => "ANALYZED",
            Self::Strategized => "STRATEGIZED",
            Self::Drafted => "DRAFTED",
            Self::MarkedUp => "MARKED_UP",
        }
    }

    /// Error category recorded when a provider error escapes the retry
    /// policy while attempting this stage.
    fn default_failure(self) -> FailureKind {
        match self {
            Self::Pending | Self::Researched => FailureKind::Retrieval,
            Self::Structured => FailureKind::Parse,
            Self::Analyzed => FailureKind::InsufficientData,
            Self::Strategized | Self::Drafted | Self::MarkedUp => FailureKind::Generation,
        }
    }
}

impl fmt::Display for KeywordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error category of a per-keyword failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Retrieval,
    Parse,
    InsufficientData,
    Generation,
    Cancelled,
}

/// Why and where a keyword stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The stage that was being attempted.
    pub stage: KeywordStage,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    /// Classify `err` raised while attempting `stage`.
    pub fn from_error(stage: KeywordStage, err: &SeoscopeError) -> Self {
        let kind = match err {
            SeoscopeError::Retrieval(_) => FailureKind::Retrieval,
            SeoscopeError::Parse { .. } => FailureKind::Parse,
            SeoscopeError::InsufficientData(_) => FailureKind::InsufficientData,
            SeoscopeError::Generation(_) => FailureKind::Generation,
            SeoscopeError::Cancelled => FailureKind::Cancelled,
            _ => stage.default_failure(),
        };
        Self {
            stage,
            kind,
            reason: err.to_string(),
        }
    }

    pub fn cancelled(stage: KeywordStage) -> Self {
        Self::from_error(stage, &SeoscopeError::Cancelled)
    }

    /// The worker for this keyword ended without reporting a final outcome.
    pub fn stopped(stage: KeywordStage) -> Self {
        Self {
            stage,
            kind: stage.default_failure(),
            reason: "worker stopped before completion".to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FAILED({}, \"{}\")", self.stage, self.reason)
    }
}

/// Reported status of one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordStatus {
    Pending,
    Researched,
    Structured,
    Analyzed,
    Strategized,
    Drafted,
    MarkedUp,
    Failed,
}

impl From<KeywordStage> for KeywordStatus {
    fn from(stage: KeywordStage) -> Self {
        match stage {
            KeywordStage::Pending => Self::Pending,
            KeywordStage::Researched => Self::Researched,
            KeywordStage::Structured => Self::Structured,
            KeywordStage::Analyzed => Self::Analyzed,
            KeywordStage::Strategized => Self::Strategized,
            KeywordStage::Drafted => Self::Drafted,
            KeywordStage::MarkedUp => Self::MarkedUp,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Result of one stage, produced by a worker.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Researched {
        /// Competitor pages, content stripped.
        pages: Vec<RawPage>,
        gaps: Vec<PageGap>,
    },
    Structured {
        target: SiteStructure,
        competitors: Vec<SiteStructure>,
        /// Competitor pages that failed to parse.
        gaps: Vec<PageGap>,
    },
    Analyzed(AnalysisResult),
    Strategized(StrategyBrief),
    Drafted(ContentDraft),
    MarkedUp(SchemaMarkup),
    Failed(StageFailure),
}

impl StageOutcome {
    /// The stage this outcome completes, or the stage that failed.
    pub fn stage(&self) -> KeywordStage {
        match self {
            Self::Researched { .. } => KeywordStage::Researched,
            Self::Structured { .. } => KeywordStage::Structured,
            Self::Analyzed(_) => KeywordStage::Analyzed,
            Self::Strategized(_) => KeywordStage::Strategized,
            Self::Drafted(_) => KeywordStage::Drafted,
            Self::MarkedUp(_) => KeywordStage::MarkedUp,
            Self::Failed(failure) => failure.stage,
        }
    }
}

/// A stage outcome addressed to one keyword.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub keyword: String,
    pub outcome: StageOutcome,
}

impl StageEvent {
    pub fn new(keyword: impl Into<String>, outcome: StageOutcome) -> Self {
        Self {
            keyword: keyword.into(),
            outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-keyword record
// ---------------------------------------------------------------------------

/// Everything recorded for one planned keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub candidate: KeywordCandidate,
    pub status: KeywordStatus,
    /// Last stage that succeeded.
    pub reached: KeywordStage,
    /// Stages reached, in order.
    pub history: Vec<KeywordStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RawPage>,
    /// Pages skipped during research or extraction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_gaps: Vec<PageGap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_structure: Option<SiteStructure>,
    /// The target page's headings as a nested outline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_outline: Vec<HeadingNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structures: Vec<SiteStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<SchemaMarkup>,
}

impl KeywordRecord {
    fn new(candidate: KeywordCandidate) -> Self {
        Self {
            candidate,
            status: KeywordStatus::Pending,
            reached: KeywordStage::Pending,
            history: vec![KeywordStage::Pending],
            error: None,
            sources: Vec::new(),
            page_gaps: Vec::new(),
            target_structure: None,
            target_outline: Vec::new(),
            structures: Vec::new(),
            analysis: None,
            strategy: None,
            content: None,
            markup: None,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.candidate.keyword
    }

    /// Succeeded through every stage or failed.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.reached.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.reached.is_terminal()
    }

    /// The stage a worker would attempt next.
    pub fn next_stage(&self) -> Option<KeywordStage> {
        if self.error.is_some() {
            None
        } else {
            self.reached.next()
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Global run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Planning,
    FanningOut,
    Aggregating,
    Done,
    PlanningFailed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PlanningFailed | Self::Cancelled)
    }

    fn can_move_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Planning, FanningOut)
                | (Planning, PlanningFailed)
                | (Planning, Cancelled)
                | (FanningOut, Aggregating)
                | (FanningOut, Cancelled)
                | (Aggregating, Done)
        )
    }
}

/// Aggregate counts over the per-keyword records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// The run's accumulated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    run_id: String,
    seed_keyword: String,
    target_site_url: String,
    run_status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    planning_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keyword_plan: Option<KeywordPlan>,
    per_keyword: BTreeMap<String, KeywordRecord>,
    summary: RunSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strategy: Option<RunStrategy>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(seed_keyword: impl Into<String>, target_site_url: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            seed_keyword: seed_keyword.into(),
            target_site_url: target_site_url.into(),
            run_status: RunStatus::Planning,
            planning_error: None,
            keyword_plan: None,
            per_keyword: BTreeMap::new(),
            summary: RunSummary::default(),
            strategy: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn seed_keyword(&self) -> &str {
        &self.seed_keyword
    }

    pub fn target_site_url(&self) -> &str {
        &self.target_site_url
    }

    pub fn run_status(&self) -> RunStatus {
        self.run_status
    }

    pub fn planning_error(&self) -> Option<&str> {
        self.planning_error.as_deref()
    }

    pub fn keyword_plan(&self) -> Option<&KeywordPlan> {
        self.keyword_plan.as_ref()
    }

    pub fn per_keyword(&self) -> &BTreeMap<String, KeywordRecord> {
        &self.per_keyword
    }

    pub fn record(&self, keyword: &str) -> Option<&KeywordRecord> {
        self.per_keyword.get(keyword)
    }

    /// Records in plan order (priority descending).
    pub fn records_in_plan_order(&self) -> Vec<&KeywordRecord> {
        match &self.keyword_plan {
            Some(plan) => plan
                .candidates()
                .iter()
                .filter_map(|c| self.per_keyword.get(&c.keyword))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Cross-keyword strategy, present once aggregation has run.
    pub fn strategy(&self) -> Option<&RunStrategy> {
        self.strategy.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    // -- Mutation (orchestrator only) ---------------------------------------

    pub(crate) fn set_run_status(&mut self, next: RunStatus) -> Result<()> {
        if !self.run_status.can_move_to(next) {
            return Err(SeoscopeError::validation(format!(
                "illegal run transition {:?} -> {next:?}",
                self.run_status
            )));
        }
        self.run_status = next;
        if next.is_terminal() {
            self.finish();
        }
        Ok(())
    }

    /// Install the plan and open a PENDING record for every candidate.
    pub(crate) fn install_plan(&mut self, plan: KeywordPlan) {
        self.per_keyword = plan
            .candidates()
            .iter()
            .map(|c| (c.keyword.clone(), KeywordRecord::new(c.clone())))
            .collect();
        self.summary.planned = plan.len();
        self.keyword_plan = Some(plan);
    }

    pub(crate) fn set_strategy(&mut self, strategy: RunStrategy) {
        self.strategy = Some(strategy);
    }

    pub(crate) fn fail_planning(&mut self, reason: String) -> Result<()> {
        self.planning_error = Some(reason);
        self.set_run_status(RunStatus::PlanningFailed)
    }

    /// Merge one worker event.
    ///
    /// Rejects keywords that are not in the plan, events for keywords that
    /// already reached a terminal state, and any transition other than to
    /// the immediately following stage.
    pub fn apply(&mut self, event: StageEvent) -> Result<KeywordStatus> {
        let in_plan = self
            .keyword_plan
            .as_ref()
            .is_some_and(|p| p.contains(&event.keyword));
        let record = match self.per_keyword.get_mut(&event.keyword) {
            Some(record) if in_plan => record,
            _ => {
                return Err(SeoscopeError::validation(format!(
                    "event for unplanned keyword '{}'",
                    event.keyword
                )));
            }
        };

        let Some(expected) = record.next_stage() else {
            return Err(SeoscopeError::validation(format!(
                "keyword '{}' is already terminal ({:?})",
                event.keyword, record.status
            )));
        };

        let stage = event.outcome.stage();
        if stage != expected {
            return Err(SeoscopeError::validation(format!(
                "keyword '{}' cannot move from {} to {stage} (expected {expected})",
                event.keyword, record.reached
            )));
        }

        match event.outcome {
            StageOutcome::Failed(failure) => {
                record.error = Some(failure);
                record.status = KeywordStatus::Failed;
                return Ok(record.status);
            }
            StageOutcome::Researched { pages, gaps } => {
                record.sources = pages;
                record.page_gaps.extend(gaps);
            }
            StageOutcome::Structured {
                target,
                competitors,
                gaps,
            } => {
                record.target_outline = target.heading_tree();
                record.target_structure = Some(target);
                record.structures = competitors;
                record.page_gaps.extend(gaps);
            }
            StageOutcome::Analyzed(analysis) => record.analysis = Some(analysis),
            StageOutcome::Strategized(brief) => record.strategy = Some(brief),
            StageOutcome::Drafted(draft) => record.content = Some(draft),
            StageOutcome::MarkedUp(markup) => record.markup = Some(markup),
        }

        record.reached = stage;
        record.history.push(stage);
        record.status = stage.into();
        Ok(record.status)
    }

    /// Fail every non-terminal keyword at the stage it would attempt next.
    pub(crate) fn fail_unfinished(&mut self, make: impl Fn(KeywordStage) -> StageFailure) {
        for record in self.per_keyword.values_mut() {
            if let Some(stage) = record.next_stage() {
                record.error = Some(make(stage));
                record.status = KeywordStatus::Failed;
            }
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.per_keyword.values().all(KeywordRecord::is_terminal)
    }

    fn finish(&mut self) {
        self.summary = RunSummary {
            planned: self.per_keyword.len(),
            succeeded: self.per_keyword.values().filter(|r| r.succeeded()).count(),
            failed: self
                .per_keyword
                .values()
                .filter(|r| r.error.is_some())
                .count(),
        };
        self.finished_at = Some(Utc::now());
    }
}
