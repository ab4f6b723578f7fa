//! The orchestrator: plan once, fan out one worker per keyword, merge.
//!
//! Workers run the per-keyword stages strictly in order and report each
//! outcome as a [`StageEvent`] over a channel. The orchestrator is the only
//! writer of [`PipelineState`]; it folds events in as they arrive, so no
//! state is shared between tasks.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use seoscope_analysis::{ComparativeAnalyzer, Competitor, KeywordOutcome, StrategySynthesizer};
use seoscope_crawler::{PageFetcher, SearchProvider, SiteResearcher};
use seoscope_extractor::StructureExtractor;
use seoscope_llm::TextGenerator;
use seoscope_shared::{
    AppConfig, KeywordCandidate, KeywordPlan, PageGap, RawPage, Result, RetryPolicy,
    RunStrategy, SeoscopeError,
};

use crate::generation::{ContentDrafter, GapCommentator, MarkupGenerator};
use crate::planner::KeywordPlanner;
use crate::state::{
    KeywordStage, KeywordStatus, PipelineState, RunStatus, StageEvent, StageFailure, StageOutcome,
};

/// Inbound "analyze" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub seed_keyword: String,
    pub target_site_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u32>,
}

/// Run-wide knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Competitor pages per keyword when the request does not say.
    pub result_count: u32,
    pub vertical: String,
    /// Keywords processed at the same time.
    pub keyword_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            result_count: 10,
            vertical: "general".to_string(),
            keyword_concurrency: 3,
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a new phase.
    fn phase(&self, name: &str);
    /// Called after every merged stage outcome.
    fn keyword_progress(&self, keyword: &str, status: KeywordStatus, finished: usize, total: usize);
    /// Called once the run reaches a terminal status.
    fn done(&self, state: &PipelineState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn keyword_progress(&self, _: &str, _: KeywordStatus, _: usize, _: usize) {}
    fn done(&self, _state: &PipelineState) {}
}

/// The per-keyword stage implementations.
pub struct Stages {
    pub researcher: SiteResearcher,
    pub extractor: StructureExtractor,
    pub analyzer: ComparativeAnalyzer,
    pub strategist: StrategySynthesizer,
    pub drafter: ContentDrafter,
    pub markup: MarkupGenerator,
    /// Set when gap commentary is enabled.
    pub commentator: Option<GapCommentator>,
}

/// Owns one run's [`PipelineState`] and drives it to a terminal status.
pub struct Orchestrator {
    planner: KeywordPlanner,
    stages: Arc<Stages>,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(planner: KeywordPlanner, stages: Stages, options: PipelineOptions) -> Self {
        Self {
            planner,
            stages: Arc::new(stages),
            options,
        }
    }

    /// Wire every stage from `config` around the given collaborators.
    pub fn from_config(
        config: &AppConfig,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);

        let planner = KeywordPlanner::from_config(config, Arc::clone(&generator));

        let stages = Stages {
            researcher: SiteResearcher::new(search, fetcher, retry.clone()).with_timeouts(
                Duration::from_secs(config.search.timeout_secs),
                Duration::from_secs(config.fetch.timeout_secs),
            ),
            extractor: StructureExtractor::new(config.analysis.body_excerpt_chars),
            analyzer: ComparativeAnalyzer::new(config.analysis.gap_threshold),
            strategist: StrategySynthesizer::new(),
            drafter: ContentDrafter::new(Arc::clone(&generator), retry.clone(), llm_timeout),
            markup: MarkupGenerator::new(),
            commentator: config
                .analysis
                .gap_commentary
                .then(|| GapCommentator::new(generator, retry, llm_timeout)),
        };

        let options = PipelineOptions {
            result_count: config.defaults.result_count,
            vertical: config.defaults.vertical.clone(),
            keyword_concurrency: config.defaults.keyword_concurrency,
        };

        Self::new(planner, stages, options)
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Plan keywords for `seed` without running any per-keyword work.
    pub async fn plan(&self, seed: &str) -> Result<KeywordPlan> {
        self.planner.plan(seed, &self.options.vertical).await
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Returns `Err` only for a malformed request. Planning failure,
    /// per-keyword failures, and cancellation are all reported through the
    /// returned state.
    #[instrument(skip_all, fields(seed = %request.seed_keyword, target = %request.target_site_url))]
    pub async fn run(
        &self,
        request: AnalyzeRequest,
        progress: &dyn ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<PipelineState> {
        let target = validate_target(&request.target_site_url)?;
        let result_count = request.result_count.unwrap_or(self.options.result_count);
        if result_count == 0 {
            return Err(SeoscopeError::validation("result_count must be at least 1"));
        }

        let mut state = PipelineState::new(request.seed_keyword.trim(), target.as_str());
        info!(run_id = state.run_id(), "starting run");

        // --- Planning ---
        progress.phase("Planning keywords");
        let planned = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            plan = self.plan(state.seed_keyword()) => Some(plan),
        };

        let plan = match planned {
            None => {
                warn!("run cancelled during planning");
                state.set_run_status(RunStatus::Cancelled)?;
                progress.done(&state);
                return Ok(state);
            }
            Some(Err(e)) => {
                error!(error = %e, "planning failed");
                state.fail_planning(e.to_string())?;
                progress.done(&state);
                return Ok(state);
            }
            Some(Ok(plan)) => plan,
        };

        let candidates = plan.candidates().to_vec();
        state.install_plan(plan);

        // --- Fan-out ---
        state.set_run_status(RunStatus::FanningOut)?;
        progress.phase("Researching keywords");
        let cancelled = self
            .fan_out(&mut state, candidates, &target, result_count, progress, &cancel)
            .await;

        if cancelled {
            state.fail_unfinished(StageFailure::cancelled);
            state.set_run_status(RunStatus::Cancelled)?;
            warn!(run_id = state.run_id(), "run cancelled");
            progress.done(&state);
            return Ok(state);
        }

        // --- Aggregation ---
        state.set_run_status(RunStatus::Aggregating)?;
        progress.phase("Aggregating results");
        if !state.all_terminal() {
            state.fail_unfinished(StageFailure::stopped);
        }
        let strategy = self.summarize(&state);
        state.set_strategy(strategy);
        state.set_run_status(RunStatus::Done)?;

        let summary = state.summary();
        info!(
            planned = summary.planned,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "run complete"
        );
        progress.done(&state);
        Ok(state)
    }

    /// Run-wide strategy over every keyword that reached MARKED_UP.
    fn summarize(&self, state: &PipelineState) -> RunStrategy {
        let outcomes: Vec<KeywordOutcome<'_>> = state
            .records_in_plan_order()
            .into_iter()
            .filter(|r| r.succeeded())
            .filter_map(|r| {
                Some(KeywordOutcome {
                    candidate: &r.candidate,
                    analysis: r.analysis.as_ref()?,
                    brief: r.strategy.as_ref()?,
                })
            })
            .collect();
        self.stages.strategist.summarize(state.seed_keyword(), &outcomes)
    }

    /// Spawn one worker per candidate and merge their events until every
    /// worker is gone. Returns `true` if the run was cancelled.
    async fn fan_out(
        &self,
        state: &mut PipelineState,
        candidates: Vec<KeywordCandidate>,
        target: &Url,
        result_count: u32,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> bool {
        let total = candidates.len();
        let (tx, mut rx) = mpsc::unbounded_channel::<StageEvent>();
        let semaphore = Arc::new(Semaphore::new(self.options.keyword_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for candidate in candidates {
            let job = KeywordJob {
                candidate,
                target_url: target.to_string(),
                result_count,
            };
            let stages = Arc::clone(&self.stages);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                run_keyword(&stages, job, &tx).await;
            });
        }
        // Workers hold the only senders; the channel closes when they finish.
        drop(tx);

        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    workers.abort_all();
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => merge(state, event, total, progress),
                    None => break,
                },
            }
        }

        // Outcomes sent before the abort still count.
        while let Ok(event) = rx.try_recv() {
            merge(state, event, total, progress);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "keyword worker panicked");
                }
            }
        }

        cancelled
    }
}

fn validate_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SeoscopeError::validation(format!("invalid target_site_url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(SeoscopeError::validation(format!(
            "target_site_url must be an http(s) URL with a host, got '{raw}'"
        )));
    }
    Ok(url)
}

fn merge(state: &mut PipelineState, event: StageEvent, total: usize, progress: &dyn ProgressReporter) {
    let keyword = event.keyword.clone();
    match state.apply(event) {
        Ok(status) => {
            let finished = state
                .per_keyword()
                .values()
                .filter(|r| r.is_terminal())
                .count();
            debug!(keyword = %keyword, ?status, "stage merged");
            progress.keyword_progress(&keyword, status, finished, total);
        }
        Err(e) => warn!(keyword = %keyword, error = %e, "discarding stage event"),
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct KeywordJob {
    candidate: KeywordCandidate,
    target_url: String,
    result_count: u32,
}

type StageResult<T> = std::result::Result<T, (KeywordStage, SeoscopeError)>;

/// Tag an error with the stage that was being attempted.
trait AtStage<T> {
    fn at(self, stage: KeywordStage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: KeywordStage) -> StageResult<T> {
        self.map_err(|e| (stage, e))
    }
}

struct Reporter<'a> {
    keyword: &'a str,
    tx: &'a mpsc::UnboundedSender<StageEvent>,
}

impl Reporter<'_> {
    fn send(&self, outcome: StageOutcome) {
        // A closed channel means the run was cancelled; nothing left to tell.
        let _ = self.tx.send(StageEvent::new(self.keyword, outcome));
    }
}

#[instrument(skip_all, fields(keyword = %job.candidate.keyword))]
async fn run_keyword(stages: &Stages, job: KeywordJob, tx: &mpsc::UnboundedSender<StageEvent>) {
    let reporter = Reporter {
        keyword: &job.candidate.keyword,
        tx,
    };
    match advance(stages, &job, &reporter).await {
        Ok(()) => info!("keyword complete"),
        Err((stage, e)) => {
            warn!(%stage, error = %e, "keyword failed");
            reporter.send(StageOutcome::Failed(StageFailure::from_error(stage, &e)));
        }
    }
}

async fn advance(stages: &Stages, job: &KeywordJob, reporter: &Reporter<'_>) -> StageResult<()> {
    let keyword = job.candidate.keyword.as_str();

    let research = stages
        .researcher
        .research(keyword, job.result_count, &job.target_url)
        .await
        .at(KeywordStage::Researched)?;
    reporter.send(StageOutcome::Researched {
        pages: research
            .competitors
            .iter()
            .map(|p| RawPage {
                content: String::new(),
                ..p.clone()
            })
            .collect(),
        gaps: research.gaps.clone(),
    });

    let target = stages
        .extractor
        .extract(&research.target.url, &research.target.content)
        .at(KeywordStage::Structured)?;
    let mut competitors = Vec::with_capacity(research.competitors.len());
    let mut parse_gaps = Vec::new();
    for page in &research.competitors {
        match stages.extractor.extract(&page.url, &page.content) {
            Ok(structure) => competitors.push(Competitor {
                serp_rank: page.rank,
                structure,
            }),
            Err(e) => {
                debug!(url = %page.url, error = %e, "competitor page skipped");
                parse_gaps.push(PageGap {
                    url: page.url.clone(),
                    rank: page.rank,
                    reason: e.to_string(),
                });
            }
        }
    }
    reporter.send(StageOutcome::Structured {
        target: target.clone(),
        competitors: competitors.iter().map(|c| c.structure.clone()).collect(),
        gaps: parse_gaps,
    });

    let mut analysis = stages
        .analyzer
        .analyze(keyword, &target, &competitors)
        .at(KeywordStage::Analyzed)?;
    if let Some(commentator) = &stages.commentator {
        analysis.commentary = commentator.comment(&analysis).await;
    }
    reporter.send(StageOutcome::Analyzed(analysis.clone()));

    let brief = stages.strategist.synthesize(&analysis);
    reporter.send(StageOutcome::Strategized(brief.clone()));

    let draft = stages
        .drafter
        .draft(keyword, job.candidate.intent, &brief)
        .await
        .at(KeywordStage::Drafted)?;
    reporter.send(StageOutcome::Drafted(draft.clone()));

    let markup = stages
        .markup
        .generate(&draft, &job.target_url)
        .at(KeywordStage::MarkedUp)?;
    reporter.send(StageOutcome::MarkedUp(markup));

    Ok(())
}
