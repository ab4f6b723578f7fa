//! End-to-end orchestrator runs against in-process collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use seoscope_analysis::{ComparativeAnalyzer, StrategySynthesizer};
use seoscope_core::{
    AnalyzeRequest, ContentDrafter, FailureKind, KeywordPlanner, KeywordStage, KeywordStatus,
    MarkupGenerator, Orchestrator, PipelineOptions, PipelineState, ProgressReporter, RunStatus,
    SilentProgress, Stages,
};
use seoscope_crawler::{PageFetcher, SearchProvider, SiteResearcher};
use seoscope_extractor::StructureExtractor;
use seoscope_llm::{GenerationRequest, GenerationTask, TemplateGenerator, TextGenerator};
use seoscope_shared::{Result, RetryPolicy, SearchHit, SeoscopeError};

const SEED: &str = "industrial sensors";
const TARGET: &str = "https://mine.example.com/sensors";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Two competitor hits per keyword. Keywords in `stall` never answer.
#[derive(Default)]
struct FakeSearch {
    stall: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeSearch {
    fn stalling(keywords: &[&str]) -> Self {
        Self {
            stall: keywords.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, keyword: &str, count: u32) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.contains(keyword) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let slug = keyword.replace(' ', "-");
        Ok((1..=count.min(2))
            .map(|rank| SearchHit {
                url: format!("https://{slug}-{rank}.example.com/"),
                rank,
                title: String::new(),
                snippet: String::new(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Serves a thin target page and richer competitor pages. URLs starting
/// with a `hollow` prefix get a page with no title, headings, or text.
#[derive(Default)]
struct FakeFetcher {
    hollow: Vec<String>,
}

impl FakeFetcher {
    fn hollow(prefixes: &[&str]) -> Self {
        Self {
            hollow: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if self.hollow.iter().any(|p| url.starts_with(p.as_str())) {
            // The comment keeps bodies distinct so none are dropped as mirrors
            return Ok(format!("<html><body><div></div><!-- {url} --></body></html>"));
        }
        if url.starts_with("https://mine.example.com") {
            return Ok("<html><head><title>Sensors</title></head>\
                       <body><h1>Our sensors</h1><p>We sell sensors.</p></body></html>"
                .to_string());
        }
        let words = format!("{SEED} for process control ").repeat(60);
        Ok(format!(
            "<html><head><title>{SEED} buyer guide | {url}</title>\
             <meta name=\"description\" content=\"Everything about {SEED}.\"></head>\
             <body><h1>{SEED}</h1><h2>Types of {SEED}</h2><h2>Choosing {SEED}</h2>\
             <h3>Pressure</h3><p>{words}</p></body></html>"
        ))
    }
}

/// Template output, except drafts for one keyword come back as prose.
struct ProseDraftFor {
    keyword: &'static str,
    inner: TemplateGenerator,
}

#[async_trait]
impl TextGenerator for ProseDraftFor {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if request.task == GenerationTask::DraftContent
            && request.context_str("keyword") == self.keyword
        {
            return Ok("Happy to help! Here are some thoughts on sensors.".to_string());
        }
        self.inner.generate(request).await
    }

    fn name(&self) -> &str {
        "prose-draft"
    }
}

fn orchestrator(search: Arc<FakeSearch>, search_timeout: Duration) -> Orchestrator {
    orchestrator_with(
        search,
        search_timeout,
        FakeFetcher::default(),
        Arc::new(TemplateGenerator::new()),
    )
}

fn orchestrator_with(
    search: Arc<FakeSearch>,
    search_timeout: Duration,
    fetcher: FakeFetcher,
    generator: Arc<dyn TextGenerator>,
) -> Orchestrator {
    let retry = RetryPolicy::immediate(2);

    let planner = KeywordPlanner::new(generator.clone(), retry.clone()).with_max_keywords(3);
    let stages = Stages {
        researcher: SiteResearcher::new(search, Arc::new(fetcher), retry.clone())
            .with_timeouts(search_timeout, Duration::from_secs(5)),
        extractor: StructureExtractor::default(),
        analyzer: ComparativeAnalyzer::default(),
        strategist: StrategySynthesizer::new(),
        drafter: ContentDrafter::new(generator, retry, Duration::from_secs(5)),
        markup: MarkupGenerator::new(),
        commentator: None,
    };
    Orchestrator::new(
        planner,
        stages,
        PipelineOptions {
            keyword_concurrency: 3,
            ..PipelineOptions::default()
        },
    )
}

fn request(seed: &str) -> AnalyzeRequest {
    AnalyzeRequest {
        seed_keyword: seed.to_string(),
        target_site_url: TARGET.to_string(),
        result_count: Some(5),
    }
}

fn plan_keywords(state: &PipelineState) -> Vec<String> {
    state
        .keyword_plan()
        .map(|p| p.candidates().iter().map(|c| c.keyword.clone()).collect())
        .unwrap_or_default()
}

/// Checks that hold for every finished run.
fn assert_well_formed(state: &PipelineState) {
    let planned = plan_keywords(state);
    for (keyword, record) in state.per_keyword() {
        assert!(planned.contains(keyword), "orphan keyword {keyword}");
        assert!(record.is_terminal(), "{keyword} not terminal");
        assert!(
            record.history.windows(2).all(|w| w[0] < w[1]),
            "{keyword} history regressed: {:?}",
            record.history
        );
        if record.markup.is_some() {
            assert!(record.content.is_some());
        }
        if record.content.is_some() {
            assert!(record.strategy.is_some());
        }
        if record.strategy.is_some() {
            assert!(record.analysis.is_some());
        }
    }
    assert_eq!(state.per_keyword().len(), planned.len());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_keywords_reach_marked_up() {
    let orchestrator = orchestrator(Arc::new(FakeSearch::default()), Duration::from_secs(5));
    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Done);
    assert_eq!(state.per_keyword().len(), 3);
    for record in state.per_keyword().values() {
        assert_eq!(record.status, KeywordStatus::MarkedUp);
        assert_eq!(record.history.len(), KeywordStage::SEQUENCE.len());
        assert_eq!(record.sources.len(), 2);
        assert_eq!(record.structures.len(), 2);
        assert!(record.target_structure.is_some());

        let analysis = record.analysis.as_ref().unwrap();
        assert!(!analysis.gaps.is_empty(), "thin target page should trail");
        let strategy = record.strategy.as_ref().unwrap();
        assert!(
            strategy
                .recommendations
                .windows(2)
                .all(|w| w[0].priority >= w[1].priority)
        );
    }
    assert_eq!(state.summary().succeeded, 3);
    assert_eq!(state.summary().failed, 0);
    assert!(state.finished_at().is_some());

    let strategy = state.strategy().unwrap();
    assert_eq!(strategy.seed_keyword, SEED);
    let keywords: Vec<_> = strategy.keyword_strategies.iter().map(|k| k.keyword.clone()).collect();
    assert_eq!(keywords, plan_keywords(&state));
    assert!(
        strategy
            .keyword_strategies
            .iter()
            .all(|k| k.recommended_content_type == "explainer article")
    );
    // The same thin target page trails on every keyword, so the most
    // widespread fix covers all of them
    let widest = strategy.global_recommendations.first().unwrap();
    assert_eq!(widest.keywords.len(), 3);
    assert_well_formed(&state);
}

#[tokio::test]
async fn one_keyword_timing_out_does_not_affect_siblings() {
    let second = "what is industrial sensors";
    let search = Arc::new(FakeSearch::stalling(&[second]));
    let orchestrator = orchestrator(search.clone(), Duration::from_millis(50));

    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Done);
    assert_eq!(plan_keywords(&state)[1], second);

    let failed = state.record(second).unwrap();
    assert_eq!(failed.status, KeywordStatus::Failed);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.to_string(), "FAILED(RESEARCHED, \"provider timeout\")");
    assert_eq!(error.kind, FailureKind::Retrieval);
    assert!(failed.sources.is_empty());
    assert!(failed.analysis.is_none());

    for keyword in ["industrial sensors", "industrial sensors types"] {
        assert_eq!(state.record(keyword).unwrap().status, KeywordStatus::MarkedUp);
    }
    assert_eq!(state.summary().succeeded, 2);
    assert_eq!(state.summary().failed, 1);

    // 3 searches for the stalled keyword, 1 each for the others
    assert_eq!(search.calls.load(Ordering::SeqCst), 5);

    let strategy = state.strategy().unwrap();
    assert_eq!(strategy.keyword_strategies.len(), 2);
    assert!(strategy.keyword_strategies.iter().all(|k| k.keyword != second));
    assert_well_formed(&state);
}

#[tokio::test]
async fn empty_seed_fails_planning_without_fan_out() {
    let search = Arc::new(FakeSearch::default());
    let orchestrator = orchestrator(search.clone(), Duration::from_secs(5));

    for seed in ["", "   ", "?!"] {
        let state = orchestrator
            .run(request(seed), &SilentProgress, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.run_status(), RunStatus::PlanningFailed);
        assert!(state.per_keyword().is_empty());
        assert!(state.keyword_plan().is_none());
        assert!(state.planning_error().is_some());
    }
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_target_is_rejected() {
    let orchestrator = orchestrator(Arc::new(FakeSearch::default()), Duration::from_secs(5));
    let mut req = request(SEED);
    req.target_site_url = "mine.example.com".into();

    let err = orchestrator
        .run(req, &SilentProgress, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SeoscopeError::Validation { .. }));
}

/// Cancels the run as soon as any keyword finishes.
struct CancelOnFirstSuccess(CancellationToken);

impl ProgressReporter for CancelOnFirstSuccess {
    fn phase(&self, _name: &str) {}

    fn keyword_progress(&self, _keyword: &str, status: KeywordStatus, _: usize, _: usize) {
        if status == KeywordStatus::MarkedUp {
            self.0.cancel();
        }
    }

    fn done(&self, _state: &PipelineState) {}
}

#[tokio::test]
async fn cancellation_keeps_partial_results() {
    let search = Arc::new(FakeSearch::stalling(&[
        "what is industrial sensors",
        "industrial sensors types",
    ]));
    let orchestrator = orchestrator(search, Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let state = orchestrator
        .run(request(SEED), &CancelOnFirstSuccess(cancel.clone()), cancel)
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Cancelled);
    assert_eq!(state.per_keyword().len(), 3);

    let done = state.record(SEED).unwrap();
    assert_eq!(done.status, KeywordStatus::MarkedUp);
    assert!(done.markup.is_some());

    for keyword in ["what is industrial sensors", "industrial sensors types"] {
        let error = state.record(keyword).unwrap().error.clone().unwrap();
        assert_eq!(error.stage, KeywordStage::Researched);
        assert_eq!(error.kind, FailureKind::Cancelled);
        assert_eq!(error.reason, "run cancelled");
    }
    assert_eq!(state.summary().succeeded, 1);
    assert_well_formed(&state);
}

#[tokio::test]
async fn cancelled_before_start_stops_at_planning() {
    let search = Arc::new(FakeSearch::default());
    let orchestrator = orchestrator(search.clone(), Duration::from_secs(5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = orchestrator
        .run(request(SEED), &SilentProgress, cancel)
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Cancelled);
    assert!(state.per_keyword().is_empty());
    assert!(state.strategy().is_none());
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparseable_target_fails_at_structured() {
    let orchestrator = orchestrator_with(
        Arc::new(FakeSearch::default()),
        Duration::from_secs(5),
        FakeFetcher::hollow(&["https://hollow.example.com"]),
        Arc::new(TemplateGenerator::new()),
    );
    let mut req = request(SEED);
    req.target_site_url = "https://hollow.example.com/sensors".into();

    let state = orchestrator
        .run(req, &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    // Keyword-local failures still end the run normally
    assert_eq!(state.run_status(), RunStatus::Done);
    for record in state.per_keyword().values() {
        let error = record.error.as_ref().unwrap();
        assert_eq!(error.stage, KeywordStage::Structured);
        assert_eq!(error.kind, FailureKind::Parse);
        assert!(error.reason.contains("degenerate"), "{}", error.reason);

        assert_eq!(record.reached, KeywordStage::Researched);
        assert_eq!(record.sources.len(), 2);
        assert!(record.target_structure.is_none());
        assert!(record.structures.is_empty());
        assert!(record.analysis.is_none());
    }
    assert_eq!(state.summary().failed, 3);
    assert!(state.strategy().unwrap().keyword_strategies.is_empty());
    assert_well_formed(&state);
}

#[tokio::test]
async fn no_parseable_competitor_fails_at_analyzed() {
    let hollow = "what is industrial sensors";
    let orchestrator = orchestrator_with(
        Arc::new(FakeSearch::default()),
        Duration::from_secs(5),
        FakeFetcher::hollow(&["https://what-is-industrial-sensors-"]),
        Arc::new(TemplateGenerator::new()),
    );

    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Done);
    let failed = state.record(hollow).unwrap();
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.stage, KeywordStage::Analyzed);
    assert_eq!(error.kind, FailureKind::InsufficientData);

    assert_eq!(failed.reached, KeywordStage::Structured);
    assert!(failed.target_structure.is_some());
    assert!(failed.structures.is_empty());
    assert_eq!(failed.page_gaps.len(), 2);
    assert!(failed.analysis.is_none());
    assert!(failed.strategy.is_none());

    for keyword in ["industrial sensors", "industrial sensors types"] {
        assert_eq!(state.record(keyword).unwrap().status, KeywordStatus::MarkedUp);
    }
    assert_eq!(state.summary().succeeded, 2);
    assert_well_formed(&state);
}

#[tokio::test]
async fn rejected_draft_fails_at_drafted() {
    let prose = "industrial sensors types";
    let orchestrator = orchestrator_with(
        Arc::new(FakeSearch::default()),
        Duration::from_secs(5),
        FakeFetcher::default(),
        Arc::new(ProseDraftFor {
            keyword: prose,
            inner: TemplateGenerator::new(),
        }),
    );

    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Done);
    let failed = state.record(prose).unwrap();
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.stage, KeywordStage::Drafted);
    assert_eq!(error.kind, FailureKind::Generation);
    assert!(error.reason.contains("not valid JSON"), "{}", error.reason);

    assert_eq!(failed.reached, KeywordStage::Strategized);
    assert!(failed.analysis.is_some());
    assert!(failed.strategy.is_some());
    assert!(failed.content.is_none());
    assert!(failed.markup.is_none());

    for keyword in ["industrial sensors", "what is industrial sensors"] {
        assert_eq!(state.record(keyword).unwrap().status, KeywordStatus::MarkedUp);
    }
    assert_eq!(state.summary().failed, 1);
    assert_well_formed(&state);
}

#[tokio::test]
async fn concurrency_of_one_still_finishes_every_keyword() {
    let search = Arc::new(FakeSearch::stalling(&["industrial sensors types"]));
    let generator = Arc::new(TemplateGenerator::new());
    let retry = RetryPolicy::none();
    let stages = Stages {
        researcher: SiteResearcher::new(
            search,
            Arc::new(FakeFetcher::default()),
            retry.clone(),
        )
        .with_timeouts(Duration::from_millis(20), Duration::from_secs(5)),
        extractor: StructureExtractor::default(),
        analyzer: ComparativeAnalyzer::default(),
        strategist: StrategySynthesizer::new(),
        drafter: ContentDrafter::new(generator.clone(), retry.clone(), Duration::from_secs(5)),
        markup: MarkupGenerator::new(),
        commentator: None,
    };
    let orchestrator = Orchestrator::new(
        KeywordPlanner::new(generator, retry).with_max_keywords(4),
        stages,
        PipelineOptions {
            keyword_concurrency: 1,
            ..PipelineOptions::default()
        },
    );

    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.run_status(), RunStatus::Done);
    assert_eq!(state.summary().planned, 4);
    assert_eq!(state.summary().succeeded, 3);
    assert_eq!(state.summary().failed, 1);
    assert_well_formed(&state);
}

#[tokio::test]
async fn state_serializes_with_screaming_statuses() {
    let orchestrator = orchestrator(Arc::new(FakeSearch::default()), Duration::from_secs(5));
    let state = orchestrator
        .run(request(SEED), &SilentProgress, CancellationToken::new())
        .await
        .unwrap();

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["run_status"], "DONE");
    assert_eq!(json["per_keyword"][SEED]["status"], "MARKED_UP");
    assert_eq!(json["seed_keyword"], SEED);
    assert!(json["per_keyword"][SEED]["sources"][0].get("content").is_none());
    assert!(json["per_keyword"][SEED]["target_outline"].is_array());
    assert!(json["strategy"]["overview"].is_string());
}
