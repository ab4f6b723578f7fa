//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use secrecy::SecretString;
use seoscope_core::{
    AnalyzeRequest, KeywordPlanner, KeywordStatus, Orchestrator, PipelineState, ProgressReporter,
    RunStatus,
};
use seoscope_crawler::{GoogleCustomSearch, GoogleSearchOptions, HttpFetcher};
use seoscope_llm::{ChatCompletionsClient, TemplateGenerator, TextGenerator};
use seoscope_shared::{AppConfig, env_secret, init_config, load_config, search_credentials};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// seoscope: plan keywords, compare against ranking competitors, draft content.
#[derive(Parser)]
#[command(
    name = "seoscope",
    version,
    about = "Plan keywords, score your page against ranking competitors, and draft content.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a seed keyword.
    Analyze {
        /// Seed keyword to expand.
        seed: String,

        /// Page on your own site to compare against competitors.
        #[arg(short, long)]
        target: String,

        /// Competitor pages per keyword.
        #[arg(short, long)]
        count: Option<u32>,

        /// Planned keywords to keep.
        #[arg(long)]
        max_keywords: Option<usize>,

        /// Industry or vertical used when planning.
        #[arg(long)]
        vertical: Option<String>,

        /// Keywords processed concurrently.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the JSON result to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Only build the keyword plan for a seed keyword.
    Plan {
        /// Seed keyword to expand.
        seed: String,

        /// Planned keywords to keep.
        #[arg(long)]
        max_keywords: Option<usize>,

        /// Industry or vertical used when planning.
        #[arg(long)]
        vertical: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seoscope=info",
        1 => "seoscope=debug",
        _ => "seoscope=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze {
            seed,
            target,
            count,
            max_keywords,
            vertical,
            concurrency,
            out,
        } => {
            let mut config = load_config()?;
            apply_overrides(&mut config, max_keywords, vertical, concurrency);
            if let Some(count) = count {
                config.defaults.result_count = count;
            }
            cmd_analyze(&config, seed, target, out).await
        }
        Command::Plan {
            seed,
            max_keywords,
            vertical,
        } => {
            let mut config = load_config()?;
            apply_overrides(&mut config, max_keywords, vertical, None);
            cmd_plan(&config, &seed).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn apply_overrides(
    config: &mut AppConfig,
    max_keywords: Option<usize>,
    vertical: Option<String>,
    concurrency: Option<usize>,
) {
    if let Some(max) = max_keywords {
        config.defaults.max_keywords = max;
    }
    if let Some(vertical) = vertical {
        config.defaults.vertical = vertical;
    }
    if let Some(n) = concurrency {
        config.defaults.keyword_concurrency = n;
    }
}

/// The configured model client, or the offline template generator when no
/// API key is set.
fn text_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    match env_secret(&config.llm.api_key_env) {
        Some(key) => {
            let client = ChatCompletionsClient::new(&config.llm, key)?;
            info!(model = client.model(), "using chat completions model");
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                env = %config.llm.api_key_env,
                "no model API key set, using offline templates"
            );
            Ok(Arc::new(TemplateGenerator::new()))
        }
    }
}

async fn cmd_analyze(
    config: &AppConfig,
    seed: String,
    target: String,
    out: Option<PathBuf>,
) -> Result<()> {
    // Validate credentials before doing anything
    let (api_key, cx) = search_credentials(config)?;

    let search = GoogleCustomSearch::new(GoogleSearchOptions {
        endpoint: config.search.endpoint.clone(),
        api_key: SecretString::from(api_key),
        cx,
        language: config.search.language.clone(),
        timeout: Duration::from_secs(config.search.timeout_secs),
    })?;
    let fetcher = HttpFetcher::new(&config.fetch)?;
    let generator = text_generator(config)?;

    let orchestrator =
        Orchestrator::from_config(config, Arc::new(search), Arc::new(fetcher), generator);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let request = AnalyzeRequest {
        seed_keyword: seed,
        target_site_url: target,
        result_count: Some(config.defaults.result_count),
    };

    let reporter = CliProgress::new();
    let state = orchestrator.run(request, &reporter, cancel).await?;

    let json = serde_json::to_string_pretty(&state)?;
    match &out {
        Some(path) => {
            std::fs::write(path, &json)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            eprintln!("  Result written to {}", path.display());
        }
        None => println!("{json}"),
    }

    print_summary(&state);

    match state.run_status() {
        RunStatus::PlanningFailed => Err(eyre!(
            "planning failed: {}",
            state.planning_error().unwrap_or("unknown reason")
        )),
        RunStatus::Cancelled => Err(eyre!("run cancelled; partial results were kept")),
        _ => Ok(()),
    }
}

async fn cmd_plan(config: &AppConfig, seed: &str) -> Result<()> {
    // Planning needs no search credentials, so skip the full orchestrator.
    let planner = KeywordPlanner::from_config(config, text_generator(config)?);

    let plan = planner.plan(seed, &config.defaults.vertical).await?;

    for (intent, candidates) in plan.group_by_intent() {
        let keywords: Vec<_> = candidates.iter().map(|c| c.keyword.as_str()).collect();
        info!(intent, count = keywords.len(), keywords = ?keywords, "intent group");
    }
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn print_summary(state: &PipelineState) {
    let summary = state.summary();
    eprintln!();
    eprintln!("  Run:       {} ({:?})", state.run_id(), state.run_status());
    eprintln!("  Seed:      {}", state.seed_keyword());
    eprintln!(
        "  Keywords:  {} planned, {} succeeded, {} failed",
        summary.planned, summary.succeeded, summary.failed
    );
    for record in state.records_in_plan_order() {
        match &record.error {
            Some(failure) => eprintln!("    ✗ {}  {failure}", record.keyword()),
            None => {
                let score = record.analysis.as_ref().map(|a| a.score).unwrap_or_default();
                eprintln!("    ✓ {}  score {score:.1}", record.keyword());
            }
        }
    }
    if let Some(strategy) = state.strategy() {
        eprintln!();
        eprintln!("  {}", strategy.overview);
        for rec in &strategy.global_recommendations {
            eprintln!("    • {} ({} keywords)", rec.action, rec.keywords.len());
        }
    }
    eprintln!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn keyword_progress(&self, keyword: &str, status: KeywordStatus, finished: usize, total: usize) {
        self.spinner
            .set_message(format!("[{finished}/{total}] {keyword}: {status:?}"));
    }

    fn done(&self, _state: &PipelineState) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
