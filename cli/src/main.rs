//! unocr CLI - OCR Markdown cleaning tool
//!
//! A command-line tool for cleaning OCR-derived Markdown into LLM training text.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use unocr::{
    AnalysisService, ChapterMarkerStyle, Chunker, CleanedContent, CleaningConfiguration,
    CleaningStep, EndMarkerStyle, NormalizeOptions, NullService, Pipeline, PipelineObserver,
    RunOutcome, ServiceConfig,
};

/// Safe structural cleaning of OCR-derived Markdown
#[derive(Parser)]
#[command(
    name = "unocr",
    author = "iyulab",
    version,
    about = "Clean OCR-derived Markdown for LLM training data",
    long_about = "unocr - Safe, AI-assisted structural cleaning of OCR output.\n\n\
                  Removes front matter, tables of contents, indexes, back matter, citations,\n\
                  footnotes, and page artifacts. Every AI-suggested boundary is validated\n\
                  before anything is deleted.\n\n\
                  Set UNOCR_API_KEY (or OPENAI_API_KEY) to enable the analysis service.\n\n\
                  Usage:\n  \
                  unocr clean <file> -o <out>    Run the cleaning pipeline\n  \
                  unocr detect <file>            Show detected structure as JSON\n  \
                  unocr normalize <file>         Character-level repair only"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cleaning pipeline on a document
    Clean {
        /// Input file path ("-" for stdin)
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration preset
        #[arg(long, default_value = "default")]
        preset: Preset,

        /// JSON configuration file (overrides --preset)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the analysis service even if an API key is set
        #[arg(long)]
        offline: bool,

        /// Disable steps by number (1-16), comma separated
        #[arg(long, value_delimiter = ',')]
        skip: Vec<usize>,

        /// Chapter marker style
        #[arg(long)]
        chapter_markers: Option<MarkerMode>,

        /// End-of-document marker style
        #[arg(long)]
        end_marker: Option<EndMode>,

        /// Split paragraphs longer than this many words
        #[arg(long)]
        max_paragraph_words: Option<usize>,

        /// Write the full JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print a Markdown summary after the run
        #[arg(long)]
        summary: bool,
    },

    /// Detect structure without changing the document
    Detect {
        /// Input file path ("-" for stdin)
        input: PathBuf,

        /// Output compact JSON (no indentation)
        #[arg(long)]
        compact: bool,
    },

    /// Apply character-level normalization only
    Normalize {
        /// Input file path ("-" for stdin)
        input: PathBuf,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Normalization preset
        #[arg(long, default_value = "standard")]
        mode: NormalizeMode,
    },

    /// Split a document into service-sized chunks
    Chunk {
        /// Input file path ("-" for stdin)
        input: PathBuf,

        /// Target words per chunk
        #[arg(long, default_value = "2500")]
        target: usize,

        /// Words of trailing context carried from the previous chunk
        #[arg(long, default_value = "200")]
        overlap: usize,

        /// Output compact JSON (no indentation)
        #[arg(long)]
        compact: bool,
    },

    /// List the pipeline steps
    Steps,

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// Every step
    Default,
    /// Every step plus YAML metadata frontmatter
    Full,
    /// Steps that work without an analysis service
    Heuristic,
    /// Character repair and page artifacts only
    Minimal,
}

impl From<Preset> for CleaningConfiguration {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Default => CleaningConfiguration::default(),
            Preset::Full => CleaningConfiguration::full(),
            Preset::Heuristic => CleaningConfiguration::heuristic_only(),
            Preset::Minimal => CleaningConfiguration::minimal(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MarkerMode {
    /// No chapter markers
    None,
    /// <!-- CHAPTER n: Title -->
    Comment,
    /// ## Chapter n: Title
    Heading,
    /// [CHAPTER n: Title]
    Token,
}

#[derive(Clone, Copy, ValueEnum)]
enum EndMode {
    None,
    Comment,
    Token,
    Rule,
}

impl From<EndMode> for EndMarkerStyle {
    fn from(mode: EndMode) -> Self {
        match mode {
            EndMode::None => EndMarkerStyle::None,
            EndMode::Comment => EndMarkerStyle::HtmlComment,
            EndMode::Token => EndMarkerStyle::Token,
            EndMode::Rule => EndMarkerStyle::Rule,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum NormalizeMode {
    Minimal,
    Standard,
    Aggressive,
}

impl From<NormalizeMode> for NormalizeOptions {
    fn from(mode: NormalizeMode) -> Self {
        match mode {
            NormalizeMode::Minimal => NormalizeOptions::minimal(),
            NormalizeMode::Standard => NormalizeOptions::default(),
            NormalizeMode::Aggressive => NormalizeOptions::aggressive(),
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Clean {
            input,
            output,
            preset,
            config,
            offline,
            skip,
            chapter_markers,
            end_marker,
            max_paragraph_words,
            report,
            summary,
        } => {
            let mut configuration = match config {
                Some(path) => load_config(&path)?,
                None => preset.into(),
            };
            for number in skip {
                let step = step_by_number(number)?;
                configuration = configuration.disable(step);
            }
            if let Some(mode) = chapter_markers {
                configuration = match mode {
                    MarkerMode::None => configuration.with_chapter_segmentation(false),
                    MarkerMode::Comment => {
                        configuration.with_chapter_markers(ChapterMarkerStyle::HtmlComment)
                    }
                    MarkerMode::Heading => {
                        configuration.with_chapter_markers(ChapterMarkerStyle::Heading)
                    }
                    MarkerMode::Token => configuration.with_chapter_markers(ChapterMarkerStyle::Token),
                };
            }
            if let Some(mode) = end_marker {
                configuration = configuration.with_end_marker(mode.into());
            }
            if let Some(words) = max_paragraph_words {
                configuration = configuration.with_max_paragraph_words(words);
            }

            run_clean(
                &input,
                output.as_ref(),
                &configuration,
                offline,
                report.as_ref(),
                summary,
            )
            .await?;
        }

        Commands::Detect { input, compact } => {
            let pb = create_spinner("Detecting structure...");

            let text = read_input(&input)?;
            let patterns = unocr::detect_structure(&text, &CleaningConfiguration::default());

            pb.finish_and_clear();

            let json = if compact {
                serde_json::to_string(&patterns)?
            } else {
                serde_json::to_string_pretty(&patterns)?
            };
            write_output(None, &json)?;

            eprintln!("{}", "Detected Regions".cyan().bold());
            eprintln!("{}", "─".repeat(40));
            if patterns.regions.is_empty() {
                eprintln!("  {} none", "-".dimmed());
            }
            let total = text.lines().count();
            for (kind, hint) in &patterns.regions {
                let range = hint
                    .boundary
                    .resolve(*kind, total)
                    .map_or_else(|| "?".to_string(), |r| r.to_string());
                eprintln!(
                    "  {} {}: lines {} ({:.0}%)",
                    "•".green(),
                    kind,
                    range,
                    hint.boundary.confidence * 100.0
                );
            }
            eprintln!(
                "{}: {}",
                "Chapters".bold(),
                patterns.chapters.chapters.len()
            );
        }

        Commands::Normalize {
            input,
            output,
            mode,
        } => {
            let pb = create_spinner("Normalizing...");

            let text = read_input(&input)?;
            let normalized = unocr::async_api::normalize_text(text, mode.into()).await?;

            pb.finish_and_clear();
            write_output(output.as_ref(), &normalized)?;

            if let Some(path) = output {
                eprintln!("{} Normalized: {}", "✓".green().bold(), path.display());
            }
        }

        Commands::Chunk {
            input,
            target,
            overlap,
            compact,
        } => {
            let text = read_input(&input)?;
            let chunks = Chunker::new(target, overlap).chunk(&text);

            let json = if compact {
                serde_json::to_string(&chunks)?
            } else {
                serde_json::to_string_pretty(&chunks)?
            };
            write_output(None, &json)?;

            eprintln!(
                "{} {} chunks ({} words)",
                "✓".green().bold(),
                chunks.len(),
                chunks.iter().map(|c| c.word_count).sum::<usize>()
            );
        }

        Commands::Steps => {
            println!("{}", "Pipeline Steps".cyan().bold());
            println!("{}", "─".repeat(56));
            for step in CleaningStep::ALL {
                println!(
                    "{:>3}  {:<28} {:<22} {:?}",
                    step.number(),
                    step.label(),
                    format!("{:?}", step.phase()),
                    step.method()
                );
            }
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

async fn run_clean(
    input: &Path,
    output: Option<&PathBuf>,
    config: &CleaningConfiguration,
    offline: bool,
    report: Option<&PathBuf>,
    summary: bool,
) -> CliResult<()> {
    let text = read_input(input)?;
    let service = build_service(offline)?;

    let total = config.steps().count() as u64;
    let pb = create_progress(total);
    pb.set_message(format!("Cleaning with {}...", service.name()));

    let pipeline = Arc::new(
        Pipeline::builder()
            .service(service)
            .observer(Arc::new(ProgressObserver { bar: pb.clone() }))
            .build(),
    );

    let interrupt = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                pipeline.cancel();
            }
        })
    };

    let outcome = pipeline.run(&text, config).await;
    interrupt.abort();
    pb.finish_and_clear();

    match outcome? {
        RunOutcome::Completed(cleaned) => {
            write_output(output, &cleaned.content)?;
            if let Some(path) = report {
                fs::write(path, serde_json::to_string_pretty(&cleaned)?)?;
            }
            print_statistics(&text, &cleaned);
            if summary {
                eprintln!("\n{}", unocr::report::render_summary(&cleaned));
            }
        }
        RunOutcome::Cancelled(partial) => {
            eprintln!("{} {}", "!".yellow().bold(), unocr::report::render_partial(&partial));
            if let Some(path) = report {
                fs::write(path, serde_json::to_string_pretty(&partial)?)?;
            }
            std::process::exit(130);
        }
    }

    Ok(())
}

/// Uses the OpenAI-compatible client when credentials are present.
fn build_service(offline: bool) -> CliResult<Arc<dyn AnalysisService>> {
    let config = ServiceConfig::from_env();
    if offline || !config.has_credentials() {
        return Ok(Arc::new(NullService));
    }
    Ok(Arc::new(unocr::OpenAiCompatibleClient::new(config)?))
}

fn load_config(path: &Path) -> CliResult<CleaningConfiguration> {
    let text = fs::read_to_string(path)?;
    let config: CleaningConfiguration = serde_json::from_str(&text)?;
    unocr::pipeline::validate_configuration(&config)?;
    Ok(config)
}

fn step_by_number(number: usize) -> CliResult<CleaningStep> {
    number
        .checked_sub(1)
        .and_then(|i| CleaningStep::ALL.get(i).copied())
        .ok_or_else(|| format!("no step numbered {} (expected 1-16)", number).into())
}

fn print_statistics(original: &str, cleaned: &CleanedContent) {
    let before = original.split_whitespace().count();
    let after = cleaned.word_count();

    eprintln!("{}", "Cleaning Complete".green().bold());
    eprintln!("{}", "─".repeat(40));
    eprintln!("{}: {} → {}", "Words".bold(), before, after);
    eprintln!("{}: {}", "Steps".bold(), cleaned.steps.len());
    eprintln!(
        "{}: {} calls, {} tokens",
        "Service".bold(),
        cleaned.total_api_calls,
        cleaned.total_tokens
    );
    if let Some(confidence) = cleaned.overall_confidence {
        eprintln!("{}: {:.0}%", "Confidence".bold(), confidence * 100.0);
    }
    for removal in &cleaned.removals {
        eprintln!(
            "  {} {} ({} lines)",
            "✓".green(),
            removal.region,
            removal.lines_removed
        );
    }
    for anomaly in &cleaned.anomalies {
        eprintln!("  {} {}: {}", "!".yellow().bold(), anomaly.step, anomaly.message);
    }
}

/// Drives the progress bar from pipeline events.
struct ProgressObserver {
    bar: ProgressBar,
}

impl PipelineObserver for ProgressObserver {
    fn step_started(&self, step: CleaningStep, position: usize, _total: usize) {
        self.bar.set_position(position.saturating_sub(1) as u64);
        self.bar.set_message(step.label().to_string());
    }

    fn step_completed(&self, _report: &unocr::model::StepReport) {
        self.bar.inc(1);
    }

    fn step_failed(&self, step: CleaningStep, reason: &str) {
        self.bar
            .println(format!("{} {} failed: {}", "✗".red().bold(), step, reason));
    }

    fn progress(&self, step: CleaningStep, fraction: f64) {
        self.bar
            .set_message(format!("{} {:.0}%", step.label(), fraction * 100.0));
    }
}

fn read_input(path: &Path) -> CliResult<String> {
    if path.as_os_str() == "-" {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        return Ok(unocr::async_api::decode(&data));
    }
    Ok(unocr::async_api::decode(&fs::read(path)?))
}

fn print_version() {
    println!("{} {}", "unocr".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Safe structural cleaning of OCR-derived Markdown");
    println!();
    println!("Repository: https://github.com/iyulab/unocr");
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn create_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn write_output(path: Option<&PathBuf>, content: &str) -> io::Result<()> {
    match path {
        Some(p) => fs::write(p, content),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", content)
        }
    }
}
