//! CLI binary for doc2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig` / `ConversionJob`, drives a streaming run and renders
//! its events as a progress bar, SSE frames or the final document.

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc2md::emit::to_sse;
use doc2md::{
    ConversionConfig, ConversionJob, ConversionReport, FallbackPolicy, ModelConnector,
    ModelCredentials, Orchestrator, PipelineEvent, PipelineState, ProviderConnector,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress display driven by pipeline events ──────────────────────────────

/// Renders a live progress bar from [`PipelineEvent`]s.
struct EventProgress {
    bar: ProgressBar,
    /// Characters streamed so far per page.
    streamed: HashMap<usize, usize>,
}

impl EventProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Connecting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Self {
            bar,
            streamed: HashMap::new(),
        }
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Analyzing");
        self.bar.reset_eta();
    }

    fn on_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Connection { .. } => {}
            PipelineEvent::Progress(p) => {
                if p.stage == PipelineState::AnalyzingPages && p.page.is_none() {
                    if let Some(total) = p.total_pages {
                        self.activate_bar(total);
                        self.bar.println(format!(
                            "{} {}",
                            cyan("◆"),
                            bold(&format!("Analyzing {total} page(s)…"))
                        ));
                    }
                }
                self.bar.set_message(p.message.clone());
            }
            PipelineEvent::AiChunk { page, chunk } => {
                let n = self.streamed.entry(*page).or_insert(0);
                *n += chunk.chars().count();
                self.bar.set_message(format!("page {page}: {n} chars"));
            }
            PipelineEvent::PageResult {
                page,
                total_pages,
                content_length,
            } => {
                self.bar.println(format!(
                    "  {} Page {:>3}/{:<3}  {}",
                    green("✓"),
                    page,
                    total_pages,
                    dim(&format!("{content_length:>5} chars")),
                ));
                self.bar.inc(1);
            }
            PipelineEvent::PageError {
                page,
                total_pages,
                error,
            } => {
                // Truncate very long error messages to keep output tidy.
                let msg = if error.chars().count() > 80 {
                    format!("{}…", error.chars().take(79).collect::<String>())
                } else {
                    error.clone()
                };
                self.bar.println(format!(
                    "  {} Page {:>3}/{:<3}  {}",
                    red("✗"),
                    page,
                    total_pages,
                    red(&msg),
                ));
                self.bar.inc(1);
            }
            PipelineEvent::Result(report) => {
                self.bar.finish_and_clear();
                print_summary(report);
            }
            PipelineEvent::Error { .. } => self.bar.finish_and_clear(),
        }
    }
}

fn print_summary(report: &ConversionReport) {
    let total = report.pages_processed;
    let ok = report.successful_pages;
    let failed = report.failed_pages;
    if failed == 0 {
        eprintln!(
            "{} {} page(s) converted  {}",
            green("✔"),
            bold(&ok.to_string()),
            dim(&format!("{}ms", report.metadata.duration_ms))
        );
    } else {
        eprintln!(
            "{} {}/{} page(s) converted  ({} failed)",
            if failed == total { red("✘") } else { cyan("⚠") },
            bold(&ok.to_string()),
            total,
            red(&failed.to_string()),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a PDF with Azure OpenAI (stdout)
  doc2md certificate.pdf

  # Convert a slide deck to a file, four pages at a time
  doc2md --concurrency 4 deck.pptx -o deck.md

  # Raw Server-Sent-Events frames, e.g. to pipe into another service
  doc2md --stream scan.png

  # Full JSON result with per-page status
  doc2md --json report.docx > report.json

  # Any edgequake-llm provider instead of Azure (reads its own API key)
  doc2md --provider openai --deployment gpt-4o document.pdf

ENVIRONMENT VARIABLES:
  AZURE_OPENAI_ENDPOINT     https://<resource>.openai.azure.com
  AZURE_OPENAI_API_KEY      API key for the resource
  AZURE_OPENAI_DEPLOYMENT   Deployment (or model) name
  AZURE_OPENAI_API_VERSION  REST API version (default 2024-02-01)
  PDFIUM_LIB_PATH           Path to libpdfium (file or directory)
  RUST_LOG                  Overrides --verbose / --quiet

Office documents need `libreoffice` (or --office-converter) on PATH. Formats
without a renderer are sent to the model as a single placeholder page.
"#;

/// Convert documents to Markdown with a vision language model.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert PDF, Office and image documents to Markdown with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to convert.
    input: PathBuf,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Azure OpenAI endpoint URL.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT", default_value = "")]
    endpoint: String,

    /// Azure OpenAI API key.
    #[arg(long, env = "AZURE_OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Deployment (Azure) or model (other providers) name.
    #[arg(long, env = "AZURE_OPENAI_DEPLOYMENT", default_value = "")]
    deployment: String,

    /// Azure OpenAI REST API version.
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = doc2md::job::DEFAULT_API_VERSION)]
    api_version: String,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// instead of the Azure REST client.
    #[arg(long, env = "DOC2MD_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "DOC2MD_DPI", default_value_t = doc2md::job::DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages analysed at once. 1 streams model output as it arrives.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Skip the heading / bold / mail-link heuristics.
    #[arg(long, env = "DOC2MD_NO_ENHANCE")]
    no_enhance: bool,

    /// Max model output tokens per page.
    #[arg(long, env = "DOC2MD_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "DOC2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOC2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Program that converts Office documents to PDF.
    #[arg(long, env = "DOC2MD_OFFICE_CONVERTER", default_value = "libreoffice")]
    office_converter: String,

    /// Seconds before the office converter is killed.
    #[arg(long, env = "DOC2MD_CONVERTER_TIMEOUT", default_value_t = 120)]
    converter_timeout: u64,

    /// Stop instead of sending a placeholder page when rendering fails.
    #[arg(long, env = "DOC2MD_STRICT")]
    strict: bool,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// TrueType font for placeholder pages.
    #[arg(long, env = "DOC2MD_FONT")]
    font: Option<PathBuf>,

    /// Per-request model timeout in seconds.
    #[arg(long, env = "DOC2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Output the JSON result instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON", conflicts_with = "stream")]
    json: bool,

    /// Write every pipeline event to stdout as an SSE frame.
    #[arg(long)]
    stream: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.stream;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    let job = build_job(&cli);

    let mut orchestrator = Orchestrator::new(config);
    if let Some(ref provider) = cli.provider {
        let connector: Arc<dyn ModelConnector> = Arc::new(
            ProviderConnector::new(provider).with_timeout_secs(cli.api_timeout),
        );
        orchestrator = orchestrator.with_connector(connector);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let mut events = orchestrator.run_streaming(job);
    let mut progress = show_progress.then(EventProgress::new);
    let mut outcome: Option<Result<ConversionReport, String>> = None;

    let stdout = io::stdout();
    while let Some(event) = events.next().await {
        if cli.stream {
            let mut handle = stdout.lock();
            handle
                .write_all(to_sse(&event).as_bytes())
                .and_then(|_| handle.flush())
                .context("Failed to write to stdout")?;
        }
        if let Some(p) = progress.as_mut() {
            p.on_event(&event);
        }
        match event {
            PipelineEvent::Result(report) => outcome = Some(Ok(*report)),
            PipelineEvent::Error { message, .. } => outcome = Some(Err(message)),
            _ => {}
        }
    }

    let report = match outcome {
        Some(Ok(report)) => report,
        Some(Err(message)) => bail!("Conversion failed: {message}"),
        None => bail!("Conversion ended without a result"),
    };

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref path) = cli.output {
        write_atomic(path, &report.markdown)?;
        if !cli.quiet {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise result")?;
        println!("{json}");
    } else if !cli.stream && cli.output.is_none() {
        let mut handle = stdout.lock();
        handle
            .write_all(report.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure a trailing newline on stdout.
        if !report.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress && !cli.stream {
        print_summary(&report);
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .office_converter(&cli.office_converter)
        .converter_timeout_secs(cli.converter_timeout)
        .api_timeout_secs(cli.api_timeout)
        .fallback_policy(if cli.strict {
            FallbackPolicy::Fail
        } else {
            FallbackPolicy::Placeholder
        });

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library(path);
    }
    if let Some(ref path) = cli.font {
        builder = builder.placeholder_font(path);
    }

    builder.build().context("Invalid configuration")
}

fn build_job(cli: &Cli) -> ConversionJob {
    let credentials = ModelCredentials::new(&cli.endpoint, &cli.api_key, &cli.deployment)
        .with_api_version(&cli.api_version);
    ConversionJob::from_path(&cli.input)
        .with_dpi(cli.dpi)
        .with_credentials(credentials)
        .with_enhance(!cli.no_enhance)
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written document.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .context("Failed to write output")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
