//! CLI binary for pdf2records.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2records::table::{TableLayout, DEFAULT_MAX_COLUMN_WIDTH};
use pdf2records::{
    extract, store, write_records_json, DocumentMode, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner whose message follows the pipeline
/// stage, plus one log line per retry.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_retry(&self, operation: &str, attempt: u32, max_retries: u32, error: &str) {
        // Keep retry lines to one terminal row.
        let msg: String = if error.chars().count() > 80 {
            let mut cut: String = error.chars().take(79).collect();
            cut.push('\u{2026}');
            cut
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {} retry {}/{}  {}",
            cyan("↻"),
            operation,
            attempt,
            max_retries,
            dim(&msg),
        ));
    }

    fn on_complete(&self, records: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} records extracted",
            green("✔"),
            bold(&records.to_string())
        );
    }

    fn on_error(&self, _error: &str) {
        // The banner in `main` reports the error itself.
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print a table of line items
  pdf2records po.pdf "List every line item with style number, colour and quantity"

  # Save the records as JSON
  pdf2records po.pdf "Style, colour and quantity per line" -o lines.json

  # Append the records to a SQLite table
  pdf2records po.pdf "Style, colour and quantity per line" --sqlite po.db --table po_data

  # Read the PDF from a URL and send it inline instead of via the Files API
  pdf2records https://example.com/invoice.pdf "Invoice number and total" --inline

  # Records as a JSON array on stdout
  pdf2records --json po.pdf "Buyer and delivery date" > out.json

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (also read from .env)
  ANTHROPIC_BASE_URL      Override the API endpoint
  PDF2RECORDS_MODEL       Override model ID
  RUST_LOG                Override log filter (e.g. pdf2records=debug)
"#;

/// Ask an LLM a question about a PDF and print the answer as a table.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2records",
    version,
    about = "Ask an LLM a question about a PDF and print the answer as a table",
    long_about = "Send a PDF (local file or URL) and a plain-language question to the \
Anthropic document API, parse the JSON array in the reply into records, and print them \
as a table, a JSON array, or rows in a SQLite table.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// What to extract, in plain language.
    question: String,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API endpoint (without /v1).
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    base_url: Option<String>,

    /// Model ID.
    #[arg(long, env = "PDF2RECORDS_MODEL")]
    model: Option<String>,

    /// Max tokens the model may generate.
    #[arg(long, env = "PDF2RECORDS_MAX_TOKENS", default_value_t = 20_000)]
    max_tokens: u32,

    /// Sampling temperature (0.0–1.0). API default when omitted.
    #[arg(long, env = "PDF2RECORDS_TEMPERATURE")]
    temperature: Option<f32>,

    /// Retries per API call on transient failures.
    #[arg(long, env = "PDF2RECORDS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-API-call timeout in seconds.
    #[arg(long, env = "PDF2RECORDS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "PDF2RECORDS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Send the PDF inline as base64 instead of uploading it first.
    #[arg(long)]
    inline: bool,

    /// Path to a text file with a custom prompt template containing {question}.
    #[arg(long, env = "PDF2RECORDS_PROMPT_TEMPLATE")]
    prompt_template: Option<PathBuf>,

    /// Succeed with no output when the model returns an empty array.
    #[arg(long)]
    allow_empty: bool,

    /// Print the records as a JSON array instead of a table.
    #[arg(long)]
    json: bool,

    /// Also write the records as a JSON array to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Insert the records into this SQLite database.
    #[arg(long, env = "PDF2RECORDS_SQLITE")]
    sqlite: Option<PathBuf>,

    /// Table name used with --sqlite.
    #[arg(long, default_value = "po_data")]
    table: String,

    /// Widest a table column may get before cells are truncated.
    #[arg(long, default_value_t = DEFAULT_MAX_COLUMN_WIDTH)]
    max_width: usize,

    /// Disable the spinner.
    #[arg(long, env = "PDF2RECORDS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2RECORDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the result and errors.
    #[arg(short, long, env = "PDF2RECORDS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", red("✗"), bold(&format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let mut config = build_config(cli).await?;
    // Spinner only once the configuration is known to be good.
    if show_progress {
        config.progress_callback =
            Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.input, &cli.question, &config)
        .await
        .context("Extraction failed")?;

    write_outputs(cli, &output)?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Send the records to every sink: SQLite, then the JSON file, then stdout.
///
/// Table and column names are checked before anything is written, so a
/// result SQLite cannot take produces no output at all.
fn write_outputs(cli: &Cli, output: &ExtractionOutput) -> Result<()> {
    let store_records = cli.sqlite.is_some() && !output.records.is_empty();
    if store_records {
        store::check_identifiers(&cli.table, &output.records)
            .with_context(|| format!("Cannot store records in table '{}'", cli.table))?;
    }

    if let Some(ref path) = cli.sqlite {
        if store_records {
            let mut conn = store::open(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            let rows = store::write_records(&mut conn, &cli.table, &output.records)
                .with_context(|| format!("Failed to store records in table '{}'", cli.table))?;
            if !cli.quiet {
                eprintln!(
                    "{} {} rows → {}:{}",
                    green("✔"),
                    rows,
                    bold(&path.display().to_string()),
                    cli.table
                );
            }
        } else if !cli.quiet {
            eprintln!("{} no records to store", cyan("⚠"));
        }
    }

    if let Some(ref path) = cli.output {
        write_records_json(output, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    print_records(cli, output)
}

/// Write the records to stdout as JSON or as a text table.
fn print_records(cli: &Cli, output: &ExtractionOutput) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.records).context("Failed to serialise records")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
        return Ok(());
    }

    if output.records.is_empty() {
        if !cli.quiet {
            eprintln!("{}", dim("(no records)"));
        }
        return Ok(());
    }

    let table = TableLayout::from_result(&output.records)?.render_text(cli.max_width);
    handle
        .write_all(table.as_bytes())
        .context("Failed to write to stdout")?;
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .require_records(!cli.allow_empty)
        .document_mode(if cli.inline {
            DocumentMode::Inline
        } else {
            DocumentMode::FilesApi
        });

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref path) = cli.prompt_template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        builder = builder.prompt_template(template);
    }
    builder.build().context("Invalid configuration")
}
