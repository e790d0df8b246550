//! CLI binary for pdf2services.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2services::{
    extract_many, normalize, prompts, write_json_atomic, DocumentMode, DocumentResult,
    ExtractionConfig, ExtractionProgressCallback, ProgressCallback, ResponseNormalizer,
    ServiceSchema,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit status when any document produced an error record or a fatal error.
const EXIT_FAILURE: u8 = 2;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch and one log line per
/// document, printed as documents finish (possibly out of order).
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, doc_num: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&doc_num))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, doc_num: usize, _total: usize, source: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(doc_num, Instant::now());
        }
        self.bar.set_message(source.to_string());
    }

    fn on_document_complete(&self, doc_num: usize, total: usize, source: &str, services: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            doc_num,
            total,
            source,
            dim(&format!("{services} service(s)")),
            self.elapsed(doc_num),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, doc_num: usize, total: usize, source: &str, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(std::iter::once('\u{2026}')).collect()
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            doc_num,
            total,
            source,
            red(&msg),
            self.elapsed(doc_num),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} document(s) extracted", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} {}/{} document(s) extracted  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract services from one price list (JSON array on stdout)
  pdf2services rates.pdf

  # Write the result to a file
  pdf2services rates.pdf -o rates.json

  # Several documents, four at a time, full report
  pdf2services --concurrency 4 lhr.pdf cdg.pdf https://example.com/fra.pdf

  # Send extracted text instead of the PDF (models without PDF input)
  pdf2services --mode text --provider openai --model gpt-4.1-mini rates.pdf

  # Re-run normalization on a saved model reply (no API call)
  pdf2services --normalize reply.txt
  cat reply.txt | pdf2services --normalize -

DOCUMENT MODES:
  native  the PDF itself is sent to the model (default; needs a PDF-capable model)
  text    text is extracted locally with pdfium and sent in the prompt
  pages   pages are rendered to PNG with pdfium and sent as images

EXIT STATUS:
  0  every document produced services
  2  a document produced an error record, or a fatal error occurred

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_PROVIDER      Provider (gemini, openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL         Model ID
  PDFIUM_LIB_PATH         Path to libpdfium (text and pages modes)
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Extract structured airport-service records from PDF price lists.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2services",
    version,
    about = "Extract structured airport-service records from PDF price lists using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present_any = ["normalize", "print_schema", "print_prompt"])]
    inputs: Vec<String>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2SERVICES_OUTPUT")]
    output: Option<PathBuf>,

    /// How the document reaches the model.
    #[arg(long, env = "PDF2SERVICES_MODE", value_enum, default_value = "native")]
    mode: ModeArg,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// JSON schema file overriding the built-in service template.
    #[arg(long, env = "PDF2SERVICES_SCHEMA")]
    schema: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2SERVICES_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2SERVICES_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per document.
    #[arg(long, env = "PDF2SERVICES_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per document on LLM failure.
    #[arg(long, env = "PDF2SERVICES_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Number of documents processed at once.
    #[arg(short, long, env = "PDF2SERVICES_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Pages rendered in pages mode.
    #[arg(long, env = "PDF2SERVICES_MAX_PAGES", default_value_t = 20)]
    max_pages: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2SERVICES_PASSWORD")]
    password: Option<String>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2SERVICES_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2SERVICES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to libpdfium (text and pages modes).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Normalize a saved raw model reply (file path or '-' for stdin); no API call.
    #[arg(long, value_name = "PATH|-")]
    normalize: Option<String>,

    /// Print the active schema as JSON and exit.
    #[arg(long)]
    print_schema: bool,

    /// Print the system and extraction prompts and exit.
    #[arg(long)]
    print_prompt: bool,

    /// Print the full report (source, outcome, stats) even for one input.
    #[arg(long, env = "PDF2SERVICES_REPORT")]
    report: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2SERVICES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2SERVICES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2SERVICES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Native,
    Text,
    Pages,
}

impl From<ModeArg> for DocumentMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Native => DocumentMode::Native,
            ModeArg::Text => DocumentMode::Text,
            ModeArg::Pages => DocumentMode::Pages,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is shown; the
    // bar provides the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && cli.inputs.len() > 1;
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

    match run(cli, show_progress).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURE),
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Returns whether every document produced services.
async fn run(cli: Cli, show_progress: bool) -> Result<bool> {
    let schema = load_schema(cli.schema.as_deref())?;

    if cli.print_schema {
        println!(
            "{}",
            serde_json::to_string_pretty(&schema).context("Failed to serialise schema")?
        );
        return Ok(true);
    }

    if cli.print_prompt {
        println!("{}", render_prompts(&cli, &schema)?);
        return Ok(true);
    }

    if let Some(ref source) = cli.normalize {
        return normalize_saved_reply(source, schema, cli.output.as_deref());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, schema, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let results = extract_many(&cli.inputs, &config)
        .await
        .context("Extraction failed")?;

    let all_ok = results
        .iter()
        .all(|r| matches!(r, Ok(extraction) if extraction.is_success()));

    let json = if cli.inputs.len() == 1 && !cli.report {
        match results.into_iter().next() {
            Some(Ok(extraction)) => extraction.to_json_pretty()?,
            Some(Err(e)) => return Err(e).context(format!("Extraction of '{}' failed", cli.inputs[0])),
            None => "[]".to_string(),
        }
    } else {
        render_report(&cli.inputs, results)?
    };

    emit(&json, cli.output.as_deref())?;

    if !cli.quiet && !show_progress {
        eprintln!(
            "{} {}",
            if all_ok { green("✔") } else { red("✘") },
            dim(&format!("{} document(s)", cli.inputs.len()))
        );
    }

    Ok(all_ok)
}

fn load_schema(path: Option<&Path>) -> Result<ServiceSchema> {
    match path {
        Some(path) => ServiceSchema::from_path(path)
            .with_context(|| format!("Failed to load schema from {}", path.display())),
        None => Ok(ServiceSchema::canonical()),
    }
}

fn load_system_prompt(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|path| {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))
    })
    .transpose()
}

/// `--print-prompt`: the system prompt in effect, then the user prompt.
fn render_prompts(cli: &Cli, schema: &ServiceSchema) -> Result<String> {
    let system = load_system_prompt(cli.system_prompt.as_deref())?
        .unwrap_or_else(|| prompts::DEFAULT_SYSTEM_PROMPT.to_string());
    let text = (cli.mode == ModeArg::Text).then_some("<document text>");
    Ok(format!("{}\n\n{}", system, prompts::extraction_prompt(schema, text)))
}

/// `--normalize`: run the normalizer over a reply saved earlier.
fn normalize_saved_reply(source: &str, schema: ServiceSchema, output: Option<&Path>) -> Result<bool> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read reply from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read reply from {source}"))?
    };

    let result = if schema == ServiceSchema::canonical() {
        normalize(&raw)
    } else {
        ResponseNormalizer::new(Arc::new(schema)).normalize(&raw)
    };

    let (json, ok) = match &result {
        Ok(records) => (serde_json::to_string_pretty(records), true),
        Err(e) => (serde_json::to_string_pretty(e), false),
    };
    emit(&json.context("Failed to serialise result")?, output)?;
    Ok(ok)
}

/// The array of per-document reports; fatal errors become `{source, fatal}`.
fn render_report(inputs: &[String], results: Vec<DocumentResult>) -> Result<String> {
    let entries = inputs
        .iter()
        .zip(results)
        .map(|(input, result)| match result {
            Ok(extraction) => serde_json::to_value(&extraction),
            Err(e) => Ok(json!({ "source": input, "fatal": e.to_string() })),
        })
        .collect::<Result<Vec<Value>, _>>()
        .context("Failed to serialise report")?;
    serde_json::to_string_pretty(&entries).context("Failed to serialise report")
}

fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_json_atomic(path, json)?;
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(
    cli: &Cli,
    schema: ServiceSchema,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .mode(cli.mode.into())
        .schema(schema)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .max_pages(cli.max_pages)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(prompt) = load_system_prompt(cli.system_prompt.as_deref())? {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "pdf2services",
            "--mode",
            "pages",
            "--concurrency",
            "2",
            "--report",
            "a.pdf",
            "b.pdf",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["a.pdf", "b.pdf"]);
        assert_eq!(DocumentMode::from(cli.mode), DocumentMode::Pages);
        assert_eq!(cli.concurrency, 2);
        assert!(cli.report);
    }

    #[test]
    fn normalize_needs_no_inputs() {
        let cli = Cli::try_parse_from(["pdf2services", "--normalize", "-"]).unwrap();
        assert!(cli.inputs.is_empty());
        assert_eq!(cli.normalize.as_deref(), Some("-"));
    }

    #[test]
    fn inputs_required_otherwise() {
        assert!(Cli::try_parse_from(["pdf2services", "--mode", "text"]).is_err());
    }

    #[test]
    fn printed_prompt_uses_system_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.txt");
        std::fs::write(&path, "Only list lounge services.").unwrap();
        let schema = ServiceSchema::canonical();

        let cli = Cli::try_parse_from(["pdf2services", "--print-prompt"]).unwrap();
        let printed = render_prompts(&cli, &schema).unwrap();
        assert!(printed.starts_with(prompts::DEFAULT_SYSTEM_PROMPT));

        let cli = Cli::try_parse_from([
            "pdf2services",
            "--print-prompt",
            "--system-prompt",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let printed = render_prompts(&cli, &schema).unwrap();
        assert!(printed.starts_with("Only list lounge services.\n\n"));
        assert!(!printed.contains(prompts::DEFAULT_SYSTEM_PROMPT));
    }

    #[test]
    fn missing_system_prompt_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "pdf2services",
            "--print-prompt",
            "--system-prompt",
            "/definitely/not/a/prompt.txt",
        ])
        .unwrap();
        let err = render_prompts(&cli, &ServiceSchema::canonical()).unwrap_err();
        assert!(err.to_string().contains("Failed to read system prompt"));
    }

    #[test]
    fn report_marks_fatal_entries() {
        let inputs = vec!["missing.pdf".to_string()];
        let results: Vec<DocumentResult> = vec![Err(pdf2services::ExtractError::FileNotFound {
            path: "missing.pdf".into(),
        })];
        let report: Value = serde_json::from_str(&render_report(&inputs, results).unwrap()).unwrap();
        assert_eq!(report[0]["source"], "missing.pdf");
        assert!(report[0]["fatal"].as_str().unwrap().contains("not found"));
    }
}
