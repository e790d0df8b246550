//! Pipeline tests with a scripted generator.
//!
//! Native mode never binds pdfium, so these run anywhere: the "PDFs" are a
//! few bytes starting with `%PDF`, and the generator answers from the bytes it
//! receives, which lets the tests check what reached the model.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use pdf2services::{
    extract, extract_document, extract_from_bytes, extract_many, extract_stream, extract_sync,
    extract_to_file, CallFailure, DocumentMode, ErrorKind, ExtractError, ExtractionConfig,
    ExtractionProgressCallback, Generation, GenerationRequest, Generator, PreparedDocument,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies with one service named after the document's trailing line.
///
/// Documents whose label starts with `quota` fail with a 429, `prose` gets a
/// refusal, and `slow` is delayed so it finishes last.
struct EchoGenerator {
    calls: AtomicUsize,
}

impl EchoGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

fn label_of(request: &GenerationRequest) -> String {
    let part = request.attachments.first().expect("native mode attaches the PDF");
    assert_eq!(part.mime_type, "application/pdf");
    let bytes = STANDARD.decode(&part.data_base64).expect("valid base64");
    String::from_utf8_lossy(&bytes)
        .lines()
        .last()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, CallFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = label_of(request);
        if label.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        if label.starts_with("quota") {
            return Err(CallFailure::new(Some(429), "Resource has been exhausted"));
        }
        let text = if label.starts_with("prose") {
            "Sorry, I cannot process this.".to_string()
        } else {
            format!("```json\n[{{\"service_name\": \"{label}\", \"pricing\": {{\"1_pax\": {{\"adults\": 475}}}}}}]\n```")
        };
        Ok(Generation {
            text,
            input_tokens: 1200,
            output_tokens: 300,
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

fn config_with(generator: Arc<EchoGenerator>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .generator(generator)
        .max_retries(0)
        .retry_backoff_ms(1)
        .concurrency(3)
        .build()
        .unwrap()
}

fn write_pdf(dir: &Path, name: &str, label: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.4\n{label}\n")).unwrap();
    path
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

// ── Single document ──────────────────────────────────────────────────────────

#[tokio::test]
async fn single_file_yields_completed_services() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "lhr.pdf", "Heathrow VIP");
    let generator = EchoGenerator::new();

    let extraction = extract(path_str(&pdf), &config_with(generator.clone()))
        .await
        .unwrap();

    assert!(extraction.is_success());
    let records = extraction.outcome.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].service_name(), Some("Heathrow VIP"));
    assert_eq!(records[0].pricing().len(), 10);
    assert_eq!(records[0].tier_price("1_pax").unwrap().adults, Some(475.0));
    assert_eq!(records[0].tier_price("1_pax").unwrap().children, None);

    assert_eq!(extraction.stats.mode, DocumentMode::Native);
    assert_eq!(extraction.stats.input_tokens, 1200);
    assert_eq!(extraction.stats.retries, 0);
    assert!(extraction.stats.total_ms >= extraction.stats.llm_ms);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bytes_input_uses_given_name() {
    let generator = EchoGenerator::new();
    let extraction = extract_from_bytes(
        b"%PDF-1.7\nCDG Transfer\n".to_vec(),
        "cdg.pdf",
        &config_with(generator),
    )
    .await
    .unwrap();
    assert_eq!(extraction.source, "cdg.pdf");
    assert_eq!(extraction.outcome.records()[0].service_name(), Some("CDG Transfer"));
}

#[tokio::test]
async fn refusal_is_an_outcome_not_a_fatal_error() {
    let generator = EchoGenerator::new();
    let extraction = extract_from_bytes(b"%PDF-1.4\nprose\n".to_vec(), "x.pdf", &config_with(generator))
        .await
        .unwrap();
    let err = extraction.outcome.error().unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidJson);
    assert_eq!(err.raw.as_deref(), Some("Sorry, I cannot process this."));
}

#[tokio::test]
async fn quota_failure_is_retried_then_classified() {
    let generator = EchoGenerator::new();
    let config = ExtractionConfig::builder()
        .generator(generator.clone())
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let extraction = extract_from_bytes(b"%PDF-1.4\nquota\n".to_vec(), "x.pdf", &config)
        .await
        .unwrap();
    assert_eq!(extraction.outcome.error().unwrap().kind, ErrorKind::QuotaExceeded);
    assert_eq!(extraction.stats.retries, 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn not_a_pdf_is_fatal_and_skips_the_model() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "just text").unwrap();
    let generator = EchoGenerator::new();

    let err = extract(path_str(&path), &config_with(generator.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::NotAPdf { .. }), "got {err:?}");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extract_to_file_writes_consumer_payload() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "fra.pdf", "Frankfurt Lounge");
    let out = dir.path().join("out").join("fra.json");

    extract_to_file(path_str(&pdf), &out, &config_with(EchoGenerator::new()))
        .await
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(written.is_array());
    assert_eq!(written[0]["service_name"], "Frankfurt Lounge");
    assert_eq!(written[0]["pricing"]["10_pax"]["adults"], serde_json::Value::Null);
}

#[test]
fn sync_wrapper_runs_outside_a_runtime() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "mad.pdf", "Madrid Fast Track");
    let extraction = extract_sync(path_str(&pdf), &config_with(EchoGenerator::new())).unwrap();
    assert_eq!(
        extraction.outcome.records()[0].service_name(),
        Some("Madrid Fast Track")
    );
}

/// Answers text-mode prompts; checks the document text was inlined.
struct TextGenerator;

#[async_trait]
impl Generator for TextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, CallFailure> {
        assert!(request.attachments.is_empty());
        assert!(request.prompt.contains("Arrival meet & greet 475 EUR"));
        Ok(Generation {
            text: r#"{"service_name": "Arrival meet & greet", "travel_type": "Arrival"}"#.into(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

#[test]
fn prepared_text_document_is_inlined_in_the_prompt() {
    let document = PreparedDocument::from_text("menu.pdf", "Arrival meet & greet 475 EUR");
    let config = ExtractionConfig::default();
    let extraction = tokio_test::block_on(extract_document(&TextGenerator, &document, &config));

    assert_eq!(extraction.source, "menu.pdf");
    assert_eq!(extraction.stats.mode, DocumentMode::Text);
    assert_eq!(extraction.stats.prepare_ms, 0);
    let record = &extraction.outcome.records()[0];
    assert_eq!(record.travel_type(), Some("Arrival"));
    assert_eq!(record.pricing().len(), 10);
}

// ── Batches ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_batch_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }

    fn on_document_complete(&self, doc_num: usize, _total: usize, _source: &str, services: usize) {
        self.events.lock().unwrap().push(format!("ok {doc_num} {services}"));
    }

    fn on_document_error(&self, doc_num: usize, _total: usize, _source: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("err {doc_num}"));
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.events.lock().unwrap().push(format!("done {success_count}/{total}"));
    }
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        path_str(&write_pdf(dir.path(), "a.pdf", "slow Arrival")),
        path_str(&dir.path().join("missing.pdf")),
        path_str(&write_pdf(dir.path(), "c.pdf", "quota")),
        path_str(&write_pdf(dir.path(), "d.pdf", "Departure")),
    ];
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .generator(EchoGenerator::new())
        .max_retries(0)
        .concurrency(4)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let results = extract_many(&inputs, &config).await.unwrap();
    assert_eq!(results.len(), 4);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.outcome.records()[0].service_name(), Some("slow Arrival"));
    assert!(matches!(results[1], Err(ExtractError::FileNotFound { .. })));
    assert_eq!(
        results[2].as_ref().unwrap().outcome.error().unwrap().kind,
        ErrorKind::QuotaExceeded
    );
    assert_eq!(
        results[3].as_ref().unwrap().outcome.records()[0].service_name(),
        Some("Departure")
    );

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start 4"));
    assert_eq!(events.last().map(String::as_str), Some("done 2/4"));
    for expected in ["ok 1 1", "err 2", "err 3", "ok 4 1"] {
        assert!(events.iter().any(|e| e == expected), "missing {expected} in {events:?}");
    }
}

#[tokio::test]
async fn stream_yields_every_input_once() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        path_str(&write_pdf(dir.path(), "a.pdf", "slow One")),
        path_str(&write_pdf(dir.path(), "b.pdf", "Two")),
        path_str(&write_pdf(dir.path(), "c.pdf", "Three")),
    ];

    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .generator(EchoGenerator::new())
        .max_retries(0)
        .concurrency(3)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let stream = extract_stream(inputs, &config).unwrap();
    let mut items: Vec<(usize, String)> = stream
        .map(|(idx, result)| {
            let name = result.unwrap().outcome.records()[0]
                .service_name()
                .unwrap()
                .to_string();
            (idx, name)
        })
        .collect()
        .await;

    // The slow document finishes last.
    assert_eq!(items.last().map(|(idx, _)| *idx), Some(0));

    items.sort();
    assert_eq!(
        items,
        vec![(0, "slow One".into()), (1, "Two".into()), (2, "Three".into())]
    );

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start 3"));
    assert_eq!(events.last().map(String::as_str), Some("done 3/3"));
    assert_eq!(events.len(), 5, "{events:?}");
}

#[tokio::test]
async fn empty_batch_is_fine() {
    let inputs: Vec<String> = Vec::new();
    let results = extract_many(&inputs, &config_with(EchoGenerator::new()))
        .await
        .unwrap();
    assert!(results.is_empty());
}
