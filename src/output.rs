//! Output types returned by the extraction entry points, and the JSON writer.

use crate::config::DocumentMode;
use crate::error::ExtractError;
use crate::record::{ErrorRecord, ServiceRecord};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// What one document produced: records, or the reason there are none.
///
/// Serialises as `{"services": [...]}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Services(Vec<ServiceRecord>),
    Error(ErrorRecord),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Services(_))
    }

    pub fn records(&self) -> &[ServiceRecord] {
        match self {
            Outcome::Services(records) => records,
            Outcome::Error(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Outcome::Services(_) => None,
            Outcome::Error(e) => Some(e),
        }
    }

    pub fn as_result(&self) -> Result<&[ServiceRecord], &ErrorRecord> {
        match self {
            Outcome::Services(records) => Ok(records),
            Outcome::Error(e) => Err(e),
        }
    }

    pub fn into_result(self) -> Result<Vec<ServiceRecord>, ErrorRecord> {
        match self {
            Outcome::Services(records) => Ok(records),
            Outcome::Error(e) => Err(e),
        }
    }
}

impl From<Result<Vec<ServiceRecord>, ErrorRecord>> for Outcome {
    fn from(result: Result<Vec<ServiceRecord>, ErrorRecord>) -> Self {
        match result {
            Ok(records) => Outcome::Services(records),
            Err(e) => Outcome::Error(e),
        }
    }
}

/// Timing and token counts for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub mode: DocumentMode,
    /// Pages in the PDF, when pdfium opened it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Retries spent on the model call (0 when the first attempt answered).
    pub retries: u32,
    /// Input resolution + document preparation.
    pub prepare_ms: u64,
    /// Model call(s), including backoff.
    pub llm_ms: u64,
    pub total_ms: u64,
}

/// The result of extracting one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    /// Display name of the source document.
    pub source: String,
    pub outcome: Outcome,
    pub stats: ExtractionStats,
}

impl Extraction {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The consumer payload: the record array on success, the error object
    /// on failure.
    pub fn to_json_pretty(&self) -> Result<String, ExtractError> {
        let rendered = match &self.outcome {
            Outcome::Services(records) => serde_json::to_string_pretty(records),
            Outcome::Error(e) => serde_json::to_string_pretty(e),
        };
        rendered.map_err(|e| ExtractError::Internal(format!("JSON serialisation failed: {e}")))
    }
}

/// Write `contents` to `path` atomically: temp file in the same directory,
/// then rename, so readers never see a partial file.
pub fn write_json_atomic(path: &Path, contents: &str) -> Result<(), ExtractError> {
    let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    if !contents.ends_with('\n') {
        tmp.write_all(b"\n").map_err(write_err)?;
    }
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize;

    fn extraction(outcome: Outcome) -> Extraction {
        Extraction {
            source: "rates.pdf".into(),
            outcome,
            stats: ExtractionStats::default(),
        }
    }

    #[test]
    fn outcome_serialises_tagged() {
        let ok = Outcome::from(normalize(r#"{"service_name":"VIP"}"#));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["services"][0]["service_name"], "VIP");

        let err = Outcome::Error(ErrorRecord::quota_exceeded("429"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["kind"], "quota_exceeded");
        assert!(json["error"].get("raw").is_none());
    }

    #[test]
    fn consumer_payload_is_array_or_error() {
        let ok = extraction(Outcome::from(normalize(r#"{"service_name":"VIP"}"#)));
        let payload: serde_json::Value = serde_json::from_str(&ok.to_json_pretty().unwrap()).unwrap();
        assert!(payload.is_array());

        let bad = extraction(Outcome::from(normalize("nope")));
        let payload: serde_json::Value = serde_json::from_str(&bad.to_json_pretty().unwrap()).unwrap();
        assert_eq!(payload["kind"], "invalid_json");
        assert_eq!(payload["raw"], "nope");
    }

    #[test]
    fn stats_serialise_mode_lowercase() {
        let json = serde_json::to_value(ExtractionStats::default()).unwrap();
        assert_eq!(json["mode"], "native");
        assert!(json.get("page_count").is_none());
    }

    #[test]
    fn atomic_write_creates_dirs_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json_atomic(&path, "[]").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]\n");
        write_json_atomic(&path, "{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }
}
