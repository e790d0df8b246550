//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! Documents stay in memory: native mode base64-encodes the bytes and pdfium
//! loads them from a byte slice. The PDF magic bytes (`%PDF`) are checked
//! here, before pdfium or the provider ever see the data.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF loaded into memory together with a display name.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// File name (local path or last URL segment), used in logs and output.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
///
/// If the input is a URL, download it. Otherwise read the local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Wrap in-memory bytes, validating the PDF magic.
pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Result<ResolvedInput, ExtractError> {
    let name = name.into();
    check_magic(&bytes, &name)?;
    Ok(ResolvedInput { name, bytes })
}

async fn read_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(_) if path.is_dir() => {
            return Err(ExtractError::InvalidInput {
                input: path.display().to_string(),
            });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound {
                path: PathBuf::from(path),
            });
        }
    };

    let resolved = from_bytes(bytes, path.display().to_string())?;
    debug!("Read local PDF: {} ({} bytes)", resolved.name, resolved.bytes.len());
    Ok(resolved)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let parsed = reqwest::Url::parse(url).map_err(|_| ExtractError::InvalidInput {
        input: url.to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_transport = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(parsed.clone()).send().await.map_err(map_transport)?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_transport)?;
    let resolved = from_bytes(bytes.to_vec(), filename_from_url(&parsed))?;
    info!("Downloaded {} ({} bytes)", resolved.name, resolved.bytes.len());
    Ok(resolved)
}

/// Last non-empty path segment, or `downloaded.pdf`.
fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

fn check_magic(bytes: &[u8], name: &str) -> Result<(), ExtractError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(ExtractError::NotAPdf {
            source_name: name.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        let url = reqwest::Url::parse("https://example.com/rates/lhr-2025.pdf").unwrap();
        assert_eq!(filename_from_url(&url), "lhr-2025.pdf");
        let url = reqwest::Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_from_url(&url), "downloaded.pdf");
    }

    #[test]
    fn test_from_bytes_checks_magic() {
        assert!(from_bytes(b"%PDF-1.7\n".to_vec(), "ok.pdf").is_ok());
        match from_bytes(b"PK\x03\x04".to_vec(), "x.docx") {
            Err(ExtractError::NotAPdf { source_name, magic }) => {
                assert_eq!(source_name, "x.docx");
                assert_eq!(magic, b"PK\x03\x04");
            }
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(matches!(
            from_bytes(Vec::new(), "empty.pdf"),
            Err(ExtractError::NotAPdf { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_file_roundtrip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert!(resolved.bytes.starts_with(b"%PDF"));
        assert!(resolved.name.ends_with(&*tmp.path().file_name().unwrap().to_string_lossy()));
    }

    #[tokio::test]
    async fn test_blank_input_rejected() {
        assert!(matches!(
            resolve_input("   ", 5).await,
            Err(ExtractError::InvalidInput { .. })
        ));
    }
}
