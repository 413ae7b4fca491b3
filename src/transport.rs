//! Transport collaborator: fetching associated files from the source host.
//!
//! The core only needs "give me this remote file at this local path, or
//! tell me it failed". The trait keeps the SFTP plumbing out of the
//! normalizer and lets tests substitute a mock. A failed fetch is retried
//! exactly once with an alternate filename-escaping strategy; a second
//! failure is non-fatal and the record continues without the file.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::audit::{AuditLog, LogChannel};

/// Where associated files live on the source host.
const REMOTE_DOCUMENT_ROOT: &str = "/opt/eprints3/archives/pittir/documents/disk0/00";

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches one remote file to a local path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<(), TransportError>;
}

/// Outcome of a single file acquisition. A skip carries the reason for the
/// audit trail but never aborts the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(String),
    Skipped(String),
}

/// The pieces of a source file URL needed to locate it on disk at the
/// source host.
#[derive(Debug, PartialEq, Eq)]
struct FileLocation {
    eprint_id: String,
    remote_dir: String,
    file_name: String,
}

/// Parse a `d-scholarship` file URL into its on-host location.
///
/// URLs look like `http(s)://d-scholarship.pitt.edu/<eprint>/<file>/<name>`.
/// The eprint id is zero-filled to six digits and split into three two-digit
/// path segments; the file id is zero-filled to two.
fn parse_file_url(url: &str) -> Option<FileLocation> {
    // A mix of http and https appears in the data.
    let prefix = Regex::new(r"^https?://d-scholarship\.pitt\.edu/").expect("static pattern");
    let leading_digits = Regex::new(r"^\d+").expect("static pattern");

    let file_path = prefix.replace(url, "");
    let eprint_id = leading_digits.find(&file_path)?.as_str().to_string();

    let mut id_path = format!("{:0>6}", eprint_id);
    id_path.insert(2, '/');
    id_path.insert(5, '/');

    let after_eprint = file_path
        .strip_prefix(eprint_id.as_str())?
        .strip_prefix('/')?;
    let file_id = leading_digits.find(after_eprint)?.as_str();
    let file_name = after_eprint
        .strip_prefix(file_id)?
        .strip_prefix('/')?
        .to_string();
    if file_name.is_empty() {
        return None;
    }

    let remote_dir = format!("{}/{}/{:0>2}", REMOTE_DOCUMENT_ROOT, id_path, file_id);
    Some(FileLocation {
        eprint_id,
        remote_dir,
        file_name,
    })
}

/// Minimal percent-decoding for mangled filenames (`%20` and friends).
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Fetch one associated file, returning the destination filename on success.
///
/// The destination name is `<eprint-id>_<decoded-name>` with spaces replaced
/// by underscores and `=` replaced by `eq` (one specific ETD has equals
/// signs in its filenames and the transfer tooling chokes on them). The
/// first attempt uses the raw file name; the single retry percent-decodes it
/// and escapes `=` instead.
pub async fn download_file<T: Transport + ?Sized>(
    transport: &T,
    url: &str,
    working_files_dir: &Path,
    audit: &AuditLog,
) -> std::io::Result<DownloadOutcome> {
    let Some(location) = parse_file_url(url) else {
        warn!(url = %url, "File URL did not match the expected source layout");
        audit.write(
            LogChannel::FailedDownloads,
            &format!("Unparseable file URL: {}", url),
        )?;
        return Ok(DownloadOutcome::Skipped(format!("unparseable URL: {url}")));
    };

    let mut destination_id = format!(
        "{}_{}",
        location.eprint_id,
        percent_decode(&location.file_name)
    );
    destination_id = destination_id.replace(' ', "_").replace('=', "eq");
    let local_path: PathBuf = working_files_dir.join(&destination_id);

    info!(file = %location.file_name, destination = %destination_id, "Fetching associated file");
    audit.write(
        LogChannel::Details,
        &format!(
            "Associated File: {} -> {}",
            location.file_name, destination_id
        ),
    )?;

    let remote = format!("{}/{}", location.remote_dir, location.file_name);
    if transport.fetch(&remote, &local_path).await.is_ok() {
        return Ok(DownloadOutcome::Downloaded(destination_id));
    }

    // Retry once with the alternate escaping strategy.
    let alternate_name = percent_decode(&location.file_name).replace('=', "\\=");
    let alternate_remote = format!("{}/{}", location.remote_dir, alternate_name);
    debug!(remote = %alternate_remote, "First fetch failed, retrying with alternate escaping");
    match transport.fetch(&alternate_remote, &local_path).await {
        Ok(()) => Ok(DownloadOutcome::Downloaded(destination_id)),
        Err(e) => {
            warn!(error = ?e, remote = %alternate_remote, "File download failed after retry");
            audit.write(
                LogChannel::FailedDownloads,
                &format!("Download failed: {}", alternate_remote),
            )?;
            Ok(DownloadOutcome::Skipped(format!(
                "download failed: {}",
                location.file_name
            )))
        }
    }
}

/// Production transport: copies files off the source host with `scp`.
pub struct ScpTransport {
    source_host: String,
}

impl ScpTransport {
    pub fn new(source_host: impl Into<String>) -> ScpTransport {
        ScpTransport {
            source_host: source_host.into(),
        }
    }
}

#[async_trait]
impl Transport for ScpTransport {
    async fn fetch(&self, remote_path: &str, local_path: &Path) -> Result<(), TransportError> {
        let status = Command::new("scp")
            .arg("-q")
            .arg(format!("{}:{}", self.source_host, remote_path))
            .arg(local_path)
            .status()
            .map_err(|e| -> TransportError { format!("failed to launch scp: {e}").into() })?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("scp exited with {status} for {remote_path}").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_the_mixed_http_and_https_url_forms() {
        for url in [
            "http://d-scholarship.pitt.edu/10172/1/thesis final.pdf",
            "https://d-scholarship.pitt.edu/10172/1/thesis final.pdf",
        ] {
            let location = parse_file_url(url).unwrap();
            assert_eq!(location.eprint_id, "10172");
            assert_eq!(
                location.remote_dir,
                "/opt/eprints3/archives/pittir/documents/disk0/00/01/01/72/01"
            );
            assert_eq!(location.file_name, "thesis final.pdf");
        }
    }

    #[test]
    fn unrelated_urls_do_not_parse() {
        assert!(parse_file_url("https://example.com/10172/1/x.pdf").is_none());
        assert!(parse_file_url("https://d-scholarship.pitt.edu/not-digits").is_none());
    }

    #[test]
    fn percent_decode_handles_spaces_and_passthrough() {
        assert_eq!(percent_decode("a%20b.pdf"), "a b.pdf");
        assert_eq!(percent_decode("plain.pdf"), "plain.pdf");
        assert_eq!(percent_decode("bad%zz"), "bad%zz");
    }

    #[tokio::test]
    async fn successful_fetch_returns_destination_name() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("logs")).unwrap();

        let mut transport = MockTransport::new();
        transport.expect_fetch().times(1).returning(|_, _| Ok(()));

        let outcome = download_file(
            &transport,
            "https://d-scholarship.pitt.edu/10172/1/thesis final.pdf",
            dir.path(),
            &audit,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded("10172_thesis_final.pdf".to_string())
        );
    }

    #[tokio::test]
    async fn failed_fetch_retries_once_then_skips() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("logs")).unwrap();

        let mut transport = MockTransport::new();
        // Exactly two attempts: the original name, then the alternate escaping.
        transport
            .expect_fetch()
            .times(2)
            .returning(|_, _| Err("connection reset".into()));

        let outcome = download_file(
            &transport,
            "https://d-scholarship.pitt.edu/99/2/data=set.csv",
            dir.path(),
            &audit,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, DownloadOutcome::Skipped(_)));

        let failed = audit.read(LogChannel::FailedDownloads).unwrap();
        assert!(failed.contains("Download failed"));
        // The retry escapes '=' rather than substituting it.
        assert!(failed.contains("data\\=set.csv"));
    }

    #[tokio::test]
    async fn retry_succeeding_still_counts_as_downloaded() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("logs")).unwrap();

        let mut transport = MockTransport::new();
        let mut calls = 0;
        transport.expect_fetch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err("transient".into())
            } else {
                Ok(())
            }
        });

        let outcome = download_file(
            &transport,
            "https://d-scholarship.pitt.edu/7/1/report.pdf",
            dir.path(),
            &audit,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            DownloadOutcome::Downloaded("7_report.pdf".to_string())
        );
    }
}
