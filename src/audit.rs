//! Append-only audit channels for the migration record.
//!
//! `tracing` carries operational telemetry; these files are the durable
//! record the metadata librarians review after a run. Each channel is a
//! fixed filename under the log directory, written as timestamped lines.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The audit channels a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChannel {
    /// General activity.
    Default,
    /// Error summary.
    Error,
    /// Verbose per-record detail.
    Details,
    MissingKeywords,
    MissingRights,
    MissingDegreeName,
    MissingDegreeLevel,
    FailedDownloads,
    /// Before/after field values for every embargoed record.
    Embargo,
}

impl LogChannel {
    pub fn filename(&self) -> &'static str {
        match self {
            LogChannel::Default => "default.log",
            LogChannel::Error => "error.log",
            LogChannel::Details => "details.log",
            LogChannel::MissingKeywords => "missing_keywords.log",
            LogChannel::MissingRights => "missing_rights.log",
            LogChannel::MissingDegreeName => "missing_degree_name.log",
            LogChannel::MissingDegreeLevel => "missing_degree_level.log",
            LogChannel::FailedDownloads => "failed_downloads.log",
            LogChannel::Embargo => "embargo.log",
        }
    }

    const ALL: [LogChannel; 9] = [
        LogChannel::Default,
        LogChannel::Error,
        LogChannel::Details,
        LogChannel::MissingKeywords,
        LogChannel::MissingRights,
        LogChannel::MissingDegreeName,
        LogChannel::MissingDegreeLevel,
        LogChannel::FailedDownloads,
        LogChannel::Embargo,
    ];
}

/// Append-only audit sink rooted at a log directory.
///
/// A failed write is a run-level failure: if the audit trail cannot be
/// recorded the migration must not continue.
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_dir: PathBuf,
}

impl AuditLog {
    /// Create the sink, ensuring the log directory exists.
    pub fn new(log_dir: impl Into<PathBuf>) -> std::io::Result<AuditLog> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;
        Ok(AuditLog { log_dir })
    }

    /// Truncate every channel, clearing the previous run's record.
    pub fn clear(&self) -> std::io::Result<()> {
        for channel in LogChannel::ALL {
            File::create(self.log_dir.join(channel.filename()))?;
        }
        Ok(())
    }

    /// Append one timestamped line to a channel.
    pub fn write(&self, channel: LogChannel, message: &str) -> std::io::Result<()> {
        let path = self.log_dir.join(channel.filename());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        writeln!(file, "{}: {}", stamp, message)?;
        Ok(())
    }

    /// Read back a channel's contents. Used by reporting and tests.
    pub fn read(&self, channel: LogChannel) -> std::io::Result<String> {
        let path = self.log_dir.join(channel.filename());
        if path.exists() {
            fs::read_to_string(path)
        } else {
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_appends_timestamped_lines() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path()).unwrap();
        audit.write(LogChannel::Default, "first").unwrap();
        audit.write(LogChannel::Default, "second").unwrap();

        let contents = audit.read(LogChannel::Default).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": first"));
        assert!(lines[1].ends_with(": second"));
    }

    #[test]
    fn channels_do_not_interleave() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path()).unwrap();
        audit.write(LogChannel::Error, "bad record").unwrap();

        assert!(audit.read(LogChannel::Error).unwrap().contains("bad record"));
        assert!(audit.read(LogChannel::Details).unwrap().is_empty());
    }

    #[test]
    fn clear_truncates_all_channels() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path()).unwrap();
        audit.write(LogChannel::Embargo, "stale").unwrap();
        audit.clear().unwrap();
        assert!(audit.read(LogChannel::Embargo).unwrap().is_empty());
    }
}
