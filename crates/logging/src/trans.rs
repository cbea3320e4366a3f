//! Severity-signed transfer-log lines.

use chrono::{DateTime, Local};

use crate::Result;
use crate::sink::FifoSink;

/// Severity sign of a transfer-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Session progress worth keeping.
    Info,
    /// Recoverable oddity, session continues.
    Warn,
    /// Session failure.
    Error,
    /// Developer-level detail.
    Debug,
    /// The host is administratively offline; failures are expected.
    Offline,
}

impl Sign {
    fn symbol(self) -> char {
        match self {
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Debug => 'D',
            Self::Offline => 'O',
        }
    }
}

/// Formats one line the way the collector expects it.
///
/// `reply` carries the server's last response when the line reports a
/// protocol failure. Debug builds append the source location.
#[must_use]
pub fn format_line(
    at: DateTime<Local>,
    sign: Sign,
    host_alias: &str,
    job_no: u8,
    message: &str,
    reply: Option<&str>,
    location: (&str, u32),
) -> String {
    let mut line = format!(
        "{} <{}> {}[{}]: {}",
        at.format("%m/%d %H:%M:%S"),
        sign.symbol(),
        host_alias,
        job_no,
        message
    );
    if let Some(reply) = reply {
        line.push_str(" | ");
        line.push_str(reply.trim_end());
    }
    if cfg!(debug_assertions) {
        line.push_str(&format!(" ({}:{})", location.0, location.1));
    }
    line.push('\n');
    line
}

/// The transfer log of one worker session.
#[derive(Debug)]
pub struct TransLog {
    sink: FifoSink,
    host_alias: String,
    job_no: u8,
}

impl TransLog {
    /// Wraps an open sink for `host_alias` and worker slot `job_no`.
    #[must_use]
    pub fn new(sink: FifoSink, host_alias: impl Into<String>, job_no: u8) -> Self {
        Self {
            sink,
            host_alias: host_alias.into(),
            job_no,
        }
    }

    /// Appends one line and mirrors it onto the diagnostic stream.
    pub fn log(&mut self, sign: Sign, message: &str, reply: Option<&str>) -> Result<()> {
        match sign {
            Sign::Error => tracing::error!(host = %self.host_alias, "{message}"),
            Sign::Warn => tracing::warn!(host = %self.host_alias, "{message}"),
            Sign::Info | Sign::Offline => tracing::info!(host = %self.host_alias, "{message}"),
            Sign::Debug => tracing::debug!(host = %self.host_alias, "{message}"),
        }
        let line = format_line(
            Local::now(),
            sign,
            &self.host_alias,
            self.job_no,
            message,
            reply,
            (file!(), line!()),
        );
        self.sink.write_record(line.as_bytes())
    }
}
