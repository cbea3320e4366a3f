//! The shared error taxonomy of the protocol seam.

use std::time::Duration;
use thiserror::Error;

/// Everything a protocol operation can fail with.
///
/// The worker state machines branch on these variants: a remote reply code
/// is policy (550 on a download may trigger a remote delete), a timeout
/// folds into a distinct exit code, and local I/O aborts the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation did not complete within the transfer timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side answered with a failure reply.
    #[error("remote replied {code}: {text}")]
    Remote {
        /// Three-digit reply code.
        code: u16,
        /// The server's reply text, already trimmed.
        text: String,
    },

    /// The requested capability is not available on this client.
    #[error("not supported by this client: {0}")]
    Unsupported(&'static str),

    /// A local socket or file failed underneath the client.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Builds a remote-reply error from a raw code and text.
    #[must_use]
    pub fn remote(code: u16, text: impl Into<String>) -> Self {
        Self::Remote {
            code,
            text: text.into(),
        }
    }

    /// The remote reply code, if this is a remote failure.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure was a timeout, either directly or as timed-out
    /// local I/O.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Whether a fresh login on a reused control connection was refused.
    ///
    /// Some servers reject a second USER on the same session; the fetch
    /// worker answers by reconnecting from scratch.
    #[must_use]
    pub fn refused_relogin(&self) -> bool {
        matches!(
            self.reply_code(),
            Some(331 | 500 | 503 | 530)
        )
    }
}

/// Convenience alias used by the client traits.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
