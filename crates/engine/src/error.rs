//! Worker failure type and its exit-code mapping.

use std::path::PathBuf;

use aftcore::{ExitCode, HasExitCode};
use protocol::SessionError;
use thiserror::Error;

/// Which protocol step a failure belongs to.
///
/// The step, not the underlying error, decides the exit code; the
/// scheduler schedules retries per step class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// TCP connect and greeting.
    Connect,
    /// USER/PASS or equivalent.
    Login,
    /// Re-login on a reused session.
    Relogin,
    /// TLS or AUTH negotiation.
    Auth,
    /// Idle-timer setup or feature negotiation.
    Feat,
    /// Selecting the transfer representation.
    Type,
    /// Changing the remote directory.
    Chdir,
    /// Listing the remote directory.
    List,
    /// Opening a remote file or envelope.
    OpenRemote,
    /// Reading from the data channel.
    ReadRemote,
    /// Writing to the data channel.
    WriteRemote,
    /// Closing the data channel.
    CloseRemote,
    /// Deleting a remote file.
    DeleteRemote,
    /// Establishing the data connection.
    Data,
}

/// Local file operation classes, for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    /// Opening or creating.
    Open,
    /// Reading.
    Read,
    /// Writing, renaming, or removing.
    Write,
}

/// Any failure that terminates a worker session.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A protocol operation failed.
    #[error("{step:?} step failed: {source}")]
    Protocol {
        /// The step that failed.
        step: Step,
        /// The client's failure.
        source: SessionError,
    },

    /// A shared status table is unusable.
    #[error(transparent)]
    Status(#[from] status::StatusError),

    /// The retrieve-list catalog is unusable.
    #[error(transparent)]
    Catalog(#[from] rlist::RlError),

    /// A log stream failed.
    #[error(transparent)]
    Log(#[from] logging::LogError),

    /// A local file operation failed.
    #[error("local {op:?} failed on {path}: {source}")]
    Local {
        /// Operation class.
        op: LocalOp,
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// A single file exceeded the transfer timeout mid-stream.
    ///
    /// The session aborts but work remains, so the scheduler re-spawns
    /// promptly instead of backing off.
    #[error("transfer stalled beyond the timeout")]
    Stalled,

    /// A termination signal arrived.
    #[error("terminated by signal")]
    Killed,

    /// The invocation itself is unusable.
    #[error("unusable configuration: {0}")]
    Config(String),
}

impl WorkerError {
    /// Wraps a protocol failure with its step.
    #[must_use]
    pub fn at(step: Step, source: SessionError) -> Self {
        Self::Protocol { step, source }
    }

    /// Convenience for local-file failures.
    #[must_use]
    pub fn local(op: LocalOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Local {
            op,
            path: path.into(),
            source,
        }
    }
}

impl HasExitCode for WorkerError {
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::Protocol { step, source } => {
                let code = match step {
                    Step::Connect => ExitCode::ConnectError,
                    Step::Login => match source.reply_code() {
                        Some(530) => ExitCode::PasswordError,
                        _ => ExitCode::UserError,
                    },
                    Step::Relogin => ExitCode::RemoteUserError,
                    Step::Auth => ExitCode::AuthError,
                    Step::Feat => ExitCode::ConnectError,
                    Step::Type => ExitCode::TypeError,
                    Step::Chdir => ExitCode::ChdirError,
                    Step::List => ExitCode::ListError,
                    Step::OpenRemote => ExitCode::OpenRemoteError,
                    Step::ReadRemote => ExitCode::ReadRemoteError,
                    Step::WriteRemote => ExitCode::WriteRemoteError,
                    Step::CloseRemote => ExitCode::CloseRemoteError,
                    Step::DeleteRemote => ExitCode::DeleteRemoteError,
                    Step::Data => ExitCode::DataError,
                };
                code.fold_timeout(source.is_timeout())
            }
            Self::Status(_) | Self::Catalog(_) | Self::Config(_) => ExitCode::Incorrect,
            Self::Log(_) => ExitCode::WriteLocalError,
            Self::Local { op, .. } => match op {
                LocalOp::Open => ExitCode::OpenLocalError,
                LocalOp::Read => ExitCode::ReadLocalError,
                LocalOp::Write => ExitCode::WriteLocalError,
            },
            Self::Stalled => ExitCode::StillFilesToSend,
            Self::Killed => ExitCode::GotKilled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn step_decides_the_exit_code() {
        let err = WorkerError::at(Step::List, SessionError::remote(500, "no"));
        assert_eq!(err.exit_code(), ExitCode::ListError);

        let err = WorkerError::at(Step::Login, SessionError::remote(530, "bad password"));
        assert_eq!(err.exit_code(), ExitCode::PasswordError);

        let err = WorkerError::at(Step::Login, SessionError::remote(332, "need account"));
        assert_eq!(err.exit_code(), ExitCode::UserError);
    }

    #[test]
    fn timeouts_fold_into_the_timeout_code() {
        let err = WorkerError::at(Step::ReadRemote, SessionError::Timeout(Duration::from_secs(20)));
        assert_eq!(err.exit_code(), ExitCode::Timeout);

        // Local failures never fold.
        let err = WorkerError::local(
            LocalOp::Open,
            "/x",
            std::io::Error::from(std::io::ErrorKind::TimedOut),
        );
        assert_eq!(err.exit_code(), ExitCode::OpenLocalError);
    }

    #[test]
    fn stalled_transfer_asks_for_prompt_respawn() {
        assert_eq!(WorkerError::Stalled.exit_code(), ExitCode::StillFilesToSend);
    }
}
