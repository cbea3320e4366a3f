//! The exit-code contract between workers and the scheduler.
//!
//! A worker's process exit code is the only error channel the scheduler
//! acts on: it decides retry, backoff, and error-queue placement from this
//! value alone. The codes are therefore frozen; changing a value changes
//! scheduler behaviour for every installed system.

use std::fmt;

/// Exit codes a transfer worker can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// The session completed; nothing is left to do.
    TransferSuccess = 0,
    /// The session ended early with work left in the queue; the scheduler
    /// should re-spawn promptly.
    StillFilesToSend = 1,
    /// TCP connect or greeting failed.
    ConnectError = 2,
    /// The server rejected the user name.
    UserError = 3,
    /// The server rejected the password.
    PasswordError = 4,
    /// Selecting the transfer representation failed.
    TypeError = 5,
    /// Changing into the remote directory failed.
    ChdirError = 6,
    /// The listing command failed.
    ListError = 7,
    /// Opening a remote file for download failed.
    OpenRemoteError = 8,
    /// Reading from the data channel failed.
    ReadRemoteError = 9,
    /// Writing to the data channel failed.
    WriteRemoteError = 10,
    /// Closing the data channel failed.
    CloseRemoteError = 11,
    /// Deleting a remote file failed.
    DeleteRemoteError = 12,
    /// Opening a local file failed.
    OpenLocalError = 13,
    /// Reading a local file failed.
    ReadLocalError = 14,
    /// Writing a local file failed.
    WriteLocalError = 15,
    /// Memory or mapping allocation failed.
    AllocError = 16,
    /// TLS or AUTH negotiation failed.
    AuthError = 17,
    /// The data connection could not be established.
    DataError = 18,
    /// The server refused a re-login on a reused session.
    RemoteUserError = 19,
    /// Configuration or shared-table state is unusable.
    Incorrect = 21,
    /// Terminated by signal.
    GotKilled = 30,
    /// A protocol step timed out; folded from the step's own code by
    /// [`ExitCode::fold_timeout`].
    Timeout = 40,
}

impl ExitCode {
    /// The numeric process exit code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Human-readable description used in transfer-log lines.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::TransferSuccess => "success",
            Self::StillFilesToSend => "files remain after session",
            Self::ConnectError => "connect failed",
            Self::UserError => "user rejected",
            Self::PasswordError => "password rejected",
            Self::TypeError => "transfer type rejected",
            Self::ChdirError => "remote chdir failed",
            Self::ListError => "listing failed",
            Self::OpenRemoteError => "remote open failed",
            Self::ReadRemoteError => "remote read failed",
            Self::WriteRemoteError => "remote write failed",
            Self::CloseRemoteError => "remote close failed",
            Self::DeleteRemoteError => "remote delete failed",
            Self::OpenLocalError => "local open failed",
            Self::ReadLocalError => "local read failed",
            Self::WriteLocalError => "local write failed",
            Self::AllocError => "allocation failed",
            Self::AuthError => "authentication failed",
            Self::DataError => "data connection failed",
            Self::RemoteUserError => "re-login refused",
            Self::Incorrect => "unusable configuration",
            Self::GotKilled => "terminated by signal",
            Self::Timeout => "timed out",
        }
    }

    /// Whether the code reports a clean session.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::TransferSuccess)
    }

    /// Folds a step-specific code into [`ExitCode::Timeout`] when the
    /// underlying failure was a timeout.
    ///
    /// Only the network-facing steps fold; local failures and
    /// configuration errors keep their own code so the scheduler does not
    /// mistake them for a slow peer.
    #[must_use]
    pub const fn fold_timeout(self, timed_out: bool) -> Self {
        if !timed_out {
            return self;
        }
        match self {
            Self::ConnectError
            | Self::ListError
            | Self::OpenRemoteError
            | Self::ReadRemoteError
            | Self::WriteRemoteError
            | Self::CloseRemoteError
            | Self::DeleteRemoteError
            | Self::DataError => Self::Timeout,
            other => other,
        }
    }

    /// Decodes a numeric exit code.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::TransferSuccess,
            1 => Self::StillFilesToSend,
            2 => Self::ConnectError,
            3 => Self::UserError,
            4 => Self::PasswordError,
            5 => Self::TypeError,
            6 => Self::ChdirError,
            7 => Self::ListError,
            8 => Self::OpenRemoteError,
            9 => Self::ReadRemoteError,
            10 => Self::WriteRemoteError,
            11 => Self::CloseRemoteError,
            12 => Self::DeleteRemoteError,
            13 => Self::OpenLocalError,
            14 => Self::ReadLocalError,
            15 => Self::WriteLocalError,
            16 => Self::AllocError,
            17 => Self::AuthError,
            18 => Self::DataError,
            19 => Self::RemoteUserError,
            21 => Self::Incorrect,
            30 => Self::GotKilled,
            40 => Self::Timeout,
            _ => return None,
        })
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.as_i32().clamp(0, 255) as u8)
    }
}

/// Implemented by error types that terminate a worker.
pub trait HasExitCode {
    /// The exit code the process should terminate with.
    fn exit_code(&self) -> ExitCode;
}
