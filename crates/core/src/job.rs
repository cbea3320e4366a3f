//! The per-invocation job descriptor.
//!
//! The scheduler hands each worker one job: a host, credentials, a target,
//! and the knobs below. The descriptor is immutable after parsing; a burst
//! replaces it wholesale.

use bitflags::bitflags;
use protocol::TransferKind;
use thiserror::Error;

bitflags! {
    /// Job behaviour toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpecialFlags: u32 {
        /// The job is a retry after a prior failure.
        const OLD_ERROR_JOB = 1 << 0;
        /// Send files as encoded attachments.
        const ATTACH_FILE = 1 << 1;
        /// Combine all files of the job into one message.
        const ATTACH_ALL_FILES = 1 << 2;
        /// Translate mail-header templates to 8-bit ANSI.
        const ENCODE_ANSI = 1 << 3;
        /// Log appending-writer detection at debug instead of warn.
        const SILENT_NOT_LOCKED_FILE = 1 << 4;
        /// Address group deliveries with every member visible.
        const SHOW_ALL_GROUP_MEMBERS = 1 << 5;
        /// Address group deliveries with members hidden behind a list name.
        const HIDE_ALL_GROUP_MEMBERS = 1 << 6;
    }
}

/// Which channels are TLS-protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsAuth {
    /// Plain session.
    #[default]
    No,
    /// Control channel only.
    Control,
    /// Control and data channels.
    Both,
}

/// The parsed unique name of an outgoing job directory.
///
/// The directory name is `<creation_time>_<unique_number>_<split_counter>`
/// with each component in lower-case hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueName {
    /// Unix time the job was created.
    pub creation_time: i64,
    /// Per-creation-second sequence number.
    pub unique_number: u32,
    /// Counter distinguishing split-off parts of one job.
    pub split_job_counter: u32,
}

impl UniqueName {
    /// Parses a job directory name.
    pub fn parse(name: &str) -> Result<Self, JobError> {
        let mut parts = name.split('_');
        let (Some(time), Some(number), Some(split), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(JobError::UniqueName {
                name: name.to_owned(),
            });
        };
        let parse = |s: &str| u64::from_str_radix(s, 16);
        match (parse(time), parse(number), parse(split)) {
            (Ok(t), Ok(n), Ok(s)) if n <= u64::from(u32::MAX) && s <= u64::from(u32::MAX) => {
                Ok(Self {
                    creation_time: t as i64,
                    unique_number: n as u32,
                    split_job_counter: s as u32,
                })
            }
            _ => Err(JobError::UniqueName {
                name: name.to_owned(),
            }),
        }
    }

    /// Renders the directory name back.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{:x}_{:x}_{:x}",
            self.creation_time, self.unique_number, self.split_job_counter
        )
    }
}

/// Errors building a job descriptor.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job directory name does not parse.
    #[error("malformed unique job name {name:?}")]
    UniqueName {
        /// The offending name.
        name: String,
    },

    /// A required field is missing from the invocation.
    #[error("job is missing {0}")]
    Missing(&'static str),
}

/// Everything one worker invocation knows about its job.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    /// Host alias in the shared host table.
    pub host_alias: String,
    /// Host name to connect to; failover is handled via the host record.
    pub hostname: String,
    /// Remote port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Remote directory to change into, empty for the login directory.
    pub target_dir: String,
    /// Transfer representation.
    pub transfer_kind: TransferKind,
    /// Use passive data connections.
    pub passive: bool,
    /// TLS coverage of the session.
    pub tls_auth: TlsAuth,
    /// Socket receive-buffer size, 0 for the system default.
    pub rcvbuf_size: u32,
    /// Socket send-buffer size, 0 for the system default.
    pub sndbuf_size: u32,
    /// Seconds to stay connected waiting for follow-up jobs.
    pub keep_connected: u32,
    /// Hard bound on total session duration in seconds, 0 = none.
    pub disconnect: u32,
    /// Transfer timeout for one I/O operation, in seconds.
    pub transfer_timeout: u64,
    /// Scheduler-side retry counter, for the output log.
    pub retries: u32,
    /// Maximum age of an outgoing file before it is discarded, 0 = none.
    pub age_limit: i64,
    /// Seconds an archived file stays retrievable, 0 = do not archive.
    pub archive_time: i64,
    /// Duplicate-check window in seconds, 0 = no duplicate check.
    pub dup_check_timeout: i64,
    /// Behaviour toggles.
    pub special: SpecialFlags,
    /// Job identifier for logs and the duplicate store.
    pub job_id: u32,
    /// Directory identifier for logs, retrieve jobs only.
    pub dir_id: u32,
    /// Directory alias in the shared directory table, retrieve jobs only.
    pub dir_alias: String,
    /// Record index in the host table.
    pub fsa_pos: usize,
    /// Record index in the directory table, retrieve jobs only.
    pub fra_pos: Option<usize>,
    /// Worker slot within the host record.
    pub job_no: u8,
    /// Name of the outgoing job directory, send jobs only.
    pub msg_name: String,
    /// Parsed form of `msg_name`.
    pub unique: Option<UniqueName>,
}

impl JobDescriptor {
    /// Stamp stored into a claimed retrieve-list record.
    #[must_use]
    pub fn worker_stamp(&self) -> u8 {
        self.job_no + 1
    }

    /// Parses and attaches the unique name from `msg_name`.
    pub fn with_msg_name(mut self, msg_name: &str) -> Result<Self, JobError> {
        self.unique = Some(UniqueName::parse(msg_name)?);
        self.msg_name = msg_name.to_owned();
        Ok(self)
    }
}

impl Default for JobDescriptor {
    fn default() -> Self {
        Self {
            host_alias: String::new(),
            hostname: String::new(),
            port: 21,
            user: "anonymous".to_owned(),
            password: String::new(),
            target_dir: String::new(),
            transfer_kind: TransferKind::Binary,
            passive: true,
            tls_auth: TlsAuth::No,
            rcvbuf_size: 0,
            sndbuf_size: 0,
            keep_connected: 0,
            disconnect: 0,
            transfer_timeout: 120,
            retries: 0,
            age_limit: 0,
            archive_time: 0,
            dup_check_timeout: 0,
            special: SpecialFlags::empty(),
            job_id: 0,
            dir_id: 0,
            dir_alias: String::new(),
            fsa_pos: 0,
            fra_pos: None,
            job_no: 0,
            msg_name: String::new(),
            unique: None,
        }
    }
}
