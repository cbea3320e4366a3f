//! Flag sets stored in the mapped records.

use bitflags::bitflags;

bitflags! {
    /// Process-wide switches in the table header's feature byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureFlags: u8 {
        /// All retrieve workers stop claiming new work.
        const DISABLE_RETRIEVE = 1 << 0;
        /// All archive handoffs become unlinks.
        const DISABLE_ARCHIVE = 1 << 1;
        /// Workers create missing target directories on first use.
        const CREATE_TARGET_DIR = 1 << 2;
        /// Run the full state machine but suppress remote side effects.
        const SIMULATE_SEND = 1 << 3;
    }
}

bitflags! {
    /// Status bits of a host record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostStatus: u32 {
        /// Failed jobs for this host are parked in the error queue.
        const ERROR_QUEUE_SET = 1 << 0;
        /// Never delete local data for this host, whatever the job says.
        const DO_NOT_DELETE_DATA = 1 << 1;
        /// The host has been failing longer than its warn time.
        const WARN_TIME_REACHED = 1 << 2;
        /// The scheduler paused the queue after repeated errors.
        const AUTO_PAUSE_QUEUE = 1 << 3;
        /// Remember the resolved address between sessions.
        const STORE_IP = 1 << 4;
        /// The most recent session finished successfully.
        const ACTION_SUCCESS = 1 << 5;
    }
}

bitflags! {
    /// Feature toggles of a host record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtocolOptions: u32 {
        /// Send protocol keep-alives on idle control connections.
        const KEEP_ALIVE = 1 << 0;
        /// Allow session reuse for follow-up jobs to the same host.
        const ALLOW_BURST = 1 << 1;
        /// Verify the peer certificate chain strictly.
        const TLS_STRICT_VERIFY = 1 << 2;
        /// Start TLS during TCP connect instead of upgrading.
        const IMPLICIT_FTPS = 1 << 3;
        /// Apply the remote modification time to fetched files.
        const KEEP_TIME_STAMP = 1 << 4;
        /// Enumerate outgoing files in mtime order.
        const SORT_FILE_NAMES = 1 << 5;
        /// Configure the server idle timer after login.
        const SET_IDLE_TIME = 1 << 6;
        /// Never use machine listings even when the server offers them.
        const DISABLE_MLST = 1 << 7;
        /// Force plain LIST listings.
        const USE_LIST = 1 << 8;
        /// Force STAT-based listings.
        const USE_STAT_LIST = 1 << 9;
    }
}

bitflags! {
    /// Scan-state bits of a directory record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirFlags: u32 {
        /// The scheduler wants the next scan to start immediately.
        const SCAN_NOW = 1 << 0;
        /// A worker is currently scanning this directory.
        const SCAN_RUNNING = 1 << 1;
        /// The last scan left files behind for a follow-up session.
        const FILES_REMAIN = 1 << 2;
        /// The directory is in an error state visible to monitors.
        const ERROR_STATE = 1 << 3;
    }
}

bitflags! {
    /// Behaviour toggles of a directory record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirOptions: u32 {
        /// Only one worker may fetch from this directory at a time.
        const DO_NOT_PARALLELIZE = 1 << 0;
        /// Exactly one worker scans; helpers only download.
        const ONE_PROCESS_JUST_SCANNING = 1 << 1;
        /// Accept zero-length files.
        const ZERO_SIZE = 1 << 2;
        /// Admit files whose name starts with a dot.
        const ACCEPT_DOT_FILES = 1 << 3;
    }
}

bitflags! {
    /// Classes of remote files a worker may delete, stored in
    /// `delete_files_flag`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeletePolicy: u8 {
        /// Files no mask admits.
        const UNKNOWN_FILES = 1 << 0;
        /// Files the server refuses to hand out.
        const UNREADABLE_FILES = 1 << 1;
    }
}

bitflags! {
    /// Relation selectors for the size and time predicates, stored in
    /// `gt_lt_sign`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SelectorSet: u8 {
        /// Size must equal the threshold.
        const SIZE_EQUAL = 1 << 0;
        /// Size must be below the threshold.
        const SIZE_LESS = 1 << 1;
        /// Size must be above the threshold.
        const SIZE_GREATER = 1 << 2;
        /// Age must equal the threshold.
        const TIME_EQUAL = 1 << 3;
        /// Age must be below the threshold.
        const TIME_LESS = 1 << 4;
        /// Age must be above the threshold.
        const TIME_GREATER = 1 << 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_bits_are_disjoint() {
        let size = SelectorSet::SIZE_EQUAL | SelectorSet::SIZE_LESS | SelectorSet::SIZE_GREATER;
        let time = SelectorSet::TIME_EQUAL | SelectorSet::TIME_LESS | SelectorSet::TIME_GREATER;
        assert!(size.intersection(time).is_empty());
    }

    #[test]
    fn feature_byte_round_trips() {
        let flags = FeatureFlags::DISABLE_RETRIEVE | FeatureFlags::SIMULATE_SEND;
        assert_eq!(FeatureFlags::from_bits_truncate(flags.bits()), flags);
    }
}
