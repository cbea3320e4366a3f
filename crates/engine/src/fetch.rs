//! The fetch worker state machine.
//!
//! One invocation drives one session against a watched remote directory:
//!
//! ```text
//! connect -> login -> prelude -> list -> admit/reserve
//!     -> for each reserved file: download -> rename -> account
//!     -> burst gate -> (follow-up job | rescan | quit)
//! ```
//!
//! The machine is generic over [`FetchSource`], so the same code serves
//! every retrieve protocol, and over [`BurstGate`], so session reuse stays
//! testable. All shared-state discipline (catalog reservations, status
//! counters, the crash-safe rename window) lives here.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bandwidth::RateLimiter;
use aftcore::guard::shared_pending;
use aftcore::{ExitGuard, RenamePending, SharedPending, WorkerContext, sched, signals};
use listing::{AdmissionPolicy, FileMask, MlsdEntry, Predicates, Verdict, consider, parse_mlsd};
use logging::{DeleteReason, DeleteRecord, FifoSink, OutputKind, OutputRecord, Sign, TransLog};
use protocol::{DirMtime, FeatureSet, FetchSource, ListKind, SessionError};
use rlist::layout::{NO, YES};
use rlist::{CheckOutcome, ReservePolicy, RetrieveList, RlEntry, ScanTotals, check_list};
use status::layout::DirEntry;
use status::{DeletePolicy, DirOptions, FeatureFlags, ProtocolOptions, SelectorSet, StupidMode};

use crate::burst::{BurstGate, BurstVerdict, ValuesChanged};
use crate::error::{LocalOp, Step, WorkerError};
use crate::summary::done_line;

/// Log sinks one worker session writes to.
#[derive(Debug)]
pub struct WorkerLogs {
    /// Severity-signed session lines.
    pub trans: TransLog,
    /// Binary per-file outcome records.
    pub output: FifoSink,
    /// Binary policy-deletion records.
    pub delete: FifoSink,
}

/// What a finished fetch invocation accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchOutcome {
    /// Files renamed into place.
    pub files: usize,
    /// Bytes received, resumed portions excluded.
    pub bytes: u64,
    /// Follow-up sessions processed on the same connection.
    pub bursts: u32,
    /// Downloads that resumed at a non-zero offset.
    pub appends: u32,
}

/// Snapshot of the directory record a session works against.
#[derive(Debug, Clone)]
struct DirCfg {
    mode: StupidMode,
    remove: bool,
    force_reread: bool,
    work_dir: PathBuf,
    options: DirOptions,
    delete_policy: DeletePolicy,
    unknown_file_time: i32,
    unreadable_file_time: i32,
    predicates: Predicates,
    max_files: u32,
    max_bytes: i64,
    dir_mtime: i64,
}

impl DirCfg {
    fn from_entry(entry: &DirEntry) -> Self {
        Self {
            mode: entry.mode(),
            remove: entry.remove != 0,
            force_reread: entry.force_reread != 0,
            work_dir: PathBuf::from(entry.work_dir()),
            options: DirOptions::from_bits_truncate(entry.dir_options),
            delete_policy: DeletePolicy::from_bits_truncate(entry.delete_files_flag),
            unknown_file_time: entry.unknown_file_time,
            unreadable_file_time: entry.unreadable_file_time,
            predicates: Predicates {
                ignore_size: entry.ignore_size,
                ignore_file_time: entry.ignore_file_time,
                selectors: SelectorSet::from_bits_truncate(entry.gt_lt_sign),
            },
            max_files: if entry.max_copied_files == 0 {
                u32::MAX
            } else {
                entry.max_copied_files
            },
            max_bytes: if entry.max_copied_file_size == 0 {
                i64::MAX
            } else {
                entry.max_copied_file_size
            },
            dir_mtime: entry.dir_mtime,
        }
    }

    fn stateless(&self) -> bool {
        self.mode == StupidMode::Yes || self.remove
    }
}

/// Snapshot of the host record fields a session needs per block.
#[derive(Debug, Clone, Copy)]
struct HostCfg {
    block_size: usize,
    options: ProtocolOptions,
    file_size_offset: i32,
    trl_per_process: u64,
}

#[derive(Debug)]
struct ScanData {
    totals: ScanTotals,
    new_dir_mtime: Option<i64>,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One fetch session over an established worker context.
pub struct FetchWorker<'a, C: FetchSource, G: BurstGate> {
    ctx: &'a mut WorkerContext,
    client: &'a mut C,
    gate: &'a mut G,
    logs: &'a mut WorkerLogs,
    masks: &'a [Vec<Box<dyn FileMask>>],
    list: RetrieveList,
    pending: SharedPending,
    features: FeatureSet,
    connected_at: Instant,
    outcome: FetchOutcome,
    batch_files: usize,
    batch_bytes: u64,
    batch_appends: u32,
    had_reserved: bool,
}

impl<'a, C: FetchSource, G: BurstGate> FetchWorker<'a, C, G> {
    /// Opens the retrieve catalog for the job's directory and binds the
    /// session parts together.
    pub fn new(
        ctx: &'a mut WorkerContext,
        client: &'a mut C,
        gate: &'a mut G,
        logs: &'a mut WorkerLogs,
        masks: &'a [Vec<Box<dyn FileMask>>],
    ) -> Result<Self, WorkerError> {
        let fra_pos = ctx
            .db
            .fra_pos
            .ok_or_else(|| WorkerError::Config("retrieve job without a directory record".into()))?;
        let cfg = {
            let fra = ctx
                .fra
                .as_ref()
                .ok_or_else(|| WorkerError::Config("directory table not attached".into()))?;
            DirCfg::from_entry(fra.dir(fra_pos)?)
        };

        let list = if cfg.stateless() {
            RetrieveList::open_session()?
        } else {
            let path = ctx.work.retrieve_list(&ctx.db.dir_alias);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| WorkerError::local(LocalOp::Open, parent, e))?;
            }
            RetrieveList::open_persistent(&path)?
        };

        Ok(Self {
            ctx,
            client,
            gate,
            logs,
            masks,
            list,
            pending: shared_pending(),
            features: FeatureSet::empty(),
            connected_at: Instant::now(),
            outcome: FetchOutcome::default(),
            batch_files: 0,
            batch_bytes: 0,
            batch_appends: 0,
            had_reserved: false,
        })
    }

    /// Runs the session to completion, leaving the shared state clean on
    /// every path out.
    pub fn run(mut self) -> Result<FetchOutcome, WorkerError> {
        if signals::killed() {
            return Err(WorkerError::Killed);
        }
        self.ctx.claim_slot(unix_now())?;

        // Panic insurance for the rename window; the normal and error
        // paths finish the pending rename themselves.
        let mut guard = ExitGuard::new();
        let pending = Rc::clone(&self.pending);
        guard.defer(move || {
            if let Some(p) = pending.borrow_mut().take() {
                let _ = fs::rename(&p.hidden, &p.final_path);
            }
        });

        let result = self.drive();

        self.finish_pending();
        self.list.release_assignments(self.ctx.db.worker_stamp());
        if self.batch_files > 0 {
            self.log_batch_summary();
        }
        signals::clear_fault_stamp();
        let _ = self.ctx.release_slot();
        sched::send_proc_fin(&self.ctx.work, false);

        let outcome = self.outcome;
        let destroy = match self.dir_cfg() {
            Ok(cfg) => cfg.stateless(),
            Err(_) => false,
        };
        let _ = self.list.detach(destroy && self.ctx.db.fra_pos.is_some());
        result.map(|()| outcome)
    }

    fn dir_cfg(&self) -> Result<DirCfg, WorkerError> {
        let fra_pos = self
            .ctx
            .db
            .fra_pos
            .ok_or_else(|| WorkerError::Config("retrieve job without a directory record".into()))?;
        let fra = self
            .ctx
            .fra
            .as_ref()
            .ok_or_else(|| WorkerError::Config("directory table not attached".into()))?;
        Ok(DirCfg::from_entry(fra.dir(fra_pos)?))
    }

    fn host_cfg(&self) -> Result<HostCfg, WorkerError> {
        let host = self.ctx.host()?;
        Ok(HostCfg {
            block_size: host.block_size.max(512) as usize,
            options: ProtocolOptions::from_bits_truncate(host.protocol_options),
            file_size_offset: host.file_size_offset,
            trl_per_process: host.trl_per_process,
        })
    }

    fn drive(&mut self) -> Result<(), WorkerError> {
        let mut changed = ValuesChanged::all();
        self.connect_and_login()?;
        self.connected_at = Instant::now();

        loop {
            if signals::killed() {
                return Err(WorkerError::Killed);
            }
            self.prelude(changed)?;

            if let Some(scan) = self.scan()? {
                if scan.totals.files_to_retrieve > 0 && !self.had_reserved {
                    self.had_reserved = true;
                    self.maybe_start_helpers()?;
                }
                if !self.download_reserved()? {
                    // The host or directory vanished from the tables; the
                    // session ends cleanly with what it has.
                    return Ok(());
                }
                self.after_scan(&scan)?;
            }
            self.log_batch_summary();

            if self.should_quit()? {
                break;
            }
            let window = Duration::from_secs(u64::from(self.ctx.db.keep_connected));
            match self.gate.wait(window) {
                BurstVerdict::NewJob(db, flags) => {
                    self.ctx.db = *db;
                    self.outcome.bursts += 1;
                    changed = flags;
                    if flags.contains(ValuesChanged::USER) {
                        self.relogin()?;
                    }
                }
                BurstVerdict::Rescan => {
                    changed = ValuesChanged::empty();
                }
                BurstVerdict::TimedOut => return Err(WorkerError::Stalled),
                BurstVerdict::Quit => break,
            }
        }

        if let Err(e) = self.client.quit() {
            tracing::debug!(error = %e, "quit failed, connection dropped");
        }
        Ok(())
    }

    fn connect_and_login(&mut self) -> Result<(), WorkerError> {
        let greeting = self
            .client
            .connect()
            .map_err(|e| WorkerError::at(Step::Connect, e))?;
        if greeting != 230 {
            let (user, password) = (self.ctx.db.user.clone(), self.ctx.db.password.clone());
            self.client
                .login(&user, &password)
                .map_err(|e| WorkerError::at(Step::Login, e))?;
        }
        Ok(())
    }

    /// Re-login for a follow-up job. Servers that refuse a second USER on
    /// one session get a fresh connection instead.
    fn relogin(&mut self) -> Result<(), WorkerError> {
        let (user, password) = (self.ctx.db.user.clone(), self.ctx.db.password.clone());
        match self.client.login(&user, &password) {
            Ok(()) => Ok(()),
            Err(e) if e.refused_relogin() => {
                self.logs
                    .trans
                    .log(Sign::Debug, "re-login refused, reconnecting", None)?;
                let _ = self.client.quit();
                let greeting = self
                    .client
                    .connect()
                    .map_err(|e| WorkerError::at(Step::Relogin, e))?;
                if greeting != 230 {
                    self.client
                        .login(&user, &password)
                        .map_err(|e| WorkerError::at(Step::Relogin, e))?;
                }
                Ok(())
            }
            Err(e) => Err(WorkerError::at(Step::Relogin, e)),
        }
    }

    fn prelude(&mut self, changed: ValuesChanged) -> Result<(), WorkerError> {
        let host = self.host_cfg()?;

        if host.options.contains(ProtocolOptions::SET_IDLE_TIME) {
            let timeout = self.ctx.db.transfer_timeout as u32;
            if let Err(e) = self.client.set_idle(timeout) {
                self.logs
                    .trans
                    .log(Sign::Debug, "idle-timer setup refused", Some(&e.to_string()))?;
            }
        }

        match self.client.features() {
            Ok(set) => self.features = set,
            Err(e) => {
                self.features = FeatureSet::empty();
                self.logs
                    .trans
                    .log(Sign::Debug, "feature negotiation refused", Some(&e.to_string()))?;
            }
        }

        if changed.contains(ValuesChanged::TYPE) {
            let kind = self.ctx.db.transfer_kind;
            self.client
                .set_transfer_kind(kind)
                .map_err(|e| WorkerError::at(Step::Type, e))?;
        }

        if changed.contains(ValuesChanged::TARGET_DIR) && !self.ctx.db.target_dir.is_empty() {
            let dir = self.ctx.db.target_dir.clone();
            self.client
                .change_dir(&dir)
                .map_err(|e| WorkerError::at(Step::Chdir, e))?;
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<Option<ScanData>, WorkerError> {
        let cfg = self.dir_cfg()?;
        let host = self.host_cfg()?;

        let new_dir_mtime = if self.features.contains(FeatureSet::MLST_MODIFY) {
            match self.client.dir_mtime() {
                Ok(DirMtime::Known(t)) => Some(t),
                Ok(DirMtime::Unavailable) => None,
                Err(e) => {
                    self.logs
                        .trans
                        .log(Sign::Debug, "directory mtime probe failed", Some(&e.to_string()))?;
                    None
                }
            }
        } else {
            None
        };
        if let Some(t) = new_dir_mtime {
            if !cfg.force_reread && t == cfg.dir_mtime {
                self.logs
                    .trans
                    .log(Sign::Debug, "remote directory unchanged, skipping listing", None)?;
                return Ok(None);
            }
        }

        let kind = if self.features.machine_listing_usable()
            && !host.options.contains(ProtocolOptions::DISABLE_MLST)
        {
            ListKind::Machine
        } else if host.options.contains(ProtocolOptions::USE_STAT_LIST) {
            ListKind::Stat
        } else {
            ListKind::Long
        };
        let raw = self
            .client
            .list(kind)
            .map_err(|e| WorkerError::at(Step::List, e))?;
        if kind != ListKind::Machine {
            // Plain listings need the per-server column heuristics that
            // live with the protocol client, not here.
            return Err(WorkerError::at(
                Step::List,
                SessionError::Unsupported("plain listing scan"),
            ));
        }

        let (entries, stats) = parse_mlsd(&raw, rlist::RL_FILE_NAME_LEN);
        if stats.skipped > 0 {
            self.logs.trans.log(
                Sign::Warn,
                &format!("{} malformed listing line(s) skipped", stats.skipped),
                None,
            )?;
        }

        let now = unix_now();
        let policy = AdmissionPolicy {
            accept_dot_files: cfg.options.contains(DirOptions::ACCEPT_DOT_FILES),
            predicates: cfg.predicates,
            delete_policy: cfg.delete_policy,
            unknown_file_time: cfg.unknown_file_time,
        };
        let reserve_policy = ReservePolicy {
            mode: cfg.mode,
            remove: cfg.remove,
            old_error_job: self
                .ctx
                .db
                .special
                .contains(aftcore::SpecialFlags::OLD_ERROR_JOB),
            worker_stamp: self.ctx.db.worker_stamp(),
            predicates: &cfg.predicates,
            max_files: cfg.max_files,
            max_bytes: cfg.max_bytes,
            now,
        };

        let mut totals = ScanTotals::default();
        let mut catalog_err: Option<rlist::RlError> = None;
        let mut to_delete: Vec<(String, i64, i64)> = Vec::new();

        self.list.begin_scan();
        {
            let list = &mut self.list;
            let masks = self.masks;
            for entry in &entries {
                let verdict = consider(entry, now, &policy, masks, |e: &MlsdEntry| {
                    match check_list(
                        list,
                        &e.name,
                        e.size,
                        e.mtime,
                        e.got_date,
                        &reserve_policy,
                        &mut totals,
                    ) {
                        Ok(CheckOutcome::Reserved(_)) => true,
                        Ok(CheckOutcome::Rejected) => false,
                        Err(err) => {
                            catalog_err = Some(err);
                            false
                        }
                    }
                });
                if verdict == Verdict::DeleteRemote {
                    let age = if entry.got_date { now - entry.mtime } else { 0 };
                    to_delete.push((entry.name.clone(), entry.size, age));
                }
                if let Some(err) = catalog_err.take() {
                    return Err(err.into());
                }
            }
        }

        for (name, size, age) in to_delete {
            self.delete_unlisted(&name, size, age)?;
        }

        if cfg.mode == StupidMode::No && !cfg.remove {
            self.list.compact();
        }

        if totals.files_to_retrieve > 0 {
            self.ctx.update_totals(
                i64::from(totals.files_to_retrieve),
                totals.file_size_to_retrieve,
            )?;
        }

        Ok(Some(ScanData {
            totals,
            new_dir_mtime,
        }))
    }

    /// Remote deletion of a file no mask admits.
    fn delete_unlisted(&mut self, name: &str, size: i64, age: i64) -> Result<(), WorkerError> {
        if self
            .ctx
            .fsa
            .feature_flags()
            .contains(FeatureFlags::SIMULATE_SEND)
        {
            self.logs.trans.log(
                Sign::Debug,
                &format!("simulation: would delete unknown remote file {name}"),
                None,
            )?;
            return Ok(());
        }
        if let Err(e) = self.client.delete_remote(name) {
            self.logs.trans.log(
                Sign::Warn,
                &format!("cannot delete unknown remote file {name}"),
                Some(&e.to_string()),
            )?;
            return Ok(());
        }
        let record = DeleteRecord {
            job_id: 0,
            dir_id: self.ctx.db.dir_id,
            reason: DeleteReason::UNKNOWN_FILE,
            file_size: size.max(0),
            when: unix_now(),
            host_alias: self.ctx.db.host_alias.clone(),
            file_name: name.to_owned(),
            proc_tag: DeleteRecord::proc_tag("GET_FILE", "FTP", Some(age)),
        };
        self.logs.delete.write_record(&record.encode())?;
        Ok(())
    }

    fn maybe_start_helpers(&mut self) -> Result<(), WorkerError> {
        let cfg = self.dir_cfg()?;
        if cfg.options.contains(DirOptions::DO_NOT_PARALLELIZE) {
            return Ok(());
        }
        let host = self.ctx.host()?;
        if host.active_transfers < host.allowed_transfers {
            sched::send_proc_fin(&self.ctx.work, true);
        }
        Ok(())
    }

    fn download_reserved(&mut self) -> Result<bool, WorkerError> {
        let stamp = self.ctx.db.worker_stamp();
        let mut i = 0;
        while i < self.list.len() {
            if signals::killed() {
                return Err(WorkerError::Killed);
            }
            if self.ctx.host_gone() || self.ctx.dir_gone() {
                self.logs.trans.log(
                    Sign::Info,
                    "host or directory removed from configuration, finishing",
                    None,
                )?;
                return Ok(false);
            }
            let entry = *self.list.entry(i);
            if entry.assigned == stamp && entry.retrieved == NO {
                self.download_one(i, entry)?;
            }
            i += 1;
        }
        Ok(true)
    }

    fn download_one(&mut self, index: usize, mut tmp: RlEntry) -> Result<(), WorkerError> {
        let cfg = self.dir_cfg()?;
        let host = self.host_cfg()?;
        let name = tmp.name().to_owned();
        let listed_size = tmp.size.max(0);

        let hidden = cfg.work_dir.join(format!(".{name}"));
        let final_path = cfg.work_dir.join(&name);

        // Resume offset: a hidden in-flight file from an earlier attempt
        // wins; append-only directories fall back to the recorded size.
        let mut offset: i64 = 0;
        if host.file_size_offset != -1 {
            if let Ok(meta) = fs::metadata(&hidden) {
                offset = meta.len() as i64;
            }
        }
        if offset == 0 && cfg.mode == StupidMode::AppendOnly {
            offset = tmp.prev_size.max(0);
        }

        match self.client.retr_open(&name, offset) {
            Ok(()) => {}
            Err(e) if e.reply_code() == Some(550) => {
                // Vanished or not a file between listing and retrieve.
                return self.handle_unreadable(index, tmp, &hidden, &name, listed_size, &cfg, &e);
            }
            Err(e) => return Err(WorkerError::at(Step::OpenRemote, e)),
        }

        if self
            .ctx
            .fsa
            .feature_flags()
            .contains(FeatureFlags::CREATE_TARGET_DIR)
        {
            fs::create_dir_all(&cfg.work_dir)
                .map_err(|e| WorkerError::local(LocalOp::Open, &cfg.work_dir, e))?;
        }
        let mut local = OpenOptions::new()
            .create(true)
            .append(offset > 0)
            .truncate(offset == 0)
            .write(true)
            .open(&hidden)
            .map_err(|e| WorkerError::local(LocalOp::Open, &hidden, e))?;

        {
            let slot = self.ctx.job_slot_mut()?;
            slot.file_size_in_use = tmp.size;
            slot.file_size_in_use_done = offset;
            slot.set_file_in_use(&name);
        }

        let mut limiter = (host.trl_per_process > 0)
            .then(|| std::num::NonZeroU64::new(host.trl_per_process))
            .flatten()
            .map(RateLimiter::new);
        let timeout = Duration::from_secs(self.ctx.db.transfer_timeout);
        let started = Instant::now();
        let mut buf = vec![0u8; host.block_size];
        let mut got: u64 = 0;

        loop {
            if signals::killed() {
                return Err(WorkerError::Killed);
            }
            let n = self
                .client
                .read_block(&mut buf)
                .map_err(|e| WorkerError::at(Step::ReadRemote, e))?;
            if n == 0 {
                break;
            }
            local
                .write_all(&buf[..n])
                .map_err(|e| WorkerError::local(LocalOp::Write, &hidden, e))?;
            got += n as u64;
            {
                let slot = self.ctx.job_slot_mut()?;
                slot.file_size_in_use_done += n as i64;
                slot.bytes_send += n as u64;
            }
            if let Some(limiter) = limiter.as_mut() {
                limiter.register(n);
            }
            if started.elapsed() > timeout {
                self.logs.trans.log(
                    Sign::Error,
                    &format!("transfer of {name} stalled beyond {}s", timeout.as_secs()),
                    None,
                )?;
                return Err(WorkerError::Stalled);
            }
        }
        drop(local);
        self.client
            .close_data()
            .map_err(|e| WorkerError::at(Step::CloseRemote, e))?;

        if host.options.contains(ProtocolOptions::KEEP_TIME_STAMP) {
            if tmp.got_date != YES {
                if let Ok(Some(t)) = self.client.file_mtime(&name) {
                    tmp.file_mtime = t;
                    tmp.got_date = YES;
                }
            }
            if tmp.got_date == YES {
                let stamp = filetime::FileTime::from_unix_time(tmp.file_mtime, 0);
                if let Err(e) = filetime::set_file_mtime(&hidden, stamp) {
                    self.logs.trans.log(
                        Sign::Warn,
                        &format!("cannot apply remote mtime to {name}: {e}"),
                        None,
                    )?;
                }
            }
        }

        // Reconcile the listed size with what actually arrived.
        let actual = offset + got as i64;
        if actual != listed_size {
            if tmp.size != -1 {
                self.logs.trans.log(
                    Sign::Warn,
                    &format!(
                        "{name}: listed {listed_size} bytes but received {actual}, correcting"
                    ),
                    None,
                )?;
            }
            self.ctx.update_totals(0, actual - listed_size)?;
        }
        tmp.size = actual;

        if cfg.remove {
            if self
                .ctx
                .fsa
                .feature_flags()
                .contains(FeatureFlags::SIMULATE_SEND)
            {
                self.logs.trans.log(
                    Sign::Debug,
                    &format!("simulation: would delete remote file {name}"),
                    None,
                )?;
            } else if let Err(e) = self.client.delete_remote(&name) {
                if cfg.mode == StupidMode::Yes {
                    // Without bookkeeping a surviving remote file would be
                    // fetched forever.
                    return Err(WorkerError::at(Step::DeleteRemote, e));
                }
                self.logs.trans.log(
                    Sign::Warn,
                    &format!("cannot delete remote file {name}"),
                    Some(&e.to_string()),
                )?;
            }
        }

        *self.pending.borrow_mut() = Some(RenamePending {
            hidden: hidden.clone(),
            final_path: final_path.clone(),
            rl_index: index,
        });
        fs::rename(&hidden, &final_path)
            .map_err(|e| WorkerError::local(LocalOp::Write, &final_path, e))?;
        self.pending.borrow_mut().take();

        tmp.retrieved = YES;
        tmp.assigned = 0;
        if index < self.list.len() {
            tmp.prev_size = tmp.size;
            *self.list.entry_mut(index) = tmp;
        } else {
            // The catalog shrank underneath the session; the download
            // still counts, there is just no record to write back.
            return Ok(());
        }

        self.ctx.update_totals(-1, -tmp.size)?;
        {
            let slot = self.ctx.job_slot_mut()?;
            slot.no_of_files_done += 1;
            slot.file_size_done += tmp.size;
            slot.file_size_in_use = 0;
            slot.file_size_in_use_done = 0;
            slot.set_file_in_use("");
        }

        self.batch_files += 1;
        self.batch_bytes += got;
        self.outcome.files += 1;
        self.outcome.bytes += got;
        if offset > 0 {
            self.batch_appends += 1;
            self.outcome.appends += 1;
        }

        let record = OutputRecord {
            retries: self.ctx.db.retries,
            job_id: self.ctx.db.job_id,
            file_size: tmp.size,
            transfer_millis: started.elapsed().as_millis() as u64,
            kind: OutputKind::NormalReceived,
            unique_name: String::new(),
            file_name: name,
            archive_name: String::new(),
        };
        self.logs.output.write_record(&record.encode())?;
        Ok(())
    }

    /// A 550 on open: the file vanished or cannot be handed out.
    #[allow(clippy::too_many_arguments)]
    fn handle_unreadable(
        &mut self,
        index: usize,
        mut tmp: RlEntry,
        hidden: &std::path::Path,
        name: &str,
        listed_size: i64,
        cfg: &DirCfg,
        cause: &SessionError,
    ) -> Result<(), WorkerError> {
        self.logs.trans.log(
            Sign::Warn,
            &format!("remote file {name} is gone or unreadable"),
            Some(&cause.to_string()),
        )?;

        let now = unix_now();
        let age = if tmp.got_date == YES {
            now - tmp.file_mtime
        } else {
            0
        };
        let may_delete = cfg.delete_policy.contains(DeletePolicy::UNREADABLE_FILES)
            && (cfg.unreadable_file_time == 0 || age > i64::from(cfg.unreadable_file_time));

        if may_delete {
            let simulate = self
                .ctx
                .fsa
                .feature_flags()
                .contains(FeatureFlags::SIMULATE_SEND);
            if simulate {
                self.logs.trans.log(
                    Sign::Debug,
                    &format!("simulation: would delete unreadable remote file {name}"),
                    None,
                )?;
            } else if let Err(e) = self.client.delete_remote(name) {
                self.logs.trans.log(
                    Sign::Warn,
                    &format!("cannot delete unreadable remote file {name}"),
                    Some(&e.to_string()),
                )?;
            } else {
                let record = DeleteRecord {
                    job_id: 0,
                    dir_id: self.ctx.db.dir_id,
                    reason: DeleteReason::UNREADABLE,
                    file_size: listed_size,
                    when: now,
                    host_alias: self.ctx.db.host_alias.clone(),
                    file_name: name.to_owned(),
                    proc_tag: DeleteRecord::proc_tag("GET_FILE", "FTP", Some(age)),
                };
                self.logs.delete.write_record(&record.encode())?;
            }
            tmp.retrieved = YES;
        }

        if hidden.exists() {
            let _ = fs::remove_file(hidden);
        }
        tmp.assigned = 0;
        if index < self.list.len() {
            *self.list.entry_mut(index) = tmp;
        }
        self.ctx.update_totals(-1, -listed_size)?;
        Ok(())
    }

    fn after_scan(&mut self, scan: &ScanData) -> Result<(), WorkerError> {
        let Some(fra_pos) = self.ctx.db.fra_pos else {
            return Ok(());
        };

        // A directory that was failing is healthy again; tell the receive
        // log so monitors close the error interval.
        if let Some(fra) = self.ctx.fra.as_mut() {
            if fra.dir(fra_pos)?.error_counter > 0 {
                fra.clear_error_counter(fra_pos)?;
                sched::report_dir_error_end(&self.ctx.work, &self.ctx.db.dir_alias);
            }
        }

        if scan.totals.more_files_in_list {
            return Ok(());
        }
        let Some(new_mtime) = scan.new_dir_mtime else {
            return Ok(());
        };
        if let Some(fra) = self.ctx.fra.as_mut() {
            // One second early: a server that rounds mtimes down would
            // otherwise hide files arriving within the scan's own second.
            fra.dir_mut(fra_pos)?.dir_mtime = new_mtime - 1;
        }
        Ok(())
    }

    fn log_batch_summary(&mut self) {
        if self.batch_files == 0 {
            return;
        }
        let line = done_line(
            self.batch_bytes,
            self.batch_files,
            "retrieved",
            self.batch_appends,
            self.outcome.bursts,
        );
        let _ = self.logs.trans.log(Sign::Info, &line, None);
        self.batch_files = 0;
        self.batch_bytes = 0;
        self.batch_appends = 0;
    }

    fn should_quit(&self) -> Result<bool, WorkerError> {
        if self
            .ctx
            .fsa
            .feature_flags()
            .contains(FeatureFlags::DISABLE_RETRIEVE)
        {
            return Ok(true);
        }
        if self.ctx.db.keep_connected == 0 {
            return Ok(true);
        }
        let connected = self.connected_at.elapsed().as_secs();
        if connected > u64::from(self.ctx.db.keep_connected) {
            return Ok(true);
        }
        if self.ctx.db.disconnect > 0 && connected > u64::from(self.ctx.db.disconnect) {
            return Ok(true);
        }
        Ok(false)
    }

    /// Finishes an interrupted rename so a crash between "bytes complete"
    /// and "catalog updated" never loses the file.
    fn finish_pending(&mut self) {
        let Some(p) = self.pending.borrow_mut().take() else {
            return;
        };
        if let Err(e) = fs::rename(&p.hidden, &p.final_path) {
            if !p.final_path.exists() {
                tracing::error!(
                    hidden = %p.hidden.display(),
                    error = %e,
                    "cannot finish pending rename"
                );
                return;
            }
        }
        if p.rl_index < self.list.len() {
            let entry = self.list.entry_mut(p.rl_index);
            entry.retrieved = YES;
            entry.assigned = 0;
        }
        let record = OutputRecord {
            retries: self.ctx.db.retries,
            job_id: self.ctx.db.job_id,
            file_size: fs::metadata(&p.final_path).map_or(-1, |m| m.len() as i64),
            transfer_millis: 0,
            kind: OutputKind::NormalReceived,
            unique_name: String::new(),
            file_name: p
                .final_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            archive_name: String::new(),
        };
        let _ = self.logs.output.write_record(&record.encode());
    }
}
