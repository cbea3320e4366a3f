//! The send worker state machine.
//!
//! One invocation drains one outgoing job directory:
//!
//! ```text
//! enumerate -> age-filter -> duplicate-check -> connect
//!     -> for each file (or one combined message): envelope -> frame -> stream
//!     -> archive or unlink -> account -> rmdir -> burst gate
//! ```
//!
//! The directory layout is the queue: files appear here fully written, the
//! worker transmits and removes them, and removing the emptied directory
//! completes the job.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bandwidth::RateLimiter;
use chrono::Utc;
use aftcore::{WorkerContext, sched, signals};
use logging::{DeleteReason, DeleteRecord, OutputKind, OutputRecord, Sign};
use protocol::{Envelope, StoreSink, TransferKind};
use status::{FeatureFlags, HostStatus, ProtocolOptions};

use crate::burst::{BurstGate, BurstVerdict};
use crate::dup::{DupAction, DupIdentity, identity_digest, is_duplicate};
use crate::error::{LocalOp, Step, WorkerError};
use crate::fetch::WorkerLogs;
use crate::mail::{
    MailProfile, base64_chunk_size, boundary, close_parts, encode_chunk, expand_subject,
    lf_to_crlf, message_headers, open_attachment_part, open_text_part, to_latin1,
};
use crate::archive;
use crate::summary::done_line;

/// Duplicate-check configuration of the job.
#[derive(Debug, Clone, Copy)]
pub struct DupConfig {
    /// Which properties form the identity digest.
    pub identity: DupIdentity,
    /// What to do with a detected duplicate.
    pub action: DupAction,
}

/// What a finished send invocation accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendOutcome {
    /// Files delivered.
    pub files: usize,
    /// Payload bytes read and transmitted.
    pub bytes: u64,
    /// Follow-up sessions processed on the same connection.
    pub bursts: u32,
}

#[derive(Debug, Clone)]
struct SendFile {
    name: String,
    path: PathBuf,
    size: i64,
    mtime: i64,
}

#[derive(Debug, PartialEq, Eq)]
enum EnvelopeOutcome {
    Opened,
    /// The server rejected a recipient; the whole job was removed.
    Eliminated,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One send session over an established worker context.
pub struct SendWorker<'a, C: StoreSink, G: BurstGate> {
    ctx: &'a mut WorkerContext,
    client: &'a mut C,
    gate: &'a mut G,
    logs: &'a mut WorkerLogs,
    profile: MailProfile,
    recipients: Vec<String>,
    dup: Option<DupConfig>,
    connected_at: Instant,
    outcome: SendOutcome,
    batch_files: usize,
    batch_bytes: u64,
}

impl<'a, C: StoreSink, G: BurstGate> SendWorker<'a, C, G> {
    /// Binds the session parts together.
    pub fn new(
        ctx: &'a mut WorkerContext,
        client: &'a mut C,
        gate: &'a mut G,
        logs: &'a mut WorkerLogs,
        profile: MailProfile,
        recipients: Vec<String>,
        dup: Option<DupConfig>,
    ) -> Result<Self, WorkerError> {
        if recipients.is_empty() {
            return Err(WorkerError::Config("send job without recipients".into()));
        }
        if ctx.db.unique.is_none() {
            return Err(WorkerError::Config(
                "send job without a parsed unique name".into(),
            ));
        }
        Ok(Self {
            ctx,
            client,
            gate,
            logs,
            profile,
            recipients,
            dup,
            connected_at: Instant::now(),
            outcome: SendOutcome::default(),
            batch_files: 0,
            batch_bytes: 0,
        })
    }

    /// Runs the session to completion.
    pub fn run(mut self) -> Result<SendOutcome, WorkerError> {
        if signals::killed() {
            return Err(WorkerError::Killed);
        }
        self.ctx.claim_slot(unix_now())?;
        {
            let msg_name = self.ctx.db.msg_name.clone();
            let slot = self.ctx.job_slot_mut()?;
            slot.set_unique_name(&msg_name);
        }

        let result = self.drive();

        if self.batch_files > 0 {
            self.log_batch_summary();
        }
        signals::clear_fault_stamp();
        let _ = self.ctx.release_slot();
        sched::send_proc_fin(&self.ctx.work, false);
        result.map(|()| self.outcome)
    }

    fn drive(&mut self) -> Result<(), WorkerError> {
        self.client
            .connect()
            .map_err(|e| WorkerError::at(Step::Connect, e))?;
        self.connected_at = Instant::now();

        loop {
            if signals::killed() {
                return Err(WorkerError::Killed);
            }
            let files = self.enumerate()?;
            if !files.is_empty() {
                if self.transmit(files)? == EnvelopeOutcome::Eliminated {
                    return Ok(());
                }
            }
            self.remove_job_dir();
            self.log_batch_summary();

            if self.should_quit() {
                break;
            }
            let window = Duration::from_secs(u64::from(self.ctx.db.keep_connected));
            match self.gate.wait(window) {
                BurstVerdict::NewJob(db, _changed) => {
                    self.ctx.db = *db;
                    self.outcome.bursts += 1;
                    let msg_name = self.ctx.db.msg_name.clone();
                    let slot = self.ctx.job_slot_mut()?;
                    slot.set_unique_name(&msg_name);
                }
                BurstVerdict::Rescan => {}
                BurstVerdict::TimedOut => return Err(WorkerError::Stalled),
                BurstVerdict::Quit => break,
            }
        }

        if let Err(e) = self.client.quit() {
            tracing::debug!(error = %e, "quit failed, connection dropped");
        }
        Ok(())
    }

    /// Collects the job directory's files, applying the age limit and the
    /// duplicate check on the way.
    fn enumerate(&mut self) -> Result<Vec<SendFile>, WorkerError> {
        let dir = self.ctx.work.outgoing(&self.ctx.db.msg_name);
        let now = unix_now();
        let sort = ProtocolOptions::from_bits_truncate(self.ctx.host()?.protocol_options)
            .contains(ProtocolOptions::SORT_FILE_NAMES);
        let keep_data = HostStatus::from_bits_truncate(self.ctx.host()?.host_status)
            .contains(HostStatus::DO_NOT_DELETE_DATA);

        let mut files: Vec<SendFile> = Vec::new();
        let mut removed_any = false;

        let entries = fs::read_dir(&dir).map_err(|e| WorkerError::local(LocalOp::Read, &dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| WorkerError::local(LocalOp::Read, &dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                // Hidden names are still being written by the producer.
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| WorkerError::local(LocalOp::Read, entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            let size = meta.len() as i64;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(now);
            let age = (now - mtime).max(0);

            if self.ctx.db.age_limit > 0 && age > self.ctx.db.age_limit && !keep_data {
                self.purge(&entry.path(), &name, size, age, DeleteReason::AGE_OUTPUT)?;
                removed_any = true;
                continue;
            }

            if let Some(dup) = self.dup {
                if self.ctx.db.dup_check_timeout > 0
                    && self.check_duplicate(&entry.path(), &name, size, dup, now)?
                {
                    removed_any = true;
                    continue;
                }
            }

            let file = SendFile {
                name,
                path: entry.path(),
                size,
                mtime,
            };
            if sort {
                // Stable by arrival time: equal mtimes keep insertion order.
                let pos = files
                    .iter()
                    .position(|f| f.mtime > file.mtime)
                    .unwrap_or(files.len());
                files.insert(pos, file);
            } else {
                files.push(file);
            }
        }

        if removed_any {
            self.clear_errors_if_drained()?;
        }
        Ok(files)
    }

    /// Removes one file for policy reasons, with both log records.
    fn purge(
        &mut self,
        path: &std::path::Path,
        name: &str,
        size: i64,
        age: i64,
        reason: DeleteReason,
    ) -> Result<(), WorkerError> {
        fs::remove_file(path).map_err(|e| WorkerError::local(LocalOp::Write, path, e))?;
        self.ctx.update_totals(-1, -size)?;

        let kind = if reason == DeleteReason::AGE_OUTPUT {
            OutputKind::AgeLimitDelete
        } else {
            OutputKind::DuplicateDelete
        };
        let delete = DeleteRecord {
            job_id: self.ctx.db.job_id,
            dir_id: 0,
            reason,
            file_size: size,
            when: unix_now(),
            host_alias: self.ctx.db.host_alias.clone(),
            file_name: name.to_owned(),
            proc_tag: DeleteRecord::proc_tag("SEND_FILE", "SMTP", Some(age)),
        };
        self.logs.delete.write_record(&delete.encode())?;
        let output = OutputRecord {
            retries: self.ctx.db.retries,
            job_id: self.ctx.db.job_id,
            file_size: size,
            transfer_millis: 0,
            kind,
            unique_name: self.ctx.db.msg_name.clone(),
            file_name: name.to_owned(),
            archive_name: String::new(),
        };
        self.logs.output.write_record(&output.encode())?;
        Ok(())
    }

    /// Applies the duplicate action; true when the file is consumed.
    fn check_duplicate(
        &mut self,
        path: &std::path::Path,
        name: &str,
        size: i64,
        dup: DupConfig,
        now: i64,
    ) -> Result<bool, WorkerError> {
        let digest = identity_digest(path, name, size, dup.identity)
            .map_err(|e| WorkerError::local(LocalOp::Read, path, e))?;
        let store = self.ctx.work.crc_store(self.ctx.db.job_id);
        let seen = is_duplicate(&store, digest, self.ctx.db.dup_check_timeout, now)
            .map_err(|e| WorkerError::local(LocalOp::Write, &store, e))?;
        if !seen {
            return Ok(false);
        }

        match dup.action {
            DupAction::Warn => {
                self.logs.trans.log(
                    Sign::Warn,
                    &format!("{name} is a duplicate, sending anyway"),
                    None,
                )?;
                Ok(false)
            }
            DupAction::Delete => {
                self.purge(path, name, size, 0, DeleteReason::DUP_OUTPUT)?;
                Ok(true)
            }
            DupAction::Store => {
                let side = self.ctx.work.dup_store(self.ctx.db.job_id);
                fs::create_dir_all(&side)
                    .map_err(|e| WorkerError::local(LocalOp::Write, &side, e))?;
                let dest = side.join(name);
                fs::rename(path, &dest)
                    .map_err(|e| WorkerError::local(LocalOp::Write, &dest, e))?;
                self.ctx.update_totals(-1, -size)?;
                let output = OutputRecord {
                    retries: self.ctx.db.retries,
                    job_id: self.ctx.db.job_id,
                    file_size: size,
                    transfer_millis: 0,
                    kind: OutputKind::DuplicateStored,
                    unique_name: self.ctx.db.msg_name.clone(),
                    file_name: name.to_owned(),
                    archive_name: dest.to_string_lossy().into_owned(),
                };
                self.logs.output.write_record(&output.encode())?;
                Ok(true)
            }
        }
    }

    /// Clears host errors once nothing is queued anymore, so monitors stop
    /// showing a host red for work that no longer exists.
    fn clear_errors_if_drained(&mut self) -> Result<(), WorkerError> {
        let host = self.ctx.host()?;
        if host.total_file_counter == 0 && host.total_file_size == 0 && host.error_counter > 0 {
            let fsa_pos = self.ctx.db.fsa_pos;
            self.ctx.fsa.clear_host_errors(fsa_pos)?;
            sched::wake_scheduler(&self.ctx.work);
        }
        Ok(())
    }

    fn transmit(&mut self, files: Vec<SendFile>) -> Result<EnvelopeOutcome, WorkerError> {
        let attach_all = self
            .ctx
            .db
            .special
            .contains(aftcore::SpecialFlags::ATTACH_ALL_FILES);
        if attach_all {
            self.transmit_combined(&files)
        } else {
            for file in &files {
                if signals::killed() {
                    return Err(WorkerError::Killed);
                }
                if self.transmit_single(file)? == EnvelopeOutcome::Eliminated {
                    return Ok(EnvelopeOutcome::Eliminated);
                }
            }
            Ok(EnvelopeOutcome::Opened)
        }
    }

    fn open_envelope(&mut self) -> Result<EnvelopeOutcome, WorkerError> {
        let envelope = Envelope {
            from: self.profile.from.clone(),
            recipients: self.recipients.clone(),
        };
        match self.client.store_open(&envelope) {
            Ok(()) => Ok(EnvelopeOutcome::Opened),
            Err(e)
                if e.reply_code() == Some(550)
                    && e.to_string().contains("Recipient address rejected") =>
            {
                self.eliminate_job(&e.to_string())?;
                Ok(EnvelopeOutcome::Eliminated)
            }
            Err(e) => Err(WorkerError::at(Step::OpenRemote, e)),
        }
    }

    /// The server rejects one of the job's recipients permanently: the job
    /// can never be delivered, so the whole directory is removed and every
    /// file recorded as rejected.
    fn eliminate_job(&mut self, reply: &str) -> Result<(), WorkerError> {
        self.logs.trans.log(
            Sign::Error,
            "recipient rejected permanently, removing job",
            Some(reply),
        )?;
        let dir = self.ctx.work.outgoing(&self.ctx.db.msg_name);
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let size = entry.metadata().map_or(0, |m| m.len() as i64);
                let delete = DeleteRecord {
                    job_id: self.ctx.db.job_id,
                    dir_id: 0,
                    reason: DeleteReason::RECIPIENT_REJECTED,
                    file_size: size,
                    when: unix_now(),
                    host_alias: self.ctx.db.host_alias.clone(),
                    file_name: name.clone(),
                    proc_tag: DeleteRecord::proc_tag("SEND_FILE", "SMTP", None),
                };
                self.logs.delete.write_record(&delete.encode())?;
                let output = OutputRecord {
                    retries: self.ctx.db.retries,
                    job_id: self.ctx.db.job_id,
                    file_size: size,
                    transfer_millis: 0,
                    kind: OutputKind::AddressRejectedDelete,
                    unique_name: self.ctx.db.msg_name.clone(),
                    file_name: name,
                    archive_name: String::new(),
                };
                self.logs.output.write_record(&output.encode())?;
                self.ctx.update_totals(-1, -size)?;
            }
        }
        fs::remove_dir_all(&dir).map_err(|e| WorkerError::local(LocalOp::Write, &dir, e))?;
        Ok(())
    }

    fn transmit_single(&mut self, file: &SendFile) -> Result<EnvelopeOutcome, WorkerError> {
        if self.open_envelope()? == EnvelopeOutcome::Eliminated {
            return Ok(EnvelopeOutcome::Eliminated);
        }
        let attach = self.ctx.db.special.contains(aftcore::SpecialFlags::ATTACH_FILE);
        let bnd = boundary(&self.ctx.db.msg_name);
        let subject = self
            .profile
            .subject
            .clone()
            .map(|t| expand_subject(&t, &[&file.name]));
        let multipart = attach || self.profile.header_template.is_some();

        let head = message_headers(
            &self.profile,
            Utc::now(),
            &self.recipients,
            subject.as_deref(),
            multipart.then_some(bnd.as_str()),
        );
        self.write_all(head.as_bytes())?;
        self.emit_header_template(multipart.then_some(bnd.as_str()))?;

        let started = Instant::now();
        if multipart {
            if attach {
                self.write_all(open_attachment_part(&bnd, &file.name).as_bytes())?;
            } else {
                let part = open_text_part(&bnd, self.profile.charset());
                self.write_all(part.as_bytes())?;
            }
        }
        let payload = self.stream_body(file, attach)?;
        if multipart {
            self.write_all(close_parts(&bnd).as_bytes())?;
        }
        let queue_id = self
            .client
            .store_close()
            .map_err(|e| WorkerError::at(Step::CloseRemote, e))?;

        self.post_transmit(file, queue_id.as_deref(), started, payload)?;
        Ok(EnvelopeOutcome::Opened)
    }

    fn transmit_combined(&mut self, files: &[SendFile]) -> Result<EnvelopeOutcome, WorkerError> {
        if self.open_envelope()? == EnvelopeOutcome::Eliminated {
            return Ok(EnvelopeOutcome::Eliminated);
        }
        let bnd = boundary(&self.ctx.db.msg_name);
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let subject = self
            .profile
            .subject
            .clone()
            .map(|t| expand_subject(&t, &names));

        let head = message_headers(
            &self.profile,
            Utc::now(),
            &self.recipients,
            subject.as_deref(),
            Some(bnd.as_str()),
        );
        self.write_all(head.as_bytes())?;
        self.emit_header_template(Some(bnd.as_str()))?;

        let started = Instant::now();
        let mut payloads = Vec::with_capacity(files.len());
        for file in files {
            if signals::killed() {
                return Err(WorkerError::Killed);
            }
            self.write_all(open_attachment_part(&bnd, &file.name).as_bytes())?;
            payloads.push(self.stream_body(file, true)?);
        }
        self.write_all(close_parts(&bnd).as_bytes())?;
        let queue_id = self
            .client
            .store_close()
            .map_err(|e| WorkerError::at(Step::CloseRemote, e))?;

        for (file, payload) in files.iter().zip(payloads) {
            self.post_transmit(file, queue_id.as_deref(), started, payload)?;
        }
        Ok(EnvelopeOutcome::Opened)
    }

    /// Streams framing bytes (headers, part boundaries) to the client.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), WorkerError> {
        self.client
            .write_block(bytes)
            .map_err(|e| WorkerError::at(Step::WriteRemote, e))
    }

    fn emit_header_template(&mut self, bnd: Option<&str>) -> Result<(), WorkerError> {
        let Some(template) = self.profile.header_template.clone() else {
            return Ok(());
        };
        if let Some(bnd) = bnd {
            let part = open_text_part(bnd, self.profile.charset());
            self.write_all(part.as_bytes())?;
        }
        let body = if self.ctx.db.special.contains(aftcore::SpecialFlags::ENCODE_ANSI) {
            to_latin1(&template)
        } else {
            template.into_bytes()
        };
        let mut last_cr = false;
        let translated = lf_to_crlf(&body, &mut last_cr);
        self.write_all(&translated)?;
        self.write_all(b"\r\n")?;
        Ok(())
    }

    /// Streams one file body, base64-framed or line-translated, paced and
    /// bounded like every transfer.
    fn stream_body(&mut self, file: &SendFile, attach: bool) -> Result<u64, WorkerError> {
        let host = self.ctx.host()?;
        let block_size = host.block_size.max(512) as usize;
        let trl = host.trl_per_process;
        let mut limiter = std::num::NonZeroU64::new(trl).map(RateLimiter::new);
        let timeout = Duration::from_secs(self.ctx.db.transfer_timeout);
        let ascii = self.ctx.db.transfer_kind == TransferKind::Ascii;
        let silent = self
            .ctx
            .db
            .special
            .contains(aftcore::SpecialFlags::SILENT_NOT_LOCKED_FILE);

        {
            let slot = self.ctx.job_slot_mut()?;
            slot.file_size_in_use = file.size;
            slot.file_size_in_use_done = 0;
            slot.set_file_in_use(&file.name);
        }

        let chunk = if attach {
            base64_chunk_size(block_size)
        } else {
            block_size
        };
        let mut local = fs::File::open(&file.path)
            .map_err(|e| WorkerError::local(LocalOp::Open, &file.path, e))?;
        let started = Instant::now();
        let mut buf = vec![0u8; chunk];
        let mut payload: u64 = 0;
        let mut last_cr = false;

        let mut pump = |this: &mut Self,
                        local: &mut fs::File,
                        payload: &mut u64|
         -> Result<(), WorkerError> {
            loop {
                if signals::killed() {
                    return Err(WorkerError::Killed);
                }
                let n = read_full(local, &mut buf)
                    .map_err(|e| WorkerError::local(LocalOp::Read, &file.path, e))?;
                if n == 0 {
                    return Ok(());
                }
                let out = if attach {
                    encode_chunk(&buf[..n])
                } else if ascii {
                    lf_to_crlf(&buf[..n], &mut last_cr)
                } else {
                    buf[..n].to_vec()
                };
                this.client
                    .write_block(&out)
                    .map_err(|e| WorkerError::at(Step::WriteRemote, e))?;
                *payload += n as u64;
                {
                    let slot = this.ctx.job_slot_mut()?;
                    slot.file_size_in_use_done += n as i64;
                    slot.bytes_send += n as u64;
                }
                if let Some(limiter) = limiter.as_mut() {
                    limiter.register(n);
                }
                if started.elapsed() > timeout {
                    return Err(WorkerError::Stalled);
                }
            }
        };
        pump(self, &mut local, &mut payload)?;

        // A producer that kept appending while we transmitted: send the
        // remainder so the message carries a consistent snapshot.
        let grown = local
            .metadata()
            .map(|m| m.len() > payload)
            .unwrap_or(false);
        if grown {
            let sign = if silent { Sign::Debug } else { Sign::Warn };
            self.logs.trans.log(
                sign,
                &format!("{} grew during transmission, appending remainder", file.name),
                None,
            )?;
            pump(self, &mut local, &mut payload)?;
        }

        Ok(payload)
    }

    /// Archival or unlink, counters, and the output record for one file.
    fn post_transmit(
        &mut self,
        file: &SendFile,
        queue_id: Option<&str>,
        started: Instant,
        payload: u64,
    ) -> Result<(), WorkerError> {
        let features = self.ctx.fsa.feature_flags();
        let simulate = features.contains(FeatureFlags::SIMULATE_SEND);
        let archive_enabled =
            self.ctx.db.archive_time > 0 && !features.contains(FeatureFlags::DISABLE_ARCHIVE);

        let mut archive_name = String::new();
        if simulate {
            self.logs.trans.log(
                Sign::Debug,
                &format!("simulation: leaving {} in place", file.name),
                None,
            )?;
        } else if archive_enabled {
            let rel = archive::archive_file(
                &self.ctx.work,
                &self.ctx.db.host_alias,
                self.ctx.db.job_id,
                &file.path,
            )
            .map_err(|e| WorkerError::local(LocalOp::Write, &file.path, e))?;
            archive_name = rel.to_string_lossy().into_owned();
        } else {
            fs::remove_file(&file.path)
                .map_err(|e| WorkerError::local(LocalOp::Write, &file.path, e))?;
        }

        self.ctx.update_totals(-1, -file.size)?;
        {
            let slot = self.ctx.job_slot_mut()?;
            slot.no_of_files_done += 1;
            slot.file_size_done += file.size;
            slot.file_size_in_use = 0;
            slot.file_size_in_use_done = 0;
            slot.set_file_in_use("");
        }
        self.clear_errors_if_drained()?;

        self.batch_files += 1;
        self.batch_bytes += payload;
        self.outcome.files += 1;
        self.outcome.bytes += payload;

        if let Some(id) = queue_id {
            self.logs
                .trans
                .log(Sign::Info, &format!("{} queued as {id}", file.name), None)?;
        }
        let record = OutputRecord {
            retries: self.ctx.db.retries,
            job_id: self.ctx.db.job_id,
            file_size: file.size,
            transfer_millis: started.elapsed().as_millis() as u64,
            kind: OutputKind::NormalDelivered,
            unique_name: self.ctx.db.msg_name.clone(),
            file_name: file.name.clone(),
            archive_name,
        };
        self.logs.output.write_record(&record.encode())?;
        Ok(())
    }

    fn remove_job_dir(&mut self) {
        let dir = self.ctx.work.outgoing(&self.ctx.db.msg_name);
        if let Err(e) = fs::remove_dir(&dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "job directory not removed");
        }
    }

    fn log_batch_summary(&mut self) {
        if self.batch_files == 0 {
            return;
        }
        let line = done_line(
            self.batch_bytes,
            self.batch_files,
            "mailed",
            0,
            self.outcome.bursts,
        );
        let _ = self.logs.trans.log(Sign::Info, &line, None);
        self.batch_files = 0;
        self.batch_bytes = 0;
    }

    fn should_quit(&self) -> bool {
        if self.ctx.db.keep_connected == 0 {
            return true;
        }
        let connected = self.connected_at.elapsed().as_secs();
        if connected > u64::from(self.ctx.db.keep_connected) {
            return true;
        }
        self.ctx.db.disconnect > 0 && connected > u64::from(self.ctx.db.disconnect)
    }
}

/// Reads until the buffer is full or the file ends.
fn read_full(file: &mut fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
