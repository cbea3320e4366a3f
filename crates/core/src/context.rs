//! The worker's attachment to the shared tables.

use status::layout::{CONNECT_ACTIVE, HostEntry, JobSlot, MAX_JOB_SLOTS};
use status::{Fra, Fsa, LockClass, StatusError};

use crate::job::JobDescriptor;
use crate::paths::WorkArea;
use crate::signals;

/// Everything a worker session holds: the job, the work area, and the
/// mapped status tables.
///
/// The context is created once per invocation and carried through the
/// state machine instead of living in process globals; a burst swaps the
/// job descriptor but keeps the attachments.
#[derive(Debug)]
pub struct WorkerContext {
    /// The job of this invocation.
    pub db: JobDescriptor,
    /// Work-area path resolver.
    pub work: WorkArea,
    /// Mapped host table.
    pub fsa: Fsa,
    /// Mapped directory table, retrieve jobs only.
    pub fra: Option<Fra>,
}

impl WorkerContext {
    /// Attaches to the shared tables named by the work area.
    pub fn attach(work: WorkArea, db: JobDescriptor) -> status::Result<Self> {
        let fsa = Fsa::attach(&work.host_table())?;
        let fra = match db.fra_pos {
            Some(_) => Some(Fra::attach(&work.dir_table())?),
            None => None,
        };
        Ok(Self { db, work, fsa, fra })
    }

    /// Borrows this worker's host record.
    pub fn host(&self) -> status::Result<&HostEntry> {
        self.fsa.host(self.db.fsa_pos)
    }

    fn slot_index(&self) -> status::Result<usize> {
        let job_no = self.db.job_no as usize;
        if job_no >= MAX_JOB_SLOTS {
            return Err(StatusError::OutOfRange {
                index: job_no,
                count: MAX_JOB_SLOTS,
            });
        }
        Ok(job_no)
    }

    /// Borrows this worker's job slot.
    pub fn job_slot(&self) -> status::Result<&JobSlot> {
        let job_no = self.slot_index()?;
        Ok(&self.host()?.job_status[job_no])
    }

    /// Mutably borrows this worker's job slot.
    ///
    /// The slot is owned by this worker alone, so no lock class applies.
    pub fn job_slot_mut(&mut self) -> status::Result<&mut JobSlot> {
        let job_no = self.slot_index()?;
        Ok(&mut self.fsa.host_mut(self.db.fsa_pos)?.job_status[job_no])
    }

    /// Whether the host this job was built for has vanished from the
    /// table, because the configuration changed underneath the session.
    #[must_use]
    pub fn host_gone(&self) -> bool {
        match self.host() {
            Ok(host) => host.alias() != self.db.host_alias,
            Err(_) => true,
        }
    }

    /// Whether the retrieve directory has vanished from its table.
    #[must_use]
    pub fn dir_gone(&self) -> bool {
        match (&self.fra, self.db.fra_pos) {
            (Some(fra), Some(pos)) => match fra.dir(pos) {
                Ok(dir) => dir.alias() != self.db.dir_alias,
                Err(_) => true,
            },
            _ => false,
        }
    }

    /// Marks the slot active and counts the connection, then points the
    /// fault handler at this slot's status byte.
    pub fn claim_slot(&mut self, now: i64) -> status::Result<()> {
        let job_no = self.slot_index()?;
        self.fsa
            .with_locked(self.db.fsa_pos, LockClass::Connect, |host| {
                host.job_status[job_no].connect_status = CONNECT_ACTIVE;
                host.connections = host.connections.wrapping_add(1);
                host.last_connection = now;
            })?;
        let slot = self.job_slot_mut()?;
        signals::register_fault_stamp(&raw mut slot.connect_status);
        Ok(())
    }

    /// Resets the slot on the way out and detaches the fault handler.
    pub fn release_slot(&mut self) -> status::Result<()> {
        signals::clear_fault_stamp();
        let job_no = self.slot_index()?;
        self.fsa
            .with_locked(self.db.fsa_pos, LockClass::Connect, |host| {
                host.job_status[job_no].reset();
            })
    }

    /// Applies a delta to the host's aggregate totals under its lock.
    pub fn update_totals(&mut self, d_files: i64, d_bytes: i64) -> status::Result<()> {
        self.fsa.update_totals(self.db.fsa_pos, d_files, d_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use status::layout::{CONNECT_NOT_WORKING, DirEntry};

    fn fixture(dir: &tempfile::TempDir) -> WorkerContext {
        let work = WorkArea::new(dir.path());
        std::fs::create_dir_all(work.fifodir()).expect("fifodir");
        Fsa::create(
            &work.host_table(),
            &[HostEntry::new("alpha", "alpha.example.net")],
        )
        .expect("host table");
        Fra::create(&work.dir_table(), &[DirEntry::new("wx-charts")]).expect("dir table");

        let mut db = JobDescriptor::default();
        db.host_alias = "alpha".to_owned();
        db.hostname = "alpha.example.net".to_owned();
        db.dir_alias = "wx-charts".to_owned();
        db.fra_pos = Some(0);
        db.job_no = 1;
        WorkerContext::attach(work, db).expect("attach")
    }

    #[test]
    fn slot_claim_and_release_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = fixture(&dir);

        ctx.claim_slot(1_700_000_000).expect("claim");
        assert_eq!(ctx.job_slot().expect("slot").connect_status, CONNECT_ACTIVE);
        let host = ctx.host().expect("host");
        assert_eq!(host.connections, 1);
        assert_eq!(host.last_connection, 1_700_000_000);

        ctx.release_slot().expect("release");
        assert_eq!(
            ctx.job_slot().expect("slot").connect_status,
            CONNECT_NOT_WORKING
        );
    }

    #[test]
    fn host_gone_detects_alias_swap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = fixture(&dir);
        assert!(!ctx.host_gone());

        let host = ctx.fsa.host_mut(0).expect("host");
        status::layout::write_bounded(&mut host.host_alias, b"different");
        assert!(ctx.host_gone());
    }

    #[test]
    fn totals_flow_through_the_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = fixture(&dir);
        ctx.update_totals(2, 512).expect("add");
        assert_eq!(ctx.host().expect("host").total_file_counter, 2);
        ctx.update_totals(-2, -512).expect("drain");
        assert_eq!(ctx.host().expect("host").total_file_counter, 0);
    }
}
