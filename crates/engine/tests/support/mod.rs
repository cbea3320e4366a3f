//! Shared fixtures for the worker scenario tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;

use aftcore::{JobDescriptor, WorkArea, WorkerContext};
use engine::WorkerLogs;
use listing::{FileMask, MaskMatch};
use logging::{FifoSink, OutputRecord, TransLog};
use protocol::{
    DirMtime, Envelope, FeatureSet, FetchSource, ListKind, SessionError, SessionResult,
    TransferKind,
};
use status::layout::{DirEntry, HostEntry};
use status::{Fra, Fsa};

/// A worker environment over a temp directory: tables, logs, spool paths.
pub struct Fixture {
    pub ctx: WorkerContext,
    pub logs: WorkerLogs,
    pub incoming: PathBuf,
    pub log_dir: PathBuf,
}

impl Fixture {
    /// Builds the tables and context, letting the test shape the host and
    /// directory records before they are written.
    pub fn new(
        tmp: &tempfile::TempDir,
        edit_host: impl FnOnce(&mut HostEntry),
        edit_dir: impl FnOnce(&mut DirEntry),
        edit_db: impl FnOnce(&mut JobDescriptor),
    ) -> Self {
        let work = WorkArea::new(tmp.path());
        std::fs::create_dir_all(work.fifodir()).expect("fifodir");
        let incoming = tmp.path().join("incoming_files");
        std::fs::create_dir_all(&incoming).expect("incoming");

        let mut host = HostEntry::new("alpha", "alpha.example.net");
        edit_host(&mut host);
        Fsa::create(&work.host_table(), &[host]).expect("host table");

        let mut dir = DirEntry::new("wx-charts");
        status::layout::write_bounded(
            &mut dir.retrieve_work_dir,
            incoming.to_string_lossy().as_bytes(),
        );
        edit_dir(&mut dir);
        Fra::create(&work.dir_table(), &[dir]).expect("dir table");

        let mut db = JobDescriptor::default();
        db.host_alias = "alpha".to_owned();
        db.hostname = "alpha.example.net".to_owned();
        db.dir_alias = "wx-charts".to_owned();
        db.fra_pos = Some(0);
        db.transfer_kind = TransferKind::Binary;
        edit_db(&mut db);

        let ctx = WorkerContext::attach(work, db).expect("attach");

        let log_dir = tmp.path().join("logs");
        std::fs::create_dir_all(&log_dir).expect("logs");
        let logs = WorkerLogs {
            trans: TransLog::new(
                FifoSink::open(&log_dir.join("transfer.log")).expect("trans sink"),
                "alpha",
                0,
            ),
            output: FifoSink::open(&log_dir.join("output.log")).expect("output sink"),
            delete: FifoSink::open(&log_dir.join("delete.log")).expect("delete sink"),
        };

        Self {
            ctx,
            logs,
            incoming,
            log_dir,
        }
    }

    pub fn output_records(&self) -> Vec<OutputRecord> {
        decode_output_records(&std::fs::read(self.log_dir.join("output.log")).unwrap_or_default())
    }

    pub fn delete_log_bytes(&self) -> Vec<u8> {
        std::fs::read(self.log_dir.join("delete.log")).unwrap_or_default()
    }

    pub fn trans_log(&self) -> String {
        std::fs::read_to_string(self.log_dir.join("transfer.log")).unwrap_or_default()
    }
}

/// Splits a concatenated output-log stream back into records.
pub fn decode_output_records(mut bytes: &[u8]) -> Vec<OutputRecord> {
    let mut records = Vec::new();
    while bytes.len() >= 31 {
        let unique = u16::from_le_bytes([bytes[24], bytes[25]]) as usize;
        let name = u16::from_le_bytes([bytes[26], bytes[27]]) as usize;
        let archive = u16::from_le_bytes([bytes[28], bytes[29]]) as usize;
        let total = 31 + unique + name + archive;
        let (head, rest) = bytes.split_at(total);
        records.push(OutputRecord::decode(head).expect("record"));
        bytes = rest;
    }
    records
}

/// One mask group admitting everything.
pub fn admit_all() -> Vec<Vec<Box<dyn FileMask>>> {
    struct All;
    impl FileMask for All {
        fn matches(&self, _: &str) -> MaskMatch {
            MaskMatch::Match
        }
    }
    vec![vec![Box::new(All)]]
}

/// Scripted retrieve client for the fetch scenarios.
pub struct MockFetch {
    pub listing: Vec<u8>,
    pub files: HashMap<String, Vec<u8>>,
    pub dir_mtime: DirMtime,
    pub features: FeatureSet,
    pub fail_open: HashMap<String, u16>,
    pub deleted: Vec<String>,
    pub calls: Vec<String>,
    data: Option<(Vec<u8>, usize)>,
}

impl MockFetch {
    pub fn new(listing: &[u8]) -> Self {
        Self {
            listing: listing.to_vec(),
            files: HashMap::new(),
            dir_mtime: DirMtime::Unavailable,
            features: FeatureSet::MLST_MODIFY | FeatureSet::MLST_SIZE | FeatureSet::MLST_TYPE,
            fail_open: HashMap::new(),
            deleted: Vec::new(),
            calls: Vec::new(),
            data: None,
        }
    }

    pub fn serve(&mut self, name: &str, content: &[u8]) {
        self.files.insert(name.to_owned(), content.to_vec());
    }
}

impl FetchSource for MockFetch {
    fn connect(&mut self) -> SessionResult<u16> {
        self.calls.push("CONNECT".to_owned());
        Ok(220)
    }

    fn login(&mut self, user: &str, _password: &str) -> SessionResult<()> {
        self.calls.push(format!("USER {user}"));
        Ok(())
    }

    fn set_idle(&mut self, _seconds: u32) -> SessionResult<()> {
        Ok(())
    }

    fn features(&mut self) -> SessionResult<FeatureSet> {
        Ok(self.features)
    }

    fn set_transfer_kind(&mut self, _kind: TransferKind) -> SessionResult<()> {
        self.calls.push("TYPE".to_owned());
        Ok(())
    }

    fn change_dir(&mut self, dir: &str) -> SessionResult<()> {
        self.calls.push(format!("CWD {dir}"));
        Ok(())
    }

    fn dir_mtime(&mut self) -> SessionResult<DirMtime> {
        self.calls.push("MLST .".to_owned());
        Ok(self.dir_mtime)
    }

    fn list(&mut self, _kind: ListKind) -> SessionResult<Vec<u8>> {
        self.calls.push("MLSD".to_owned());
        Ok(self.listing.clone())
    }

    fn retr_open(&mut self, name: &str, offset: i64) -> SessionResult<()> {
        self.calls.push(format!("RETR {name} {offset}"));
        if let Some(&code) = self.fail_open.get(name) {
            return Err(SessionError::remote(code, "No such file or directory"));
        }
        let content = self
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::remote(550, "No such file or directory"))?;
        self.data = Some((content, offset.max(0) as usize));
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> SessionResult<usize> {
        let Some((content, pos)) = self.data.as_mut() else {
            return Err(SessionError::remote(425, "no data connection"));
        };
        let remaining = &content[(*pos).min(content.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        *pos += n;
        Ok(n)
    }

    fn close_data(&mut self) -> SessionResult<()> {
        self.data = None;
        Ok(())
    }

    fn file_mtime(&mut self, name: &str) -> SessionResult<Option<i64>> {
        self.calls.push(format!("MDTM {name}"));
        Ok(None)
    }

    fn delete_remote(&mut self, name: &str) -> SessionResult<()> {
        self.calls.push(format!("DELE {name}"));
        self.deleted.push(name.to_owned());
        Ok(())
    }

    fn quit(&mut self) -> SessionResult<()> {
        self.calls.push("QUIT".to_owned());
        Ok(())
    }
}

/// Scripted delivery client for the send scenarios.
pub struct MockSink {
    pub wire: Vec<u8>,
    pub envelopes: Vec<Envelope>,
    pub queue_id: Option<String>,
    pub reject_recipients: bool,
    pub closes: usize,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            wire: Vec::new(),
            envelopes: Vec::new(),
            queue_id: Some("4JkX0w1r2Vz".to_owned()),
            reject_recipients: false,
            closes: 0,
        }
    }

    pub fn wire_text(&self) -> String {
        String::from_utf8_lossy(&self.wire).into_owned()
    }
}

impl protocol::StoreSink for MockSink {
    fn connect(&mut self) -> SessionResult<()> {
        Ok(())
    }

    fn store_open(&mut self, envelope: &Envelope) -> SessionResult<()> {
        if self.reject_recipients {
            return Err(SessionError::remote(
                550,
                "5.1.1 <nobody@example.net>: Recipient address rejected: User unknown",
            ));
        }
        self.envelopes.push(envelope.clone());
        Ok(())
    }

    fn write_block(&mut self, block: &[u8]) -> SessionResult<()> {
        self.wire.extend_from_slice(block);
        Ok(())
    }

    fn store_close(&mut self) -> SessionResult<Option<String>> {
        self.closes += 1;
        Ok(self.queue_id.clone())
    }

    fn quit(&mut self) -> SessionResult<()> {
        Ok(())
    }
}
