//! Append-only record sinks.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Result;

/// An append-only sink, usually a FIFO owned by a log collector.
///
/// Records go out with one `write` call each. For FIFOs that keeps
/// concurrent workers' records from interleaving as long as a record stays
/// within the pipe-buffer atomicity bound, which all record formats in
/// this crate do for realistic name lengths.
#[derive(Debug)]
pub struct FifoSink {
    file: File,
    path: PathBuf,
}

impl FifoSink {
    /// Opens the sink for appending, creating a regular file if the
    /// collector has not set up its FIFO yet.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Appends one record.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.file.write_all(record)?;
        Ok(())
    }

    /// Path this sink appends to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("output.fifo");
        let mut sink = FifoSink::open(&path).expect("open");
        sink.write_record(b"one").expect("write");
        sink.write_record(b"two").expect("write");

        assert_eq!(std::fs::read(&path).expect("read"), b"onetwo");
        assert_eq!(sink.path(), path);
    }
}
