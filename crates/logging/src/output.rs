//! The binary output-log record.
//!
//! One record per file the engine finished with, whatever the outcome:
//! delivered, received, or discarded by a policy. The collector replays
//! these records into the user-visible history, so the layout is frozen.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

use crate::{LogError, Result};

/// What happened to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputKind {
    /// Fetched from a remote directory into the local spool.
    NormalReceived = 0,
    /// Delivered to the remote side.
    NormalDelivered = 1,
    /// Discarded locally because it exceeded the job's age limit.
    AgeLimitDelete = 2,
    /// Discarded locally as a duplicate.
    DuplicateDelete = 3,
    /// Parked in the duplicate store.
    DuplicateStored = 4,
    /// Discarded because the remote side rejected the recipient.
    AddressRejectedDelete = 5,
}

impl OutputKind {
    /// Decodes the stored discriminant.
    pub fn from_u8(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => Self::NormalReceived,
            1 => Self::NormalDelivered,
            2 => Self::AgeLimitDelete,
            3 => Self::DuplicateDelete,
            4 => Self::DuplicateStored,
            5 => Self::AddressRejectedDelete,
            _ => return Err(LogError::Malformed("unknown output kind")),
        })
    }
}

/// One output-log record.
///
/// Wire layout, all integers little-endian:
///
/// ```text
/// [retries:u32][job_id:u32][file_size:i64][transfer_millis:u64]
/// [unique_len:u16][name_len:u16][archive_len:u16][kind:u8]
/// [unique_name bytes][file_name bytes][archive_name bytes]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// How many times the scheduler re-ran the job before this outcome.
    pub retries: u32,
    /// Job identifier.
    pub job_id: u32,
    /// Final size of the file in bytes.
    pub file_size: i64,
    /// Wall-clock transfer duration in milliseconds.
    pub transfer_millis: u64,
    /// Outcome discriminant.
    pub kind: OutputKind,
    /// Unique name of the producing job directory.
    pub unique_name: String,
    /// File name, local and remote separated by `/` when they differ.
    pub file_name: String,
    /// Archive path when the file was archived, empty otherwise.
    pub archive_name: String,
}

impl OutputRecord {
    /// Serializes the record into its wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            31 + self.unique_name.len() + self.file_name.len() + self.archive_name.len(),
        );
        // Writing into a Vec cannot fail.
        let _ = buf.write_u32::<LittleEndian>(self.retries);
        let _ = buf.write_u32::<LittleEndian>(self.job_id);
        let _ = buf.write_i64::<LittleEndian>(self.file_size);
        let _ = buf.write_u64::<LittleEndian>(self.transfer_millis);
        let _ = buf.write_u16::<LittleEndian>(self.unique_name.len() as u16);
        let _ = buf.write_u16::<LittleEndian>(self.file_name.len() as u16);
        let _ = buf.write_u16::<LittleEndian>(self.archive_name.len() as u16);
        let _ = buf.write_u8(self.kind as u8);
        buf.extend_from_slice(self.unique_name.as_bytes());
        buf.extend_from_slice(self.file_name.as_bytes());
        buf.extend_from_slice(self.archive_name.as_bytes());
        buf
    }

    /// Decodes one record from its wire form.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let retries = buf.read_u32::<LittleEndian>()?;
        let job_id = buf.read_u32::<LittleEndian>()?;
        let file_size = buf.read_i64::<LittleEndian>()?;
        let transfer_millis = buf.read_u64::<LittleEndian>()?;
        let unique_len = buf.read_u16::<LittleEndian>()? as usize;
        let name_len = buf.read_u16::<LittleEndian>()? as usize;
        let archive_len = buf.read_u16::<LittleEndian>()? as usize;
        let kind = OutputKind::from_u8(buf.read_u8()?)?;

        if buf.len() != unique_len + name_len + archive_len {
            return Err(LogError::Malformed("name section length mismatch"));
        }
        let mut read_string = |len: usize| -> Result<String> {
            let mut bytes = vec![0u8; len];
            buf.read_exact(&mut bytes)?;
            String::from_utf8(bytes).map_err(|_| LogError::Malformed("name is not UTF-8"))
        };
        let unique_name = read_string(unique_len)?;
        let file_name = read_string(name_len)?;
        let archive_name = read_string(archive_len)?;

        Ok(Self {
            retries,
            job_id,
            file_size,
            transfer_millis,
            kind,
            unique_name,
            file_name,
            archive_name,
        })
    }
}
