//! The binary delete-log record.

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

use crate::{LogError, Result};

bitflags! {
    /// Why a file was removed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeleteReason: u32 {
        /// Exceeded the job's age limit before transmission.
        const AGE_OUTPUT = 1 << 0;
        /// Identified as a duplicate of an earlier file.
        const DUP_OUTPUT = 1 << 1;
        /// The remote server refused to hand the file out.
        const UNREADABLE = 1 << 2;
        /// The remote server rejected the recipient address.
        const RECIPIENT_REJECTED = 1 << 3;
        /// No file mask admits the remote file and policy removes such files.
        const UNKNOWN_FILE = 1 << 4;
    }
}

/// One delete-log record.
///
/// Wire layout, all integers little-endian:
///
/// ```text
/// [job_id:u32][dir_id:u32][reason:u32][file_size:i64][when:i64]
/// [host_len:u16][name_len:u16][tag_len:u16]
/// [host_alias bytes][file_name bytes][proc_tag bytes]
/// ```
///
/// `proc_tag` names the worker flavour that removed the file, e.g.
/// `SEND_FILE_SMTP`, optionally suffixed with the age that triggered the
/// removal; build it with [`DeleteRecord::proc_tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRecord {
    /// Job identifier, 0 on the fetch path.
    pub job_id: u32,
    /// Directory identifier, 0 on the send path.
    pub dir_id: u32,
    /// Why the file was removed.
    pub reason: DeleteReason,
    /// Size of the removed file in bytes.
    pub file_size: i64,
    /// Unix time of the removal.
    pub when: i64,
    /// Host alias the job belonged to.
    pub host_alias: String,
    /// Name of the removed file.
    pub file_name: String,
    /// Worker tag, see [`DeleteRecord::proc_tag`].
    pub proc_tag: String,
}

impl DeleteRecord {
    /// Builds the worker tag, e.g. `SEND_FILE_SMTP [4000s]`.
    #[must_use]
    pub fn proc_tag(flavour: &str, protocol: &str, age_secs: Option<i64>) -> String {
        match age_secs {
            Some(age) => format!("{flavour}_{protocol} [{age}s]"),
            None => format!("{flavour}_{protocol}"),
        }
    }

    /// Serializes the record into its wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            34 + self.host_alias.len() + self.file_name.len() + self.proc_tag.len(),
        );
        let _ = buf.write_u32::<LittleEndian>(self.job_id);
        let _ = buf.write_u32::<LittleEndian>(self.dir_id);
        let _ = buf.write_u32::<LittleEndian>(self.reason.bits());
        let _ = buf.write_i64::<LittleEndian>(self.file_size);
        let _ = buf.write_i64::<LittleEndian>(self.when);
        let _ = buf.write_u16::<LittleEndian>(self.host_alias.len() as u16);
        let _ = buf.write_u16::<LittleEndian>(self.file_name.len() as u16);
        let _ = buf.write_u16::<LittleEndian>(self.proc_tag.len() as u16);
        buf.extend_from_slice(self.host_alias.as_bytes());
        buf.extend_from_slice(self.file_name.as_bytes());
        buf.extend_from_slice(self.proc_tag.as_bytes());
        buf
    }

    /// Decodes one record from its wire form.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let job_id = buf.read_u32::<LittleEndian>()?;
        let dir_id = buf.read_u32::<LittleEndian>()?;
        let reason = DeleteReason::from_bits_truncate(buf.read_u32::<LittleEndian>()?);
        let file_size = buf.read_i64::<LittleEndian>()?;
        let when = buf.read_i64::<LittleEndian>()?;
        let host_len = buf.read_u16::<LittleEndian>()? as usize;
        let name_len = buf.read_u16::<LittleEndian>()? as usize;
        let tag_len = buf.read_u16::<LittleEndian>()? as usize;

        if buf.len() != host_len + name_len + tag_len {
            return Err(LogError::Malformed("name section length mismatch"));
        }
        let mut read_string = |len: usize| -> Result<String> {
            let mut bytes = vec![0u8; len];
            buf.read_exact(&mut bytes)?;
            String::from_utf8(bytes).map_err(|_| LogError::Malformed("name is not UTF-8"))
        };
        let host_alias = read_string(host_len)?;
        let file_name = read_string(name_len)?;
        let proc_tag = read_string(tag_len)?;

        Ok(Self {
            job_id,
            dir_id,
            reason,
            file_size,
            when,
            host_alias,
            file_name,
            proc_tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let rec = DeleteRecord {
            job_id: 77,
            dir_id: 0,
            reason: DeleteReason::AGE_OUTPUT,
            file_size: 2048,
            when: 1_700_000_000,
            host_alias: "alpha".to_owned(),
            file_name: "old.grib".to_owned(),
            proc_tag: DeleteRecord::proc_tag("SEND_FILE", "SMTP", Some(4000)),
        };
        let decoded = DeleteRecord::decode(&rec.encode()).expect("decode");
        assert_eq!(decoded, rec);
        assert_eq!(decoded.proc_tag, "SEND_FILE_SMTP [4000s]");
    }

    #[test]
    fn tag_without_age_has_no_suffix() {
        assert_eq!(
            DeleteRecord::proc_tag("GET_FILE", "FTP", None),
            "GET_FILE_FTP"
        );
    }

    #[test]
    fn truncated_record_is_rejected() {
        let rec = DeleteRecord {
            job_id: 1,
            dir_id: 2,
            reason: DeleteReason::UNREADABLE,
            file_size: 1,
            when: 0,
            host_alias: "h".to_owned(),
            file_name: "f".to_owned(),
            proc_tag: "GET_FILE_FTP".to_owned(),
        };
        let bytes = rec.encode();
        assert!(DeleteRecord::decode(&bytes[..10]).is_err());
    }
}
