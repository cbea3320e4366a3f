//! Plain-TCP FTP retrieve client.

use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use aftcore::{JobDescriptor, TlsAuth};
use listing::parse_mlsd;
use protocol::{
    DirMtime, FeatureSet, FetchSource, ListKind, SessionError, SessionResult, TransferKind,
};

use super::{ControlChannel, connect_stream, io_error};

/// Blocking FTP client over the control/data channel pair.
pub struct FtpClient {
    host: String,
    port: u16,
    timeout: Duration,
    control: Option<ControlChannel>,
    data: Option<TcpStream>,
}

impl FtpClient {
    /// Builds a client for the job's host.
    ///
    /// TLS-covered sessions are refused until the TLS transport lands.
    pub fn new(db: &JobDescriptor) -> SessionResult<Self> {
        if db.tls_auth != TlsAuth::No {
            return Err(SessionError::Unsupported("TLS-covered FTP session"));
        }
        Ok(Self {
            host: db.hostname.clone(),
            port: db.port,
            timeout: Duration::from_secs(db.transfer_timeout),
            control: None,
            data: None,
        })
    }

    fn control(&mut self) -> SessionResult<&mut ControlChannel> {
        self.control
            .as_mut()
            .ok_or(SessionError::Unsupported("no control connection"))
    }

    /// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
    fn parse_passive(text: &str) -> Option<(String, u16)> {
        let open = text.find('(')?;
        let close = text[open..].find(')')? + open;
        let fields: Vec<u16> = text[open + 1..close]
            .split(',')
            .map(|f| f.trim().parse::<u16>())
            .collect::<Result<_, _>>()
            .ok()?;
        if fields.len() != 6 {
            return None;
        }
        let host = format!("{}.{}.{}.{}", fields[0], fields[1], fields[2], fields[3]);
        Some((host, fields[4] * 256 + fields[5]))
    }

    fn open_data(&mut self) -> SessionResult<TcpStream> {
        let timeout = self.timeout;
        let (_, text) = self.control()?.exchange("PASV", &[2])?;
        let (host, port) = Self::parse_passive(&text)
            .ok_or_else(|| SessionError::remote(227, "unparsable passive reply"))?;
        connect_stream(&host, port, timeout)
    }

    fn drain_data(&mut self) -> SessionResult<Vec<u8>> {
        let timeout = self.timeout;
        let mut data = self
            .data
            .take()
            .ok_or(SessionError::Unsupported("no data connection"))?;
        let mut body = Vec::new();
        data.read_to_end(&mut body).map_err(|e| io_error(e, timeout))?;
        drop(data);
        let (code, text) = self.control()?.reply()?;
        if code / 100 != 2 {
            return Err(SessionError::remote(code, text));
        }
        Ok(body)
    }
}

impl FetchSource for FtpClient {
    fn connect(&mut self) -> SessionResult<u16> {
        let stream = connect_stream(&self.host, self.port, self.timeout)?;
        let mut control = ControlChannel::new(stream, self.timeout);
        let (code, text) = control.reply()?;
        if code / 100 != 2 {
            return Err(SessionError::remote(code, text));
        }
        self.control = Some(control);
        Ok(code)
    }

    fn login(&mut self, user: &str, password: &str) -> SessionResult<()> {
        let control = self.control()?;
        let (code, _) = control.exchange(&format!("USER {user}"), &[2, 3])?;
        if code / 100 == 3 {
            control.exchange(&format!("PASS {password}"), &[2])?;
        }
        Ok(())
    }

    fn set_idle(&mut self, seconds: u32) -> SessionResult<()> {
        self.control()?
            .exchange(&format!("SITE IDLE {seconds}"), &[2])?;
        Ok(())
    }

    fn features(&mut self) -> SessionResult<FeatureSet> {
        let (_, text) = self.control()?.exchange("FEAT", &[2])?;
        Ok(FeatureSet::parse(&text))
    }

    fn set_transfer_kind(&mut self, kind: TransferKind) -> SessionResult<()> {
        let code = match kind {
            TransferKind::Ascii => "A",
            TransferKind::Binary | TransferKind::AutoDetect => "I",
            TransferKind::None => return Ok(()),
        };
        self.control()?.exchange(&format!("TYPE {code}"), &[2])?;
        Ok(())
    }

    fn change_dir(&mut self, dir: &str) -> SessionResult<()> {
        self.control()?.exchange(&format!("CWD {dir}"), &[2])?;
        Ok(())
    }

    fn dir_mtime(&mut self) -> SessionResult<DirMtime> {
        let (_, text) = self.control()?.exchange("MLST .", &[2])?;
        for line in text.lines() {
            let line = line.trim_start();
            if line.to_ascii_lowercase().contains("modify=") {
                let (entries, _) = parse_mlsd(format!("{line}\r\n").as_bytes(), 1024);
                if let Some(entry) = entries.first() {
                    if entry.got_date {
                        return Ok(DirMtime::Known(entry.mtime));
                    }
                }
            }
        }
        Ok(DirMtime::Unavailable)
    }

    fn list(&mut self, kind: ListKind) -> SessionResult<Vec<u8>> {
        let command = match kind {
            ListKind::Machine => "MLSD",
            ListKind::Long => "LIST",
            ListKind::Stat => return Err(SessionError::Unsupported("STAT listings")),
        };
        let data = self.open_data()?;
        self.data = Some(data);
        match self.control()?.exchange(command, &[1, 2]) {
            Ok(_) => {}
            Err(e) => {
                self.data = None;
                return Err(e);
            }
        }
        self.drain_data()
    }

    fn retr_open(&mut self, name: &str, offset: i64) -> SessionResult<()> {
        let data = self.open_data()?;
        if offset > 0 {
            self.control()?
                .exchange(&format!("REST {offset}"), &[3])?;
        }
        match self.control()?.exchange(&format!("RETR {name}"), &[1]) {
            Ok(_) => {
                self.data = Some(data);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_block(&mut self, buf: &mut [u8]) -> SessionResult<usize> {
        let timeout = self.timeout;
        let data = self
            .data
            .as_mut()
            .ok_or(SessionError::Unsupported("no data connection"))?;
        data.read(buf).map_err(|e| io_error(e, timeout))
    }

    fn close_data(&mut self) -> SessionResult<()> {
        self.data = None;
        let (code, text) = self.control()?.reply()?;
        if code / 100 == 2 {
            Ok(())
        } else {
            Err(SessionError::remote(code, text))
        }
    }

    fn file_mtime(&mut self, name: &str) -> SessionResult<Option<i64>> {
        let (_, text) = self.control()?.exchange(&format!("MDTM {name}"), &[2])?;
        let stamp = text.split_whitespace().nth(1).unwrap_or_default();
        let line = format!("modify={stamp};type=file; x\r\n");
        let (entries, _) = parse_mlsd(line.as_bytes(), 64);
        Ok(entries.first().filter(|e| e.got_date).map(|e| e.mtime))
    }

    fn delete_remote(&mut self, name: &str) -> SessionResult<()> {
        self.control()?.exchange(&format!("DELE {name}"), &[2])?;
        Ok(())
    }

    fn quit(&mut self) -> SessionResult<()> {
        if self.control.is_some() {
            let _ = self.control()?.exchange("QUIT", &[2]);
        }
        self.control = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passive_reply_parses_host_and_port() {
        let (host, port) =
            FtpClient::parse_passive("227 Entering Passive Mode (192,168,1,9,19,137)")
                .expect("parse");
        assert_eq!(host, "192.168.1.9");
        assert_eq!(port, 19 * 256 + 137);
    }

    #[test]
    fn malformed_passive_reply_is_rejected() {
        assert!(FtpClient::parse_passive("227 whatever").is_none());
        assert!(FtpClient::parse_passive("227 (1,2,3)").is_none());
    }
}
