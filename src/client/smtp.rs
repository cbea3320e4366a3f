//! Plain-TCP SMTP delivery client.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use aftcore::{JobDescriptor, TlsAuth};
use protocol::{Envelope, SessionError, SessionResult, StoreSink, parse_queue_id};

use super::{ControlChannel, connect_stream};

/// Blocking SMTP client.
pub struct SmtpClient {
    host: String,
    port: u16,
    helo_name: String,
    user: Option<(String, String)>,
    timeout: Duration,
    control: Option<ControlChannel>,
    in_data: bool,
    last_two: [u8; 2],
}

impl SmtpClient {
    /// Builds a client for the job's gateway.
    ///
    /// TLS-covered sessions are refused until the TLS transport lands.
    pub fn new(db: &JobDescriptor, helo_name: &str) -> SessionResult<Self> {
        if db.tls_auth != TlsAuth::No {
            return Err(SessionError::Unsupported("TLS-covered SMTP session"));
        }
        let user = (!db.user.is_empty() && db.user != "anonymous")
            .then(|| (db.user.clone(), db.password.clone()));
        Ok(Self {
            host: db.hostname.clone(),
            port: db.port,
            helo_name: helo_name.to_owned(),
            user,
            timeout: Duration::from_secs(db.transfer_timeout),
            control: None,
            in_data: false,
            last_two: *b"\r\n",
        })
    }

    fn control(&mut self) -> SessionResult<&mut ControlChannel> {
        self.control
            .as_mut()
            .ok_or(SessionError::Unsupported("no connection"))
    }
}

impl StoreSink for SmtpClient {
    fn connect(&mut self) -> SessionResult<()> {
        let stream = connect_stream(&self.host, self.port, self.timeout)?;
        let mut control = ControlChannel::new(stream, self.timeout);
        let (code, text) = control.reply()?;
        if code != 220 {
            return Err(SessionError::remote(code, text));
        }

        let ehlo = format!("EHLO {}", self.helo_name);
        control.command(&ehlo)?;
        let (code, text) = control.reply()?;
        match code {
            250 => {}
            // Pre-extension servers without authentication needs fall back
            // to the old greeting.
            502 if self.user.is_none() => {
                control.exchange(&format!("HELO {}", self.helo_name), &[2])?;
            }
            _ => return Err(SessionError::remote(code, text)),
        }

        if let Some((user, password)) = self.user.clone() {
            let token = BASE64.encode(format!("\0{user}\0{password}"));
            control.exchange(&format!("AUTH PLAIN {token}"), &[235])?;
        }
        self.control = Some(control);
        Ok(())
    }

    fn store_open(&mut self, envelope: &Envelope) -> SessionResult<()> {
        let control = self.control()?;
        control.exchange(&format!("MAIL FROM:<{}>", envelope.from), &[2])?;
        for recipient in &envelope.recipients {
            control.exchange(&format!("RCPT TO:<{recipient}>"), &[2])?;
        }
        control.exchange("DATA", &[354, 3])?;
        self.in_data = true;
        self.last_two = *b"\r\n";
        Ok(())
    }

    fn write_block(&mut self, block: &[u8]) -> SessionResult<()> {
        if !self.in_data {
            return Err(SessionError::Unsupported("no open message"));
        }
        // Dot-stuffing: a line that starts with '.' doubles it, tracked
        // across block boundaries.
        let mut stuffed = Vec::with_capacity(block.len() + 8);
        let mut last_two = self.last_two;
        for &b in block {
            if b == b'.' && last_two == *b"\r\n" {
                stuffed.push(b'.');
            }
            stuffed.push(b);
            last_two = [last_two[1], b];
        }
        self.last_two = last_two;
        self.control()?.write_raw(&stuffed)
    }

    fn store_close(&mut self) -> SessionResult<Option<String>> {
        if !self.in_data {
            return Err(SessionError::Unsupported("no open message"));
        }
        let terminator: &[u8] = if self.last_two == *b"\r\n" {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };
        self.control()?.write_raw(terminator)?;
        self.in_data = false;
        let (code, text) = self.control()?.reply()?;
        if code / 100 != 2 {
            return Err(SessionError::remote(code, text));
        }
        Ok(parse_queue_id(&text).map(str::to_owned))
    }

    fn quit(&mut self) -> SessionResult<()> {
        if self.control.is_some() {
            let _ = self.control()?.exchange("QUIT", &[2]);
        }
        self.control = None;
        Ok(())
    }
}
