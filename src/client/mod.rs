//! Concrete protocol clients for the worker binaries.
//!
//! The engine only knows the capability traits; these are the plain-TCP
//! implementations the binaries hand it. TLS session coverage is not
//! wired up here yet; jobs asking for it are refused up front rather
//! than silently downgraded.

pub mod ftp;
pub mod smtp;

use protocol::{SessionError, SessionResult};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Maps socket errors onto the session taxonomy.
///
/// Expired socket timeouts surface as `WouldBlock` on Unix; both flavours
/// become the timeout variant so the exit-code folding sees them.
pub(crate) fn io_error(e: std::io::Error, timeout: Duration) -> SessionError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            SessionError::Timeout(timeout)
        }
        _ => SessionError::Io(e),
    }
}

/// Connects with the configured timeout applied to the socket both ways.
pub(crate) fn connect_stream(
    host: &str,
    port: u16,
    timeout: Duration,
) -> SessionResult<TcpStream> {
    let mut last = None;
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| io_error(e, timeout))?;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .map_err(|e| io_error(e, timeout))?;
                stream
                    .set_write_timeout(Some(timeout))
                    .map_err(|e| io_error(e, timeout))?;
                return Ok(stream);
            }
            Err(e) => last = Some(e),
        }
    }
    Err(match last {
        Some(e) => io_error(e, timeout),
        None => SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host resolved to no addresses",
        )),
    })
}

/// A buffered control connection speaking `CODE text` reply lines.
pub(crate) struct ControlChannel {
    reader: BufReader<TcpStream>,
    timeout: Duration,
}

impl ControlChannel {
    pub(crate) fn new(stream: TcpStream, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(stream),
            timeout,
        }
    }

    /// Writes raw bytes to the peer, bypassing the line discipline.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> SessionResult<()> {
        let timeout = self.timeout;
        self.reader
            .get_mut()
            .write_all(bytes)
            .map_err(|e| io_error(e, timeout))
    }

    /// Sends one command line.
    pub(crate) fn command(&mut self, line: &str) -> SessionResult<()> {
        let stream = self.reader.get_mut();
        stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.write_all(b"\r\n"))
            .map_err(|e| io_error(e, self.timeout))
    }

    /// Reads one (possibly multi-line) reply, returning code and text.
    pub(crate) fn reply(&mut self) -> SessionResult<(u16, String)> {
        let mut text = String::new();
        let mut code: Option<u16> = None;
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| io_error(e, self.timeout))?;
            if n == 0 {
                return Err(SessionError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
            let trimmed = line.trim_end();
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(trimmed);

            if trimmed.len() >= 4 {
                let (head, sep) = (&trimmed[..3], trimmed.as_bytes()[3]);
                if let Ok(parsed) = head.parse::<u16>() {
                    match code {
                        None if sep == b' ' => return Ok((parsed, text)),
                        None if sep == b'-' => code = Some(parsed),
                        Some(open) if open == parsed && sep == b' ' => return Ok((parsed, text)),
                        _ => {}
                    }
                }
            } else if trimmed.len() == 3 {
                if let Ok(parsed) = trimmed.parse::<u16>() {
                    if code.is_none() {
                        return Ok((parsed, text));
                    }
                }
            }
        }
    }

    /// Sends a command and expects a reply in the 2xx/3xx class given.
    pub(crate) fn exchange(&mut self, line: &str, accept: &[u16]) -> SessionResult<(u16, String)> {
        self.command(line)?;
        let (code, text) = self.reply()?;
        if accept.contains(&(code / 100)) || accept.contains(&code) {
            Ok((code, text))
        } else {
            Err(SessionError::remote(code, text))
        }
    }
}
