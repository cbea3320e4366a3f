//! Capability traits the worker state machines drive.

use crate::feat::FeatureSet;
use crate::reply::SessionResult;

/// Transfer representation requested after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Line-oriented text with end-of-line conversion.
    Ascii,
    /// Verbatim bytes.
    Binary,
    /// Leave whatever the server defaults to.
    None,
    /// Pick per file from the name.
    AutoDetect,
}

/// Which listing command a scan should issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Machine listing (MLSD).
    Machine,
    /// Plain LIST text.
    Long,
    /// STAT-based listing on the control connection.
    Stat,
}

/// Result of asking for the listed directory's own modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirMtime {
    /// The server reported this Unix time.
    Known(i64),
    /// The server cannot say.
    Unavailable,
}

/// Capability set of a retrieve client.
///
/// One method per protocol operation the fetch state machine needs; the
/// concrete client owns sockets, TLS, and reply parsing. Methods block and
/// honour the configured transfer timeout, surfacing expiry as
/// [`crate::SessionError::Timeout`].
pub trait FetchSource {
    /// Establishes the control connection.
    ///
    /// Returns the greeting reply code; 230 means the server considers the
    /// session authenticated already and login may be skipped.
    fn connect(&mut self) -> SessionResult<u16>;

    /// Authenticates the session.
    fn login(&mut self, user: &str, password: &str) -> SessionResult<()>;

    /// Sets the server idle timer, where supported.
    fn set_idle(&mut self, seconds: u32) -> SessionResult<()>;

    /// Negotiates optional features.
    fn features(&mut self) -> SessionResult<FeatureSet>;

    /// Selects the transfer representation.
    fn set_transfer_kind(&mut self, kind: TransferKind) -> SessionResult<()>;

    /// Changes the remote working directory.
    fn change_dir(&mut self, dir: &str) -> SessionResult<()>;

    /// Modification time of the current remote directory.
    fn dir_mtime(&mut self) -> SessionResult<DirMtime>;

    /// Runs a listing command and returns the raw response body.
    fn list(&mut self, kind: ListKind) -> SessionResult<Vec<u8>>;

    /// Opens a download of `name`, resuming at `offset` when non-zero.
    fn retr_open(&mut self, name: &str, offset: i64) -> SessionResult<()>;

    /// Reads the next block of the open download.
    ///
    /// A short read of zero bytes is end of file.
    fn read_block(&mut self, buf: &mut [u8]) -> SessionResult<usize>;

    /// Closes the data channel of the open download.
    fn close_data(&mut self) -> SessionResult<()>;

    /// Modification time of a single remote file, where supported.
    fn file_mtime(&mut self, name: &str) -> SessionResult<Option<i64>>;

    /// Deletes a remote file.
    fn delete_remote(&mut self, name: &str) -> SessionResult<()>;

    /// Ends the session politely.
    fn quit(&mut self) -> SessionResult<()>;
}

/// Delivery envelope for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender address.
    pub from: String,
    /// All recipient addresses.
    pub recipients: Vec<String>,
}

/// Capability set of a delivery client.
///
/// The send state machine opens one envelope per message, streams the
/// framed body in blocks, and closes to obtain the server's queue receipt.
pub trait StoreSink {
    /// Establishes the connection and greets the server.
    ///
    /// Performs the extended greeting with fallback, the TLS upgrade when
    /// configured, and authentication.
    fn connect(&mut self) -> SessionResult<()>;

    /// Opens the envelope: sender, recipients, and the data channel.
    fn store_open(&mut self, envelope: &Envelope) -> SessionResult<()>;

    /// Streams one block of the message body.
    fn write_block(&mut self, block: &[u8]) -> SessionResult<()>;

    /// Terminates the message and returns the queue identifier the server
    /// reported, if any.
    fn store_close(&mut self) -> SessionResult<Option<String>>;

    /// Ends the session politely.
    fn quit(&mut self) -> SessionResult<()>;
}
