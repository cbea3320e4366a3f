//! Queue-receipt extraction from delivery replies.

use memchr::memmem;

/// Longest queue identifier the output log will carry.
pub const MAX_QUEUE_ID_LEN: usize = 64;

/// Extracts the queue identifier from a final delivery reply.
///
/// Matches the two reply shapes mail servers commonly produce:
///
/// ```text
/// 250 Ok: queued as 4JkX0w1r2Vz
/// 250 2.0.0 Ok: queued as 4JkX0w1r2Vz
/// ```
///
/// The identifier is cut at whitespace or [`MAX_QUEUE_ID_LEN`], whichever
/// comes first. Any other reply yields `None`.
#[must_use]
pub fn parse_queue_id(reply: &str) -> Option<&str> {
    if !reply.starts_with("250 ") {
        return None;
    }
    let marker = memmem::find(reply.as_bytes(), b"Ok: queued as ")?;
    let id = &reply[marker + "Ok: queued as ".len()..];
    let end = id
        .find(|c: char| c.is_whitespace())
        .unwrap_or(id.len())
        .min(MAX_QUEUE_ID_LEN);
    let id = &id[..end];
    (!id.is_empty()).then_some(id)
}
