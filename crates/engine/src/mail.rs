//! MIME framing for the send path.
//!
//! The send worker composes one RFC 5322 message per envelope: headers,
//! optionally a multipart wrapper with one part per file, base64 bodies
//! for attachments, and end-of-line discipline for text bodies. Nothing
//! here touches the wire; the framing functions return bytes the worker
//! streams through its client.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};

/// Profile of the message the job wants composed.
#[derive(Debug, Clone, Default)]
pub struct MailProfile {
    /// `From` address.
    pub from: String,
    /// Optional `Reply-To` address.
    pub reply_to: Option<String>,
    /// Subject template; one `%s` is replaced with the file names.
    pub subject: Option<String>,
    /// Charset announced for text bodies.
    pub charset: String,
    /// Group name shown instead of members when hiding recipients.
    pub group_name: Option<String>,
    /// Show every recipient in `To`.
    pub show_all_members: bool,
    /// Template emitted as the leading text part of each message.
    pub header_template: Option<String>,
}

impl MailProfile {
    /// Default charset applied when the job does not name one.
    pub const DEFAULT_CHARSET: &'static str = "ISO-8859-1";

    /// The charset to announce.
    #[must_use]
    pub fn charset(&self) -> &str {
        if self.charset.is_empty() {
            Self::DEFAULT_CHARSET
        } else {
            &self.charset
        }
    }
}

/// Derives the multipart boundary from the job's unique name.
///
/// Delimiter lines start with `--`, which the base64 alphabet cannot
/// produce, so encoded bodies never collide with the boundary.
#[must_use]
pub fn boundary(msg_name: &str) -> String {
    format!("----=_Part_{msg_name}")
}

/// Expands the subject template with the file name(s).
///
/// A single `%s` placeholder receives `names` joined by `, `; without a
/// placeholder the template is used as is.
#[must_use]
pub fn expand_subject(template: &str, names: &[&str]) -> String {
    match template.find("%s") {
        Some(pos) => {
            let mut subject = String::with_capacity(template.len() + 32);
            subject.push_str(&template[..pos]);
            subject.push_str(&names.join(", "));
            subject.push_str(&template[pos + 2..]);
            subject
        }
        None => template.to_owned(),
    }
}

/// MIME-encodes a subject when it leaves pure ASCII.
#[must_use]
pub fn encode_subject(subject: &str, charset: &str) -> String {
    if subject.is_ascii() {
        subject.to_owned()
    } else {
        format!("=?{charset}?B?{}?=", BASE64.encode(subject.as_bytes()))
    }
}

/// Renders the header block of one message.
///
/// `multipart_boundary` selects between a multipart wrapper and a single
/// plain-text part.
#[must_use]
pub fn message_headers(
    profile: &MailProfile,
    date: DateTime<Utc>,
    recipients: &[String],
    subject: Option<&str>,
    multipart_boundary: Option<&str>,
) -> String {
    let mut head = String::with_capacity(256);
    head.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
    head.push_str(&format!("From: {}\r\n", profile.from));
    if let Some(reply_to) = &profile.reply_to {
        head.push_str(&format!("Reply-To: {reply_to}\r\n"));
    }
    if let Some(subject) = subject {
        head.push_str(&format!(
            "Subject: {}\r\n",
            encode_subject(subject, profile.charset())
        ));
    }

    match (&profile.group_name, profile.show_all_members) {
        (Some(group), false) => {
            // Members stay hidden behind the list name.
            head.push_str(&format!("To: {group}:;\r\n"));
            head.push_str(&format!("Bcc: {}\r\n", recipients.join(", ")));
        }
        _ => {
            head.push_str(&format!("To: {}\r\n", recipients.join(", ")));
        }
    }

    head.push_str("MIME-Version: 1.0\r\n");
    match multipart_boundary {
        Some(boundary) => {
            head.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"
            ));
        }
        None => {
            head.push_str(&format!(
                "Content-Type: text/plain; charset={}\r\n",
                profile.charset()
            ));
        }
    }
    head.push_str("\r\n");
    head
}

/// Opens one attachment part inside a multipart message.
#[must_use]
pub fn open_attachment_part(boundary: &str, file_name: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Type: {}; name=\"{file_name}\"\r\nContent-Transfer-Encoding: base64\r\nContent-Disposition: attachment; filename=\"{file_name}\"\r\n\r\n",
        content_type_for(file_name)
    )
}

/// Opens a plain-text part inside a multipart message.
#[must_use]
pub fn open_text_part(boundary: &str, charset: &str) -> String {
    format!("--{boundary}\r\nContent-Type: text/plain; charset={charset}\r\n\r\n")
}

/// Closes a multipart message.
#[must_use]
pub fn close_parts(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

/// Infers the attachment content type from the file extension.
#[must_use]
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt" | "log" | "csv") => "text/plain",
        Some("htm" | "html") => "text/html",
        Some("xml") => "text/xml",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("tif" | "tiff") => "image/tiff",
        Some("zip") => "application/zip",
        Some("gz" | "bz2" | "xz") => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

/// Largest input chunk that base64-encodes without carrying state.
///
/// The block size is rounded down to a multiple of three so every chunk
/// encodes to whole base64 quads.
#[must_use]
pub fn base64_chunk_size(block_size: usize) -> usize {
    (block_size / 3).max(1) * 3
}

/// Encodes one aligned chunk with a trailing line break.
#[must_use]
pub fn encode_chunk(chunk: &[u8]) -> Vec<u8> {
    let mut out = BASE64.encode(chunk).into_bytes();
    out.extend_from_slice(b"\r\n");
    out
}

/// Converts bare line feeds to CRLF for text transmission.
///
/// `last_was_cr` carries the state across chunk boundaries so a CRLF
/// split between two chunks is not doubled.
#[must_use]
pub fn lf_to_crlf(chunk: &[u8], last_was_cr: &mut bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 16);
    for &b in chunk {
        if b == b'\n' && !*last_was_cr {
            out.push(b'\r');
        }
        out.push(b);
        *last_was_cr = b == b'\r';
    }
    out
}

/// Widens a template to 8-bit Latin-1 bytes.
///
/// Characters outside Latin-1 degrade to `?` so a bad template cannot
/// corrupt the header section.
#[must_use]
pub fn to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let cp = c as u32;
            if cp <= 0xFF { cp as u8 } else { b'?' }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn profile() -> MailProfile {
        MailProfile {
            from: "aft@alpha.example.net".to_owned(),
            reply_to: None,
            subject: None,
            charset: String::new(),
            group_name: None,
            show_all_members: false,
            header_template: None,
        }
    }

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 12, 9, 0, 0).unwrap()
    }

    #[test]
    fn subject_template_expands_names() {
        assert_eq!(
            expand_subject("files %s arrived", &["a.txt", "b.txt"]),
            "files a.txt, b.txt arrived"
        );
        assert_eq!(expand_subject("static subject", &["x"]), "static subject");
    }

    #[test]
    fn ascii_subject_stays_plain() {
        assert_eq!(encode_subject("plain", "ISO-8859-1"), "plain");
    }

    #[test]
    fn non_ascii_subject_is_mime_encoded() {
        let encoded = encode_subject("Wetterkarte für heute", "UTF-8");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn headers_single_part() {
        let head = message_headers(
            &profile(),
            date(),
            &["ops@example.net".to_owned()],
            Some("report"),
            None,
        );
        assert!(head.contains("From: aft@alpha.example.net\r\n"));
        assert!(head.contains("To: ops@example.net\r\n"));
        assert!(head.contains("Subject: report\r\n"));
        assert!(head.contains("Content-Type: text/plain; charset=ISO-8859-1\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn headers_hide_group_members_behind_bcc() {
        let mut p = profile();
        p.group_name = Some("forecast-list".to_owned());
        let head = message_headers(
            &p,
            date(),
            &["a@x".to_owned(), "b@x".to_owned()],
            None,
            None,
        );
        assert!(head.contains("To: forecast-list:;\r\n"));
        assert!(head.contains("Bcc: a@x, b@x\r\n"));
    }

    #[test]
    fn multipart_headers_carry_the_boundary() {
        let b = boundary("65a1b2c3_4d_0");
        let head = message_headers(&profile(), date(), &["a@x".to_owned()], None, Some(&b));
        assert!(head.contains("multipart/mixed; boundary=\"----=_Part_65a1b2c3_4d_0\""));
    }

    #[test]
    fn attachment_part_is_base64_with_disposition() {
        let part = open_attachment_part("B", "chart.png");
        assert!(part.contains("Content-Type: image/png; name=\"chart.png\""));
        assert!(part.contains("Content-Transfer-Encoding: base64"));
        assert!(part.contains("filename=\"chart.png\""));
    }

    #[test]
    fn base64_chunks_align_to_three() {
        assert_eq!(base64_chunk_size(4096), 4095);
        assert_eq!(base64_chunk_size(3), 3);
        assert_eq!(base64_chunk_size(2), 3);
    }

    #[test]
    fn aligned_chunks_concatenate_to_one_valid_stream() {
        let data: Vec<u8> = (0u8..=255).collect();
        let chunk = base64_chunk_size(96);
        let mut encoded = String::new();
        for part in data.chunks(chunk) {
            let bytes = encode_chunk(part);
            let text = std::str::from_utf8(&bytes).expect("ascii");
            encoded.push_str(text.trim_end());
        }
        let decoded = BASE64.decode(encoded.as_bytes()).expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn lf_translation_handles_split_crlf() {
        let mut last_cr = false;
        let first = lf_to_crlf(b"line1\r", &mut last_cr);
        let second = lf_to_crlf(b"\nline2\n", &mut last_cr);
        let mut all = first;
        all.extend(second);
        assert_eq!(all, b"line1\r\nline2\r\n");
    }

    #[test]
    fn latin1_degrade() {
        assert_eq!(to_latin1("Grüße"), b"Gr\xfc\xdfe".to_vec());
        assert_eq!(to_latin1("日本"), b"??".to_vec());
    }
}
