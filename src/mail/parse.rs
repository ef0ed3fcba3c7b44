//! Raw RFC 822 → [`Message`].

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::MailError;
use crate::pipeline::types::Message;

/// URL-safe base64 that accepts input with or without padding.
pub(crate) const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64url `raw` payload and parse it.
pub fn parse_encoded(id: &str, thread_id: &str, raw: &str) -> Result<Message, MailError> {
    let bytes = BASE64_URL
        .decode(raw.trim())
        .map_err(|e| MailError::Parse {
            id: id.to_string(),
            reason: format!("invalid base64url payload: {e}"),
        })?;
    parse_raw(id, thread_id, &bytes)
}

/// Parse raw message bytes. Missing headers become empty strings.
pub fn parse_raw(id: &str, thread_id: &str, bytes: &[u8]) -> Result<Message, MailError> {
    let parsed = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| MailError::Parse {
            id: id.to_string(),
            reason: "not an RFC 822 message".into(),
        })?;

    Ok(Message {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        from: extract_sender(&parsed),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: extract_text(&parsed),
    })
}

/// The From header as a mailbox: `Name <addr>` or just `addr`.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) if !name.trim().is_empty() => {
            format!("{} <{address}>", name.trim())
        }
        (_, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// Readable text: the first text/plain part, else tag-stripped HTML.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.trim().to_string();
        }
    }
    String::new()
}

/// Remove tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "From: Alice <a@x.com>\r\n\
        To: me@y.com\r\n\
        Subject: Q\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Can we meet Tuesday 3pm to discuss Q?\r\n";

    #[test]
    fn parses_plain_message() {
        let msg = parse_raw("m1", "t1", PLAIN.as_bytes()).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.thread_id, "t1");
        assert_eq!(msg.from, "Alice <a@x.com>");
        assert_eq!(msg.subject, "Q");
        assert_eq!(msg.body, "Can we meet Tuesday 3pm to discuss Q?");
    }

    #[test]
    fn parses_base64url_payload() {
        let encoded = BASE64_URL.encode(PLAIN.as_bytes());
        let msg = parse_encoded("m1", "t1", &encoded).unwrap();
        assert_eq!(msg.subject, "Q");

        let padded = base64::engine::general_purpose::URL_SAFE.encode(PLAIN.as_bytes());
        assert!(parse_encoded("m1", "t1", &padded).is_ok());
    }

    #[test]
    fn bare_address_sender() {
        let raw = "From: a@x.com\r\nSubject: hi\r\n\r\nbody\r\n";
        let msg = parse_raw("m2", "t2", raw.as_bytes()).unwrap();
        assert_eq!(msg.from, "a@x.com");
    }

    #[test]
    fn html_only_body_is_stripped() {
        let raw = "From: a@x.com\r\n\
            Subject: hi\r\n\
            Content-Type: text/html; charset=utf-8\r\n\
            \r\n\
            <html><body><p>Hello   <b>there</b></p></body></html>\r\n";
        let msg = parse_raw("m3", "t3", raw.as_bytes()).unwrap();
        assert!(msg.body.contains("Hello"));
        assert!(msg.body.contains("there"));
        assert!(!msg.body.contains('<'));
    }

    #[test]
    fn invalid_base64_is_parse_error() {
        let err = parse_encoded("m4", "t4", "!!!not base64!!!").unwrap_err();
        assert!(matches!(err, MailError::Parse { ref id, .. } if id == "m4"));
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
        assert_eq!(strip_html("  No HTML   here "), "No HTML here");
        assert_eq!(strip_html(""), "");
    }
}
