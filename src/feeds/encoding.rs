//! Character encoding detection for feed payloads.
//!
//! The label is taken from, in order: a byte order mark, the `charset`
//! parameter of the `Content-Type` header, the `encoding` pseudo-attribute of
//! the XML declaration. Without any of them the payload is read as UTF-8.
//! Unknown labels are ignored.

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Only the head of a payload is searched for the XML declaration.
const DECLARATION_WINDOW: usize = 1024;

static CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([A-Za-z0-9._:\-]+)"#).unwrap());

static XML_DECLARATION: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(r#"(?i-u)^\s*<\?xml[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#).unwrap()
});

fn charset_label(content_type: Option<&str>) -> Option<&'static Encoding> {
    let caps = CHARSET.captures(content_type?)?;
    Encoding::for_label(caps[1].as_bytes())
}

fn declared_label(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(DECLARATION_WINDOW)];
    let caps = XML_DECLARATION.captures(head)?;
    Encoding::for_label(&caps[1])
}

/// Encoding the payload claims, before any BOM is considered.
pub fn detect(body: &[u8], content_type: Option<&str>) -> &'static Encoding {
    charset_label(content_type)
        .or_else(|| declared_label(body))
        .unwrap_or(UTF_8)
}

/// Decode `body` to UTF-8 text, removing any byte order mark.
///
/// A BOM overrides the declared encoding. Malformed sequences become U+FFFD.
pub fn decode<'a>(body: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let declared = detect(body, content_type);
    let (text, used, had_errors) = declared.decode(body);
    if had_errors {
        warn!(encoding = used.name(), "Feed payload contains malformed byte sequences");
    } else if used != UTF_8 {
        debug!(encoding = used.name(), "Transcoded feed payload");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{EUC_JP, SHIFT_JIS};

    #[test]
    fn test_xml_declaration() {
        let body = br#"<?xml version="1.0" encoding="Shift_JIS"?><rss/>"#;
        assert_eq!(detect(body, None), SHIFT_JIS);
    }

    #[test]
    fn test_header_charset_wins_over_declaration() {
        let body = br#"<?xml version="1.0" encoding="Shift_JIS"?><rss/>"#;
        assert_eq!(detect(body, Some("application/rss+xml; charset=EUC-JP")), EUC_JP);
    }

    #[test]
    fn test_defaults_to_utf8() {
        assert_eq!(detect(b"<rss/>", Some("text/xml")), UTF_8);
        assert_eq!(detect(br#"<?xml version="1.0" encoding="no-such-thing"?><rss/>"#, None), UTF_8);
    }

    #[test]
    fn test_decode_shift_jis() {
        let (bytes, _, _) = SHIFT_JIS.encode("<title>機械学習</title>");
        assert_eq!(decode(&bytes, Some("text/xml; charset=shift_jis")), "<title>機械学習</title>");
    }

    #[test]
    fn test_bom_overrides_declaration() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<rss/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes, Some("text/xml; charset=iso-8859-1")), "<rss/>");
    }

    #[test]
    fn test_utf8_bom_removed() {
        assert_eq!(decode("\u{feff}<rss/>".as_bytes(), None), "<rss/>");
    }
}
