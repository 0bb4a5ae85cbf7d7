//! Byte-level decoders shared by the MIME and ENEX readers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;

static SOFT_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=\r?\n").unwrap());
static QP_ESCAPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=([0-9A-Fa-f]{2})").unwrap());
static SOFT_BREAK_BYTES_RE: Lazy<BytesRegex> = Lazy::new(|| BytesRegex::new(r"=\r?\n").unwrap());

/// Decode quoted-printable text into raw bytes.
///
/// Soft line breaks are removed first, then every `=XX` hex escape becomes
/// its byte. Anything else, including a malformed escape, is kept verbatim.
pub fn decode_quoted_printable_bytes(input: &[u8]) -> Vec<u8> {
    let joined = SOFT_BREAK_BYTES_RE.replace_all(input, &b""[..]);
    let mut out = Vec::with_capacity(joined.len());
    let mut i = 0;
    while i < joined.len() {
        if joined[i] == b'=' && i + 2 < joined.len() {
            if let Some(byte) = hex_pair(joined[i + 1], joined[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(joined[i]);
        i += 1;
    }
    out
}

/// Decode quoted-printable text. Decoded bytes that are not valid UTF-8 are
/// replaced lossily.
pub fn decode_quoted_printable(input: &str) -> String {
    let joined = SOFT_BREAK_RE.replace_all(input, "");
    if !QP_ESCAPE_RE.is_match(&joined) {
        return joined.into_owned();
    }
    String::from_utf8_lossy(&decode_quoted_printable_bytes(joined.as_bytes())).into_owned()
}

fn hex_pair(high: u8, low: u8) -> Option<u8> {
    let high = (high as char).to_digit(16)?;
    let low = (low as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Decode standard base64, ignoring the line wrapping exporters insert.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_printable_escapes() {
        assert_eq!(decode_quoted_printable("caf=C3=A9"), "café");
        assert_eq!(decode_quoted_printable("a=3Db"), "a=b");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        assert_eq!(decode_quoted_printable("long li=\r\nne"), "long line");
        assert_eq!(decode_quoted_printable("long li=\nne"), "long line");
    }

    #[test]
    fn test_quoted_printable_is_lenient() {
        assert_eq!(decode_quoted_printable("50=% off"), "50=% off");
        assert_eq!(decode_quoted_printable("trailing="), "trailing=");
        assert_eq!(decode_quoted_printable("=Z1=4"), "=Z1=4");
    }

    #[test]
    fn test_quoted_printable_html_attributes() {
        let encoded = "<p class=3D\"x\">Hello=20world</p>";
        assert_eq!(decode_quoted_printable(encoded), "<p class=\"x\">Hello world</p>");
    }

    #[test]
    fn test_quoted_printable_bytes_keep_binary() {
        assert_eq!(decode_quoted_printable_bytes(b"=FF=00x"), vec![0xFF, 0x00, b'x']);
    }

    #[test]
    fn test_base64_ignores_wrapping() {
        assert_eq!(decode_base64("aGVs\r\nbG8=\n").unwrap(), b"hello");
        assert!(decode_base64("not base64!").is_err());
    }
}
