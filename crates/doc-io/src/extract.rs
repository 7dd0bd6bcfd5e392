use std::sync::OnceLock;

use regex::Regex;

fn body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Tolerant by design: case-insensitive, dot matches newlines, attrs
    // on the body tag allowed.
    RE.get_or_init(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").expect("static regex"))
}

/// Pull the body contents out of a full HTML document. A document with
/// no `<body>` is treated as being all body.
pub fn extract_body(html: &str) -> &str {
    match body_regex().captures(html) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(html),
        None => html,
    }
}

/// Decode file bytes to text without ever failing: UTF-8 first, then a
/// BOM-based UTF-16 detection pass, then latin-1 (total).
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.trim_start_matches('\u{FEFF}').to_string();
    }
    if bytes.len() >= 2 {
        if bytes[0] == 0xFF && bytes[1] == 0xFE {
            return decode_utf16(&bytes[2..], u16::from_le_bytes);
        }
        if bytes[0] == 0xFE && bytes[1] == 0xFF {
            return decode_utf16(&bytes[2..], u16::from_be_bytes);
        }
    }
    decode_latin1(bytes)
}

/// Decode with a declared MIME charset; unknown charsets fall back to the
/// detection pass.
pub fn decode_with_charset(bytes: &[u8], charset: &str) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii" => decode_text(bytes),
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => decode_latin1(bytes),
        "utf-16" | "utf-16le" => decode_utf16(bytes, u16::from_le_bytes),
        "utf-16be" => decode_utf16(bytes, u16::from_be_bytes),
        _ => decode_text(bytes),
    }
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_extraction_is_tolerant() {
        let html = "<HTML><BODY bgcolor=\"white\">\n<p>hi</p>\n</BODY></HTML>";
        assert_eq!(extract_body(html), "\n<p>hi</p>\n");
    }

    #[test]
    fn body_spanning_newlines_is_captured() {
        let html = "<body>\nline one\nline two\n</body>";
        assert_eq!(extract_body(html), "\nline one\nline two\n");
    }

    #[test]
    fn missing_body_treats_whole_input_as_body() {
        let html = "<p>bare fragment</p>";
        assert_eq!(extract_body(html), html);
    }

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn latin1_fallback_never_fails() {
        // 0xE9 is 'é' in latin-1 and invalid as standalone UTF-8.
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn utf16_bom_is_detected() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "ok".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&bytes), "ok");
    }

    #[test]
    fn declared_charset_is_honored() {
        assert_eq!(decode_with_charset(&[0xE9], "iso-8859-1"), "é");
        assert_eq!(decode_with_charset("x".as_bytes(), "utf-8"), "x");
        assert_eq!(decode_with_charset(&[0xE9], "x-unknown"), "é");
    }
}
