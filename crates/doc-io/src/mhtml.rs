//! MHTML (RFC 822 multipart/related) reading and single-file assembly.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::IoError;
use crate::extract::{decode_latin1, decode_with_charset};

#[derive(Debug)]
pub struct MhtmlPart {
    pub content_type: String,
    pub charset: String,
    pub content_id: Option<String>,
    pub content_location: Option<String>,
    pub body: Vec<u8>,
}

/// Extract the first `text/html` part of an MHTML file, decode it with
/// its declared charset, and inline every `cid:`/location-referenced
/// image part as a data URI. No external fetch is ever attempted.
pub fn extract_html(bytes: &[u8]) -> Result<String, IoError> {
    let parts = parse_parts(bytes);
    let html_part = parts
        .iter()
        .find(|p| p.content_type.eq_ignore_ascii_case("text/html"))
        .ok_or(IoError::MissingHtmlPart)?;

    let mut html = decode_with_charset(&html_part.body, &html_part.charset);

    for part in &parts {
        if !part.content_type.to_ascii_lowercase().starts_with("image/") {
            continue;
        }
        let data_uri = format!(
            "data:{};base64,{}",
            part.content_type,
            BASE64.encode(&part.body)
        );
        if let Some(cid) = &part.content_id {
            let reference = format!("cid:{cid}");
            if html.contains(&reference) {
                debug!(%cid, "inlining cid image part");
                html = html.replace(&reference, &data_uri);
            }
        }
        if let Some(location) = &part.content_location {
            if html.contains(location.as_str()) {
                html = html.replace(location.as_str(), &data_uri);
            }
        }
    }

    Ok(html)
}

/// Parse an MHTML byte stream into its parts. Input that is not
/// multipart is treated as a single HTML part.
pub fn parse_parts(bytes: &[u8]) -> Vec<MhtmlPart> {
    let text = decode_latin1(bytes);
    let (top_headers, top_body) = split_headers(&text);

    let boundary = header_param(&top_headers, "content-type", "boundary");
    let Some(boundary) = boundary else {
        return vec![MhtmlPart {
            content_type: header_value(&top_headers, "content-type")
                .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "text/html".to_string()),
            charset: header_param(&top_headers, "content-type", "charset").unwrap_or_default(),
            content_id: None,
            content_location: None,
            body: top_body.as_bytes().to_vec(),
        }];
    };

    let marker = format!("--{boundary}");
    let mut parts = Vec::new();
    for chunk in top_body.split(&marker).skip(1) {
        let chunk = chunk.trim_start_matches(['\r', '\n']);
        if chunk.starts_with("--") || chunk.trim().is_empty() {
            continue;
        }
        let (headers, body) = split_headers(chunk);
        let content_type = header_value(&headers, "content-type")
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .unwrap_or_default();
        let charset = header_param(&headers, "content-type", "charset").unwrap_or_default();
        let encoding = header_value(&headers, "content-transfer-encoding")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let content_id = header_value(&headers, "content-id")
            .map(|v| v.trim().trim_matches(['<', '>']).to_string());
        let content_location = header_value(&headers, "content-location").map(|v| v.trim().to_string());

        let body = match encoding.as_str() {
            "base64" => {
                let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64.decode(compact.as_bytes()).unwrap_or_default()
            }
            "quoted-printable" => decode_quoted_printable(body),
            _ => body.as_bytes().to_vec(),
        };

        parts.push(MhtmlPart {
            content_type,
            charset,
            content_id,
            content_location,
            body,
        });
    }
    parts
}

/// Assemble a minimal single-part MHTML document around an HTML body.
/// Image data already travels inside the body as data URIs, so one part
/// suffices.
pub fn assemble(title: &str, html_document: &str) -> String {
    let boundary = "----=_penmark_0001";
    format!(
        "From: <Saved by Penmark>\r\n\
         Subject: {title}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/related; type=\"text/html\"; boundary=\"{boundary}\"\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Type: text/html; charset=\"utf-8\"\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         \r\n\
         {html_document}\r\n\
         --{boundary}--\r\n"
    )
}

fn split_headers(text: &str) -> (Vec<(String, String)>, &str) {
    let (head, body) = match text.find("\r\n\r\n") {
        Some(ix) => (&text[..ix], &text[ix + 4..]),
        None => match text.find("\n\n") {
            Some(ix) => (&text[..ix], &text[ix + 2..]),
            None => (text, ""),
        },
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.is_empty() {
            continue;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && !headers.is_empty() {
            // RFC 822 continuation line.
            let last = headers.last_mut().expect("checked non-empty");
            last.1.push(' ');
            last.1.push_str(line.trim());
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    (headers, body)
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn header_param(headers: &[(String, String)], name: &str, param: &str) -> Option<String> {
    let value = header_value(headers, name)?;
    for piece in value.split(';') {
        let piece = piece.trim();
        if let Some((key, val)) = piece.split_once('=') {
            if key.trim().eq_ignore_ascii_case(param) {
                return Some(val.trim().trim_matches(['"', '\'']).to_string());
            }
        }
    }
    None
}

fn decode_quoted_printable(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let bytes = body.as_bytes();
    let mut ix = 0;
    while ix < bytes.len() {
        if bytes[ix] == b'=' {
            // Soft line break.
            if bytes.get(ix + 1) == Some(&b'\r') && bytes.get(ix + 2) == Some(&b'\n') {
                ix += 3;
                continue;
            }
            if bytes.get(ix + 1) == Some(&b'\n') {
                ix += 2;
                continue;
            }
            if ix + 3 <= bytes.len() {
                if let Ok(hex) = std::str::from_utf8(&bytes[ix + 1..ix + 3]) {
                    if let Ok(value) = u8::from_str_radix(hex, 16) {
                        out.push(value);
                        ix += 3;
                        continue;
                    }
                }
            }
        }
        out.push(bytes[ix]);
        ix += 1;
    }
    out
}
