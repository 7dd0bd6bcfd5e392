use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use tracing::{debug, warn};

use crate::mime::mime_for_path;

/// Per-image counters for an inlining pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlineReport {
    pub embedded: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn img_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>").expect("static regex"))
}

fn src_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)src\s*=\s*("([^"]*)"|'([^']*)')"#).expect("static regex"))
}

/// Rewrite every local `<img src>` in `html` to a `data:` URI. External
/// URLs and existing data URIs are left untouched; all other attributes
/// of the tag are preserved verbatim.
pub fn inline_images(html: &str, base_dir: &Path, image_dir: Option<&Path>) -> (String, InlineReport) {
    let mut report = InlineReport::default();
    let out = img_tag_regex().replace_all(html, |caps: &regex::Captures<'_>| {
        let tag = &caps[0];
        rewrite_img_tag(tag, base_dir, image_dir, &mut report)
    });
    (out.into_owned(), report)
}

fn rewrite_img_tag(
    tag: &str,
    base_dir: &Path,
    image_dir: Option<&Path>,
    report: &mut InlineReport,
) -> String {
    let Some(src_caps) = src_attr_regex().captures(tag) else {
        report.skipped += 1;
        return tag.to_string();
    };
    let src = src_caps
        .get(2)
        .or_else(|| src_caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or("");

    if src.starts_with("data:") || src.starts_with("http://") || src.starts_with("https://") {
        report.skipped += 1;
        return tag.to_string();
    }

    let decoded = percent_decode(src);
    let Some(path) = resolve_image(&decoded, base_dir, image_dir) else {
        warn!(%src, "image reference could not be resolved");
        report.failed += 1;
        return tag.to_string();
    };

    let bytes = match std::fs::read(&path) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) | Err(_) => {
            warn!(path = %path.display(), "image could not be read");
            report.failed += 1;
            return tag.to_string();
        }
    };

    let data_uri = format!(
        "data:{};base64,{}",
        mime_for_path(&path),
        BASE64.encode(&bytes)
    );
    debug!(path = %path.display(), bytes = bytes.len(), "image inlined");
    report.embedded += 1;

    let whole = src_caps.get(0).expect("matched src attr").as_str();
    tag.replace(whole, &format!("src=\"{data_uri}\""))
}

/// Resolve a decoded image reference: against the output dir, then its
/// `images/` subdirectory, then by case-insensitive basename inside the
/// image dir.
fn resolve_image(reference: &str, base_dir: &Path, image_dir: Option<&Path>) -> Option<PathBuf> {
    let direct = base_dir.join(reference);
    if direct.is_file() {
        return Some(direct);
    }

    let file_name = Path::new(reference).file_name()?.to_string_lossy().to_string();
    let adjacent = base_dir.join("images").join(&file_name);
    if adjacent.is_file() {
        return Some(adjacent);
    }

    let image_dir = image_dir?;
    let wanted = file_name.to_lowercase();
    let entries = std::fs::read_dir(image_dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy().to_lowercase() == wanted)
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Decode %XX escapes (and `+` is left alone: these are path references,
/// not query strings).
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut ix = 0;
    while ix < bytes.len() {
        if bytes[ix] == b'%' && ix + 3 <= bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[ix + 1..ix + 3]) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    ix += 3;
                    continue;
                }
            }
        }
        out.push(bytes[ix]);
        ix += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
