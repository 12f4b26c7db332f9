//! crates/mdpdf_core/src/images.rs
//!
//! Image allow-list, content-type mapping and the scanner that decides which
//! workspace images a document actually references.
//!
//! Both markdown image syntax (`![alt](url "title")`) and HTML `<img src=...>`
//! are recognized. Documents are a controlled markdown subset, so pattern
//! matching over the raw text is sufficient here.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::IMAGES_SUBDIR;
use crate::security::is_safe_basename;

/// Extensions (lowercase, without the dot) accepted for stored images.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Extensions treated as the document member of an imported archive.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Extension used when a content type is missing or unknown.
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";

// Shared by scanning and rewriting. Groups around the URL let a rewrite
// splice only the URL.
static IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<mdhead>!\[[^\]]*\]\()(?P<mdurl>[^)\s]+)(?P<mdtail>[^)]*\))|(?P<imghead><img\b[^>]*?\ssrc=)(?:"(?P<dq>[^"]+)"|'(?P<sq>[^']+)')"#,
    )
    .expect("image url pattern is a valid regex")
});

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme pattern is a valid regex")
});

/// Lowercase extension of a basename, without the dot.
///
/// Dotfiles such as `.png` have no extension.
pub fn extension_of(basename: &str) -> Option<String> {
    match basename.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < basename.len() => {
            Some(basename[idx + 1..].to_ascii_lowercase())
        }
        _ => None,
    }
}

pub fn is_allowed_image(basename: &str) -> bool {
    extension_of(basename)
        .map(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_document_name(basename: &str) -> bool {
    extension_of(basename)
        .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Maps an upload's `Content-Type` to an allow-listed extension.
///
/// Parameters after `;` are ignored. Missing or unknown types fall back to
/// [`DEFAULT_IMAGE_EXTENSION`].
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let ext = match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => DEFAULT_IMAGE_EXTENSION,
    };
    if ALLOWED_IMAGE_EXTENSIONS.contains(&ext) {
        ext
    } else {
        DEFAULT_IMAGE_EXTENSION
    }
}

/// Remote (`https://`, `//host`, any `scheme:`) and inline `data:` URLs.
fn is_external(url: &str) -> bool {
    url.starts_with("//") || SCHEME_RE.is_match(url)
}

fn strip_query_and_fragment(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn last_segment(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or("")
}

/// Returns the basenames of workspace images referenced by `document`.
///
/// Only relative URLs under `images/` with an allow-listed extension count.
pub fn scan_referenced_images(document: &str) -> BTreeSet<String> {
    let prefix = format!("{IMAGES_SUBDIR}/");
    let mut referenced = BTreeSet::new();

    for caps in IMAGE_URL_RE.captures_iter(document) {
        let Some(url) = caps
            .name("mdurl")
            .or_else(|| caps.name("dq"))
            .or_else(|| caps.name("sq"))
        else {
            continue;
        };
        let url = url.as_str().trim();
        if url.is_empty() || is_external(url) {
            continue;
        }
        if !url.to_ascii_lowercase().starts_with(&prefix) {
            continue;
        }
        let basename = last_segment(strip_query_and_fragment(url));
        if is_safe_basename(basename) && is_allowed_image(basename) {
            referenced.insert(basename.to_string());
        }
    }
    referenced
}

/// Rewrites local image URLs whose basename matches an imported image to
/// `images/<basename>`.
///
/// Archives may reference images at any sub-path; after import every image
/// lives flat under `images/`. Matching is case-insensitive on the basename
/// and the stored spelling wins. External URLs and unknown names are left
/// exactly as written.
pub fn rewrite_image_urls<'a, I>(document: &str, image_basenames: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let by_lower: HashMap<String, &str> = image_basenames
        .into_iter()
        .map(|name| (name.to_lowercase(), name.as_str()))
        .collect();
    if document.is_empty() || by_lower.is_empty() {
        return document.to_string();
    }

    let rewrite = |url: &str| -> Option<String> {
        let trimmed = url.trim();
        if is_external(trimmed) {
            return None;
        }
        let basename = last_segment(strip_query_and_fragment(trimmed));
        if basename.is_empty() {
            return None;
        }
        by_lower
            .get(&basename.to_lowercase())
            .map(|hit| format!("{IMAGES_SUBDIR}/{hit}"))
    };

    IMAGE_URL_RE
        .replace_all(document, |caps: &Captures<'_>| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            if let Some(url) = caps.name("mdurl") {
                return match rewrite(url.as_str()) {
                    Some(new_url) => format!("{}{}{}", &caps["mdhead"], new_url, &caps["mdtail"]),
                    None => whole.to_string(),
                };
            }
            let (url, quote) = match (caps.name("dq"), caps.name("sq")) {
                (Some(url), _) => (url.as_str(), '"'),
                (None, Some(url)) => (url.as_str(), '\''),
                (None, None) => return whole.to_string(),
            };
            match rewrite(url) {
                Some(new_url) => format!("{}{quote}{new_url}{quote}", &caps["imghead"]),
                None => whole.to_string(),
            }
        })
        .into_owned()
}
