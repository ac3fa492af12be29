//! Normalization rules and URL path helpers
//!
//! Streamer names and keywords compare case-insensitively. Categories use a
//! looser rule because the site spells the same category several ways
//! ("Just Chatting", "just-chatting", "justchatting-24-7").

// =============================================================================
// Entry Normalization
// =============================================================================

/// Normalize a streamer name or keyword: trimmed and lower-cased.
#[inline]
pub fn normalize_entry(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Normalize a category: lower-cased, trimmed, every character that is not
/// an ASCII letter or digit removed.
pub fn normalize_category(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

// =============================================================================
// Category Matching
// =============================================================================

/// Fuzzy category comparison.
///
/// Both sides are normalized; they match when equal or when either contains
/// the other. A side that normalizes to nothing never matches, otherwise an
/// entry like "!!!" would match every category.
pub fn is_category_match(stream_category: &str, blocked_category: &str) -> bool {
    is_normalized_category_match(
        &normalize_category(stream_category),
        &normalize_category(blocked_category),
    )
}

/// Same as [`is_category_match`] for values already normalized.
#[inline]
pub fn is_normalized_category_match(stream: &str, blocked: &str) -> bool {
    if stream.is_empty() || blocked.is_empty() {
        return false;
    }
    stream == blocked || stream.contains(blocked) || blocked.contains(stream)
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Site routes that are never a channel page.
const RESERVED_ROUTES: &[&str] = &[
    "browse",
    "categories",
    "category",
    "following",
    "search",
    "dashboard",
    "settings",
    "video",
    "clips",
    "terms-of-service",
    "privacy-policy",
];

/// Strip scheme/host, query and fragment, leaving the path.
fn path_of(href: &str) -> &str {
    let without_scheme = match href.find("://") {
        Some(pos) => {
            let rest = &href[pos + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "",
            }
        }
        None => href,
    };
    let end = without_scheme
        .find(|c| c == '?' || c == '#')
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}

/// Last non-empty path segment of a link target, lower-cased.
///
/// `"/xqc"` and `"https://kick.com/category/xqc?x=1"` both yield `"xqc"`.
pub fn last_path_segment(href: &str) -> Option<String> {
    path_of(href)
        .split('/')
        .filter(|part| !part.is_empty())
        .last()
        .map(|part| part.to_lowercase())
}

/// Streamer a page path belongs to, if it is a channel page.
///
/// The first path segment names the channel (`/xqc`, `/xqc/videos`), unless
/// it is one of the site's own routes.
pub fn streamer_from_path(path: &str) -> Option<String> {
    let first = path_of(path).split('/').find(|part| !part.is_empty())?;
    let first = first.to_lowercase();
    if RESERVED_ROUTES.contains(&first.as_str()) {
        return None;
    }
    Some(first)
}

/// Whether a URL points at the target site.
pub fn is_target_url(url: &str) -> bool {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => return false,
    };
    let host_end = rest
        .find(|c| c == '/' || c == '?' || c == '#' || c == ':')
        .unwrap_or(rest.len());
    let host = rest[..host_end].to_ascii_lowercase();
    host == crate::TARGET_HOST || host.ends_with(".kick.com")
}
