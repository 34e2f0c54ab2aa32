//! Common utilities and helper functions
//!
//! Name and URL normalization shared by the parser, the deduplicator and the
//! resolver. Identity comparisons must all go through these helpers.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// URL schemes that can carry a live stream
pub const STREAM_SCHEMES: &[&str] = &["http", "https", "udp", "rtp", "rtmp", "rtsp"];

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Comparison form of a channel name: trimmed, whitespace collapsed, lowercased
///
/// The display name keeps its original case; only identity uses this form.
pub fn normalize_channel_name(name: &str) -> String {
    normalize_whitespace(name).to_lowercase()
}

/// Comparison form of a classification tag (country/category/language)
pub fn normalize_tag(tag: &str) -> String {
    normalize_whitespace(tag).to_lowercase()
}

/// Canonical form of a stream URL used for duplicate detection
///
/// Trims surrounding whitespace and lowercases the scheme. Everything after
/// the scheme is kept byte-for-byte.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.split_once("://") {
        Some((scheme, rest)) => format!("{}://{rest}", scheme.to_ascii_lowercase()),
        None => trimmed.to_string(),
    }
}

/// Scheme of a URL, lowercased, if it has one
pub fn url_scheme(url: &str) -> Option<String> {
    url.trim()
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

/// Whether a URL uses a stream scheme and has a host
pub fn is_stream_url(url: &str) -> bool {
    let Some(scheme) = url_scheme(url) else {
        return false;
    };
    if !STREAM_SCHEMES.contains(&scheme.as_str()) {
        return false;
    }
    // udp://@239.1.1.1:5140 is a multicast address written with an empty userinfo
    let candidate = normalize_url(url).replacen("://@", "://", 1);
    Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Host and port of a stream URL, tolerating the `udp://@host:port` form
pub fn host_port(url: &str, default_port: u16) -> Option<(String, u16)> {
    let candidate = normalize_url(url).replacen("://@", "://", 1);
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.trim_matches(['[', ']']).to_string();
    let port = parsed.port_or_known_default().unwrap_or(default_port);
    Some((host, port))
}
