//! Extended M3U grammar
//!
//! Only `#EXTINF` carries entry data; the URL is the next non-comment line.

use regex::Regex;
use std::sync::OnceLock;

use super::{validate_url, ExtInf, Line};
use crate::utils::normalize_whitespace;

fn attribute_regex() -> &'static Regex {
    static ATTR_RE: OnceLock<Regex> = OnceLock::new();
    ATTR_RE.get_or_init(|| Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).expect("Invalid regex pattern"))
}

/// Classify one M3U line
pub fn classify(line_no: usize, raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }

    if let Some(rest) = line.strip_prefix("#EXTINF:") {
        return Line::Meta(parse_extinf(rest));
    }

    if line.starts_with('#') {
        return Line::Directive;
    }

    match validate_url(line_no, line) {
        Ok(url) => Line::Url(url),
        Err(e) => Line::Invalid(e),
    }
}

/// Parse the part of an `#EXTINF` line after the colon
pub fn parse_extinf(rest: &str) -> ExtInf {
    let (attrs, display) = split_display_name(rest);

    let mut info = ExtInf::default();
    let mut tvg_name = None;

    for cap in attribute_regex().captures_iter(attrs) {
        let value = normalize_whitespace(&cap[2]);
        if value.is_empty() {
            continue;
        }
        match cap[1].to_ascii_lowercase().as_str() {
            "tvg-name" => tvg_name = Some(value),
            "group-title" => info.group = Some(value),
            "tvg-country" => info.country = Some(value),
            "tvg-language" => info.language = Some(value),
            _ => {}
        }
    }

    info.name = tvg_name.unwrap_or_else(|| normalize_whitespace(display));
    info
}

/// Split at the first comma outside a quoted attribute value
fn split_display_name(rest: &str) -> (&str, &str) {
    let mut in_quotes = false;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&rest[..idx], &rest[idx + 1..]),
            _ => {}
        }
    }
    (rest, "")
}
