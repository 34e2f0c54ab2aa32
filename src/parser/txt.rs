//! TVBox text list grammar
//!
//! ```text
//! 央视频道,#genre#          category line
//! #卫视频道#                 category line
//! #体育频道                  category line
//! CCTV-1,http://a#http://b   data line, URLs split on '#'
//! CCTV-5                     data line, name only
//! ```

use super::{validate_url, Line};
use crate::utils::error::ParseError;
use crate::utils::normalize_whitespace;

const GENRE_MARKER: &str = ",#genre#";

/// Classify one TVBox text line
pub fn classify(line_no: usize, raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }

    if let Some(label) = line.strip_suffix(GENRE_MARKER) {
        return category(label);
    }

    if let Some(rest) = line.strip_prefix('#') {
        return category(rest.trim_end_matches('#'));
    }

    match line.split_once(',') {
        Some((name, rest)) => data_line(line_no, name, rest),
        None if line.contains("://") => Line::Invalid(ParseError::MissingName { line: line_no }),
        None => Line::Data {
            name: normalize_whitespace(line),
            urls: Vec::new(),
        },
    }
}

fn category(label: &str) -> Line {
    let label = normalize_whitespace(label);
    if label.is_empty() {
        Line::Directive
    } else {
        Line::Category(label)
    }
}

fn data_line(line_no: usize, name: &str, rest: &str) -> Line {
    let name = normalize_whitespace(name);
    if name.is_empty() {
        return Line::Invalid(ParseError::MissingName { line: line_no });
    }

    let mut urls = Vec::new();
    let mut first_error = None;

    for token in rest.split('#').map(str::trim).filter(|t| !t.is_empty()) {
        match validate_url(line_no, token) {
            Ok(url) if !urls.contains(&url) => urls.push(url),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    // A row whose every URL is unusable is dropped, not kept as name-only
    match first_error {
        Some(err) if urls.is_empty() => Line::Invalid(err),
        _ => Line::Data { name, urls },
    }
}
