//! Channel list parsing
//!
//! Repository bodies are line oriented. Every line is first classified into a
//! [`Line`] variant by the format-specific classifier ([`txt`] or [`m3u`]),
//! then folded into provisional entries by [`parse_repository`]. Lines that
//! cannot be used are reported in [`ParsedList::skipped`] and never abort the
//! parse.

pub mod m3u;
pub mod txt;

use crate::models::ProvisionalEntry;
use crate::utils::error::ParseError;
use crate::utils::{is_stream_url, normalize_url, url_scheme, STREAM_SCHEMES};

/// Channel list format of a repository body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// TVBox text lists (`genre,#genre#` headers, `name,url#url` rows)
    Txt,
    /// Extended M3U playlists
    M3u,
}

impl ListFormat {
    /// Detect the format from the body
    pub fn detect(text: &str) -> Self {
        if text.contains("#EXTM3U") {
            Self::M3u
        } else {
            Self::Txt
        }
    }
}

/// Attributes carried by an `#EXTINF` line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtInf {
    pub name: String,
    pub group: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

/// One classified line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty or whitespace only
    Blank,
    /// Category label for the following data lines
    Category(String),
    /// Channel name with zero or more validated URLs
    Data { name: String, urls: Vec<String> },
    /// M3U entry metadata awaiting its URL line
    Meta(ExtInf),
    /// M3U URL line (validated)
    Url(String),
    /// Header or directive without entry content
    Directive,
    /// Unusable line
    Invalid(ParseError),
}

/// Result of parsing one repository
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    /// Entries in list order
    pub entries: Vec<ProvisionalEntry>,

    /// Lines that were dropped, with the reason
    pub skipped: Vec<ParseError>,
}

impl ParsedList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a repository body into provisional entries
///
/// `locator` is only used for log context.
pub fn parse_repository(text: &str, locator: &str) -> ParsedList {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let format = ListFormat::detect(text);

    let parsed = match format {
        ListFormat::Txt => fold_txt(text),
        ListFormat::M3u => fold_m3u(text),
    };

    for skipped in &parsed.skipped {
        tracing::debug!(repository = %locator, reason = %skipped, "Skipped list line");
    }
    tracing::debug!(
        repository = %locator,
        format = ?format,
        entries = parsed.entries.len(),
        skipped = parsed.skipped.len(),
        "Parsed repository"
    );

    parsed
}

fn fold_txt(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();
    let mut category: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        match txt::classify(line_no, raw) {
            Line::Blank => category = None,
            Line::Category(label) => category = Some(label),
            Line::Data { name, urls } => parsed.entries.push(ProvisionalEntry {
                name,
                category: category.clone(),
                urls,
                line: line_no,
                ..Default::default()
            }),
            Line::Invalid(err) => parsed.skipped.push(err),
            Line::Meta(_) | Line::Url(_) | Line::Directive => {}
        }
    }

    parsed
}

fn fold_m3u(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();
    let mut pending: Option<(usize, ExtInf)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        match m3u::classify(line_no, raw) {
            Line::Meta(info) => {
                if let Some((meta_line, _)) = pending.replace((line_no, info)) {
                    tracing::trace!(line = meta_line, "#EXTINF without URL");
                }
            }
            Line::Url(url) => match pending.take() {
                Some((_, info)) if info.name.is_empty() => {
                    parsed.skipped.push(ParseError::MissingName { line: line_no });
                }
                Some((_, info)) => parsed.entries.push(ProvisionalEntry {
                    name: info.name,
                    category: info.group,
                    country: info.country,
                    language: info.language,
                    urls: vec![url],
                    line: line_no,
                }),
                None => parsed.skipped.push(ParseError::OrphanUrl { line: line_no }),
            },
            Line::Invalid(err) => {
                // A bad URL consumes its #EXTINF
                if matches!(
                    err,
                    ParseError::InvalidUrl { .. } | ParseError::UnsupportedScheme { .. }
                ) {
                    pending = None;
                }
                parsed.skipped.push(err);
            }
            Line::Blank | Line::Category(_) | Line::Data { .. } | Line::Directive => {}
        }
    }

    parsed
}

/// Validate one raw URL token
///
/// Strips a trailing `$label` tag and normalizes the scheme.
pub(crate) fn validate_url(line: usize, raw: &str) -> Result<String, ParseError> {
    let candidate = raw.split('$').next().unwrap_or_default().trim();

    let Some(scheme) = url_scheme(candidate) else {
        return Err(ParseError::InvalidUrl {
            line,
            url: candidate.to_string(),
        });
    };
    if !STREAM_SCHEMES.contains(&scheme.as_str()) {
        return Err(ParseError::UnsupportedScheme { line, scheme });
    }
    if !is_stream_url(candidate) {
        return Err(ParseError::InvalidUrl {
            line,
            url: candidate.to_string(),
        });
    }

    Ok(normalize_url(candidate))
}
