//! Channel template for the TVBox export
//!
//! A template fixes which categories `live.txt` shows, in which order, and
//! which channels each one lists:
//!
//! ```text
//! #央视频道#
//! CCTV-1
//! CCTV-2
//! 卫视频道,#genre#
//! 湖南卫视
//! ```
//!
//! A category line is `#label#`, `#label` or `label,#genre#`. Any other line
//! names a channel. Text after a comma is ignored, so an earlier `live.txt`
//! can serve as a template.

use std::collections::{HashMap, HashSet};

use crate::models::ChannelEntry;
use crate::storage::catalog::Catalog;
use crate::storage::dedup::Deduplicator;
use crate::storage::push_txt_section;
use crate::utils::normalize_whitespace;

/// Category for servable channels the template does not name
pub const OTHERS_CATEGORY: &str = "其他频道";

/// One template category and its channel names, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCategory {
    pub label: String,
    pub channels: Vec<String>,
}

/// Ordering and filter for the TVBox export
#[derive(Debug, Clone, Default)]
pub struct ChannelTemplate {
    categories: Vec<TemplateCategory>,
    strict: bool,
}

impl ChannelTemplate {
    /// Parse template text; malformed lines are skipped
    pub fn parse(text: &str) -> Self {
        let mut categories: Vec<TemplateCategory> = Vec::new();
        let mut current: Option<usize> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim_start_matches('\u{feff}').trim();
            if line.is_empty() {
                continue;
            }

            if let Some(label) = category_label(line) {
                if label.is_empty() {
                    current = None;
                    continue;
                }
                let pos = match categories.iter().position(|c| c.label == label) {
                    Some(pos) => pos,
                    None => {
                        categories.push(TemplateCategory {
                            label,
                            channels: Vec::new(),
                        });
                        categories.len() - 1
                    }
                };
                current = Some(pos);
                continue;
            }

            let name = normalize_whitespace(line.split(',').next().unwrap_or(line));
            match current {
                Some(pos) if !name.is_empty() => categories[pos].channels.push(name),
                _ => tracing::debug!(line = idx + 1, "Template line outside a category, skipped"),
            }
        }

        Self {
            categories,
            strict: false,
        }
    }

    /// Drop servable channels the template does not name
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn categories(&self) -> &[TemplateCategory] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|c| c.channels.is_empty())
    }

    /// Render the servable entries of `catalog` in template order
    ///
    /// A template channel takes the first servable entry whose canonical name
    /// matches, and is written with the template's spelling. Categories with
    /// no servable channel are left out. Unless strict, servable channels the
    /// template never names follow under [`OTHERS_CATEGORY`], sorted by name.
    pub fn render_txt(&self, catalog: &Catalog, dedup: &Deduplicator) -> String {
        let mut by_name: HashMap<String, &ChannelEntry> = HashMap::new();
        for entry in catalog.servable() {
            by_name.entry(dedup.canonical_name(&entry.name)).or_insert(entry);
        }

        let mut out = String::new();
        let mut named: HashSet<String> = HashSet::new();

        for category in &self.categories {
            let mut rows: Vec<(&str, &str)> = Vec::new();
            for channel in &category.channels {
                let canonical = dedup.canonical_name(channel);
                let Some(url) = by_name.get(&canonical).and_then(|e| e.url()) else {
                    continue;
                };
                if named.insert(canonical) {
                    rows.push((channel.as_str(), url));
                }
            }
            if !rows.is_empty() {
                push_txt_section(&mut out, &category.label, rows);
            }
        }

        if !self.strict {
            let mut others: Vec<&ChannelEntry> = catalog
                .servable()
                .filter(|e| !named.contains(&dedup.canonical_name(&e.name)))
                .collect();
            others.sort_by(|a, b| a.name.cmp(&b.name));

            let rows: Vec<(&str, &str)> = others
                .iter()
                .filter_map(|e| e.url().map(|url| (e.name.as_str(), url)))
                .collect();
            if !rows.is_empty() {
                push_txt_section(&mut out, OTHERS_CATEGORY, rows);
            }
        }

        out
    }
}

/// Label of a category line, `None` for a channel line
fn category_label(line: &str) -> Option<String> {
    if let Some((label, marker)) = line.split_once(',') {
        return (marker.trim() == "#genre#").then(|| normalize_whitespace(label));
    }
    line.strip_prefix('#')
        .map(|rest| normalize_whitespace(rest.trim_end_matches('#')))
}
