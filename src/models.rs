// Core data structures for the channel catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{normalize_channel_name, normalize_tag, normalize_url};

/// Liveness of a channel entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Unchecked,
    Live,
    Dead,
}

impl ChannelStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Live => "live",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a logical channel: normalized name, category and country
///
/// The stream URL is deliberately not part of the key; it changes over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub name: String,
    pub category: String,
    pub country: String,
}

impl IdentityKey {
    /// Build a key, normalizing every component
    pub fn new(name: &str, category: &str, country: &str) -> Self {
        Self {
            name: normalize_channel_name(name),
            category: normalize_tag(category),
            country: normalize_tag(country),
        }
    }

    /// Stable entry id: `name/category/country`
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.name, self.category, self.country)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// One entry as read from a single repository, before deduplication
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProvisionalEntry {
    /// Display name as scraped (trimmed)
    pub name: String,

    /// Category label in effect for the line, if any
    pub category: Option<String>,

    /// Country tag, if the format carries one
    pub country: Option<String>,

    /// Language tag, if the format carries one
    pub language: Option<String>,

    /// Candidate stream URLs in list order (may be empty)
    pub urls: Vec<String>,

    /// 1-based line number of the data line
    pub line: usize,
}

/// One logical channel with its ordered candidate URLs
///
/// `status` and `last_checked_at` are only written by the validity checker
/// and the replacement resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Stable identity derived from normalized name + category + country
    pub id: String,

    /// Display name, original case preserved
    pub name: String,

    /// Country and category as first listed; compare through `normalize_tag`
    pub country: String,
    pub category: String,
    pub language: String,

    /// Candidate URLs, most-recently-seen-live first
    pub urls: Vec<String>,

    status: ChannelStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_checked_at: Option<DateTime<Utc>>,

    /// Repository the entry was first seen in
    pub source_repository: String,
}

impl ChannelEntry {
    /// Create an unchecked entry labelled with the key's comparison forms
    pub fn new(
        key: &IdentityKey,
        name: impl Into<String>,
        language: impl Into<String>,
        source_repository: impl Into<String>,
    ) -> Self {
        Self {
            id: key.id(),
            name: name.into(),
            country: key.country.clone(),
            category: key.category.clone(),
            language: language.into(),
            urls: Vec::new(),
            status: ChannelStatus::Unchecked,
            last_checked_at: None,
            source_repository: source_repository.into(),
        }
    }

    /// Replace the category and country labels with their listed forms
    ///
    /// Labels must normalize to the key's components; the id is unchanged.
    pub fn with_labels(mut self, category: impl Into<String>, country: impl Into<String>) -> Self {
        self.category = category.into();
        self.country = country.into();
        self
    }

    /// Builder-style URL list
    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.push_url(url.as_ref());
        }
        self
    }

    /// Append a URL unless an equivalent one is already listed
    ///
    /// Returns `true` when the URL was added.
    pub fn push_url(&mut self, url: &str) -> bool {
        let normalized = normalize_url(url);
        if normalized.is_empty() || self.urls.iter().any(|u| *u == normalized) {
            return false;
        }
        self.urls.push(normalized);
        true
    }

    /// Identity key recovered from the stored fields
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(&self.name, &self.category, &self.country)
    }

    /// Primary (first) candidate URL
    pub fn url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    /// Whether the entry belongs in "currently servable" views
    pub fn is_servable(&self) -> bool {
        self.status == ChannelStatus::Live && !self.urls.is_empty()
    }

    /// Move the URL at `index` to the front, keeping the others in order
    pub fn promote_url(&mut self, index: usize) {
        if index > 0 && index < self.urls.len() {
            let url = self.urls.remove(index);
            self.urls.insert(0, url);
        }
    }

    /// Start a new generation: same identity and URLs, status reset
    pub(crate) fn reset_for_check(mut self) -> Self {
        self.status = ChannelStatus::Unchecked;
        self
    }

    pub(crate) fn mark_live(&mut self, winning_index: usize, at: DateTime<Utc>) {
        self.promote_url(winning_index);
        self.status = ChannelStatus::Live;
        self.last_checked_at = Some(at);
    }

    pub(crate) fn mark_dead(&mut self, at: DateTime<Utc>) {
        self.status = ChannelStatus::Dead;
        self.last_checked_at = Some(at);
    }
}

/// Outcome summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Generation number published by this run (previous one if aborted)
    pub generation: u64,

    /// Entries in the published generation
    pub updated_count: usize,

    /// Entries that ended the run `live`
    pub live_count: usize,

    /// Entries that ended the run `dead`
    pub dead_count: usize,

    /// Entries that went live only after their primary URL failed
    pub resolved_count: usize,

    /// Entries with no URL at all, left `unchecked`
    pub unchecked_count: usize,

    /// Candidate URLs across the published entries
    pub url_count: usize,

    /// Repositories configured for the run
    pub repository_count: usize,

    /// Repositories whose fetch failed this run
    pub failed_repositories: Vec<String>,

    /// Set when the run was discarded and the previous generation kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_reason: Option<String>,

    /// Set when the generation was published but could not be persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Whether the run published a new generation
    pub fn is_published(&self) -> bool {
        self.aborted_reason.is_none()
    }

    /// Wall-clock run time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0
    }
}
