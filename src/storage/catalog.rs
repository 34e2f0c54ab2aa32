//! Catalog generations and the shared catalog store
//!
//! A [`Catalog`] is immutable once built: its indices are derived in
//! [`Catalog::new`] and never patched. The [`CatalogStore`] holds the current
//! generation behind an `Arc` and swaps it in one step, so readers always see
//! a whole generation.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{ChannelEntry, ChannelStatus};
use crate::utils::{normalize_channel_name, normalize_tag};

/// One immutable generation of the channel catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    generation: u64,
    built_at: DateTime<Utc>,
    entries: Vec<ChannelEntry>,
    by_id: HashMap<String, usize>,
    by_country: BTreeMap<String, Vec<String>>,
    by_category: BTreeMap<String, Vec<String>>,
    by_language: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    /// Build a generation stamped now
    pub fn new(generation: u64, entries: Vec<ChannelEntry>) -> Self {
        Self::from_parts(generation, Utc::now(), entries)
    }

    /// Build a generation with an explicit timestamp (used when reloading)
    ///
    /// Later entries with an already-seen id are dropped.
    pub fn from_parts(generation: u64, built_at: DateTime<Utc>, entries: Vec<ChannelEntry>) -> Self {
        let mut unique = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        let mut by_country: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_language: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for entry in entries {
            if by_id.contains_key(&entry.id) {
                tracing::warn!(id = %entry.id, "Duplicate id in catalog generation, keeping first");
                continue;
            }
            by_id.insert(entry.id.clone(), unique.len());
            by_country
                .entry(normalize_tag(&entry.country))
                .or_default()
                .push(entry.id.clone());
            by_category
                .entry(normalize_tag(&entry.category))
                .or_default()
                .push(entry.id.clone());
            by_language
                .entry(normalize_tag(&entry.language))
                .or_default()
                .push(entry.id.clone());
            unique.push(entry);
        }

        Self {
            generation,
            built_at,
            entries: unique,
            by_id,
            by_country,
            by_category,
            by_language,
        }
    }

    /// Generation 0 with no entries
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in generation order
    pub fn entries(&self) -> &[ChannelEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChannelEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn by_country(&self, country: &str) -> Vec<&ChannelEntry> {
        self.lookup(&self.by_country, country)
    }

    pub fn by_category(&self, category: &str) -> Vec<&ChannelEntry> {
        self.lookup(&self.by_category, category)
    }

    pub fn by_language(&self, language: &str) -> Vec<&ChannelEntry> {
        self.lookup(&self.by_language, language)
    }

    /// Case-insensitive substring search over display names
    pub fn search(&self, text: &str) -> Vec<&ChannelEntry> {
        self.query(&CatalogQuery::default().search(text))
    }

    /// Known countries, sorted
    pub fn countries(&self) -> Vec<&str> {
        self.by_country.keys().map(String::as_str).collect()
    }

    /// Known categories, sorted
    pub fn categories(&self) -> Vec<&str> {
        self.by_category.keys().map(String::as_str).collect()
    }

    /// Known languages, sorted
    pub fn languages(&self) -> Vec<&str> {
        self.by_language.keys().map(String::as_str).collect()
    }

    /// Entries currently servable (live with a URL)
    pub fn servable(&self) -> impl Iterator<Item = &ChannelEntry> {
        self.entries.iter().filter(|e| e.is_servable())
    }

    /// Number of entries with the given status
    pub fn count_status(&self, status: ChannelStatus) -> usize {
        self.entries.iter().filter(|e| e.status() == status).count()
    }

    /// Entries matching every predicate of `query`, in generation order
    pub fn query(&self, query: &CatalogQuery) -> Vec<&ChannelEntry> {
        // Narrow through one index, then apply the full predicate
        let seeded = if let Some(country) = &query.country {
            self.lookup(&self.by_country, country)
        } else if let Some(category) = &query.category {
            self.lookup(&self.by_category, category)
        } else if let Some(language) = &query.language {
            self.lookup(&self.by_language, language)
        } else {
            self.entries.iter().collect()
        };

        seeded.into_iter().filter(|e| query.matches(e)).collect()
    }

    fn lookup(&self, index: &BTreeMap<String, Vec<String>>, tag: &str) -> Vec<&ChannelEntry> {
        index
            .get(&normalize_tag(tag))
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }
}

/// Filter predicates over a catalog generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub country: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub search: Option<String>,
    pub servable_only: bool,
}

impl CatalogQuery {
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn servable_only(mut self) -> Self {
        self.servable_only = true;
        self
    }

    /// Whether an entry satisfies every set predicate
    pub fn matches(&self, entry: &ChannelEntry) -> bool {
        let tag_ok = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map_or(true, |w| normalize_tag(w) == normalize_tag(have))
        };

        tag_ok(&self.country, &entry.country)
            && tag_ok(&self.category, &entry.category)
            && tag_ok(&self.language, &entry.language)
            && self.search.as_deref().map_or(true, |s| {
                normalize_channel_name(&entry.name).contains(&normalize_channel_name(s))
            })
            && (!self.servable_only || entry.is_servable())
    }
}

// ============================================================================
// Catalog Store
// ============================================================================

/// Holder of the current catalog generation
///
/// Readers take a cheap `Arc` snapshot; the pipeline publishes a whole new
/// generation with [`CatalogStore::replace`].
#[derive(Debug)]
pub struct CatalogStore {
    current: RwLock<Arc<Catalog>>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(Catalog::empty())
    }
}

impl CatalogStore {
    pub fn new(initial: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current generation
    pub async fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&*self.current.read().await)
    }

    /// Publish `next`, returning the generation it replaced
    pub async fn replace(&self, next: Catalog) -> Arc<Catalog> {
        let next = Arc::new(next);
        let mut guard = self.current.write().await;
        let previous = std::mem::replace(&mut *guard, next);
        tracing::debug!(
            from = previous.generation(),
            to = guard.generation(),
            entries = guard.len(),
            "Catalog generation swapped"
        );
        previous
    }

    pub async fn generation(&self) -> u64 {
        self.current.read().await.generation()
    }

    pub async fn get(&self, id: &str) -> Option<ChannelEntry> {
        self.snapshot().await.get(id).cloned()
    }

    pub async fn query(&self, query: &CatalogQuery) -> Vec<ChannelEntry> {
        self.snapshot()
            .await
            .query(query)
            .into_iter()
            .cloned()
            .collect()
    }
}
