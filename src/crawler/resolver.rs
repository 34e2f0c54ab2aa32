//! Replacement resolution for entries whose primary URL failed
//!
//! Order of attempts for one entry:
//! 1. the entry's remaining alternates, in list order
//! 2. URLs from the supplementary source that the entry has not tried
//!
//! The first reachable URL wins and becomes the entry's primary. Nothing after
//! it is probed. An entry with nothing reachable ends `dead` and stays in the
//! catalog.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::crawler::checker::TimedProber;
use crate::crawler::fetcher::SourceFetcher;
use crate::models::ChannelEntry;
use crate::parser::parse_repository;
use crate::storage::dedup::Deduplicator;
use crate::utils::normalize_url;

/// How an entry's resolution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A replacement is live and now first in the URL list
    Recovered {
        url: String,
        from_supplementary: bool,
    },
    /// Nothing reachable; `tried` URLs were probed
    Exhausted { tried: usize },
}

impl Resolution {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Source of extra candidate URLs for a channel
#[async_trait]
pub trait AlternateSource: Send + Sync {
    /// Candidate URLs for `entry`, best match first
    async fn candidates(&self, entry: &ChannelEntry) -> Vec<String>;
}

/// Source that never has candidates
pub struct NoAlternates;

#[async_trait]
impl AlternateSource for NoAlternates {
    async fn candidates(&self, _entry: &ChannelEntry) -> Vec<String> {
        Vec::new()
    }
}

/// Index of URLs from the supplementary repositories
#[derive(Debug, Default)]
struct AlternateIndex {
    by_id: HashMap<String, Vec<String>>,
    by_name: HashMap<String, Vec<String>>,
}

/// Re-queries repositories for URLs matching a channel
///
/// The repositories are fetched at most once per instance, on first use, and
/// the result is shared by every entry resolved in the run. A fetch failure
/// only means fewer candidates.
pub struct RepositoryAlternateSource {
    fetcher: SourceFetcher,
    repositories: Vec<String>,
    dedup: Deduplicator,
    index: OnceCell<AlternateIndex>,
}

impl RepositoryAlternateSource {
    pub fn new(fetcher: SourceFetcher, repositories: Vec<String>, dedup: Deduplicator) -> Self {
        Self {
            fetcher,
            repositories,
            dedup,
            index: OnceCell::new(),
        }
    }

    async fn build_index(&self) -> AlternateIndex {
        let mut index = AlternateIndex::default();
        let fetches = self.fetcher.fetch_all(&self.repositories).await;

        for fetch in fetches {
            let Ok(text) = fetch.result else {
                continue;
            };
            for item in parse_repository(&text, &fetch.locator).entries {
                let key = self.dedup.identity(&item);
                let by_id = index.by_id.entry(key.id()).or_default();
                let by_name = index.by_name.entry(key.name).or_default();
                for url in item.urls {
                    let url = normalize_url(&url);
                    if !by_id.contains(&url) {
                        by_id.push(url.clone());
                    }
                    if !by_name.contains(&url) {
                        by_name.push(url);
                    }
                }
            }
        }

        tracing::info!(
            repositories = self.repositories.len(),
            channels = index.by_id.len(),
            "Supplementary candidates loaded"
        );
        index
    }
}

#[async_trait]
impl AlternateSource for RepositoryAlternateSource {
    async fn candidates(&self, entry: &ChannelEntry) -> Vec<String> {
        let index = self.index.get_or_init(|| self.build_index()).await;

        let mut urls: Vec<String> = index.by_id.get(&entry.id).cloned().unwrap_or_default();
        let name = self.dedup.canonical_name(&entry.name);
        for url in index.by_name.get(&name).into_iter().flatten() {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }
}

/// Finds a working replacement for an entry whose primary probe failed
pub struct ReplacementResolver {
    alternates: Arc<dyn AlternateSource>,
}

impl ReplacementResolver {
    pub fn new(alternates: Arc<dyn AlternateSource>) -> Self {
        Self { alternates }
    }

    /// Resolver without a supplementary source
    pub fn local_only() -> Self {
        Self::new(Arc::new(NoAlternates))
    }

    /// Resolve `entry` after its primary URL failed
    ///
    /// For an entry with no URLs the supplementary source is the only stage.
    /// When nothing at all was probed the entry is left `unchecked`.
    pub async fn resolve(&self, entry: &mut ChannelEntry, prober: &TimedProber) -> Resolution {
        let mut tried = usize::from(!entry.urls.is_empty());

        for idx in 1..entry.urls.len() {
            let outcome = prober.probe(&entry.urls[idx]).await;
            tried += 1;
            if outcome.is_reachable() {
                entry.mark_live(idx, Utc::now());
                tracing::debug!(id = %entry.id, url = %entry.urls[0], "Recovered via alternate");
                return Resolution::Recovered {
                    url: entry.urls[0].clone(),
                    from_supplementary: false,
                };
            }
        }

        let candidates: Vec<String> = self
            .alternates
            .candidates(entry)
            .await
            .into_iter()
            .filter(|url| !entry.urls.contains(url))
            .collect();

        for url in candidates {
            let outcome = prober.probe(&url).await;
            tried += 1;
            if outcome.is_reachable() {
                entry.urls.insert(0, url.clone());
                entry.mark_live(0, Utc::now());
                tracing::debug!(id = %entry.id, url = %url, "Recovered via supplementary search");
                return Resolution::Recovered {
                    url,
                    from_supplementary: true,
                };
            }
        }

        if tried > 0 {
            entry.mark_dead(Utc::now());
            tracing::warn!(id = %entry.id, tried, "No working URL for channel");
        }

        Resolution::Exhausted { tried }
    }
}
