//! Channel deduplication
//!
//! Folds provisional entries from every fetched repository into one candidate
//! list with at most one [`ChannelEntry`] per identity key:
//! - identity = normalized name (after alias folding) + category + country
//! - URL lists are unioned in first-seen order, skipping equivalent URLs
//! - non-key fields come from the first repository that listed the channel
//!
//! The previous generation supplies the last live primary URL of every entry
//! and, in a run where a repository failed, the URLs and entries that only
//! that repository listed.

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::models::{ChannelEntry, ChannelStatus, IdentityKey, ProvisionalEntry};
use crate::storage::catalog::Catalog;
use crate::utils::{normalize_channel_name, normalize_whitespace};

// ============================================================================
// Configuration
// ============================================================================

/// Deduplication configuration
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Country for entries without a country tag
    pub default_country: String,

    /// Category for entries without a label (when inference is off)
    pub default_category: String,

    /// Language for entries without a language tag
    pub default_language: String,

    /// Infer categories from channel names
    pub infer_category: bool,

    /// Normalized alias -> normalized canonical name
    pub aliases: HashMap<String, String>,

    /// Optional cap on URLs kept per entry
    pub max_urls: Option<usize>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            default_country: "unknown".to_string(),
            default_category: "unknown".to_string(),
            default_language: "unknown".to_string(),
            infer_category: false,
            aliases: HashMap::new(),
            max_urls: None,
        }
    }
}

impl DedupConfig {
    /// Build from the `[classification]` and `[checker]` sections
    pub fn from_config(config: &Config) -> Self {
        let class = &config.classification;
        let mut dedup = Self {
            default_country: class.default_country.clone(),
            default_category: class.default_category.clone(),
            default_language: class.default_language.clone(),
            infer_category: class.infer_category,
            aliases: HashMap::new(),
            max_urls: config.checker.max_urls_per_channel,
        };
        for (canonical, aliases) in &class.aliases {
            dedup = dedup.with_alias(canonical, aliases.iter().map(String::as_str));
        }
        dedup
    }

    /// Register aliases for a canonical channel name
    pub fn with_alias<'a>(
        mut self,
        canonical: &str,
        aliases: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let target = normalize_channel_name(canonical);
        for alias in aliases {
            self.aliases.insert(normalize_channel_name(alias), target.clone());
        }
        self
    }
}

// ============================================================================
// Category inference
// ============================================================================

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("央视频道", &["cctv", "中央"]),
    ("卫视频道", &["卫视", "电视台"]),
    ("影视娱乐", &["影视", "电影", "剧场", "影院", "chc"]),
    ("新闻资讯", &["新闻", "资讯", "凤凰", "香港"]),
    ("体育频道", &["体育", "运动", "足球", "篮球"]),
    ("纪录频道", &["纪录", "发现", "探索", "地理", "历史"]),
    ("少儿频道", &["少儿", "卡通", "动漫", "动画", "卡酷"]),
    ("音乐艺术", &["音乐", "戏曲", "艺术"]),
];

/// Category guessed from keywords in a channel name
pub fn infer_category(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or("其他频道")
}

// ============================================================================
// Deduplicator
// ============================================================================

/// Counts from merging the previous generation into the candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryOverStats {
    /// Entries copied from the previous generation
    pub carried: usize,

    /// Entries whose previous live URL was moved back to the front
    pub promoted: usize,

    /// Prior URLs re-added to entries that are still listed
    pub restored: usize,
}

/// Folds provisional entries into unique channel entries
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(DedupConfig::from_config(config))
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Identity key of a provisional entry
    pub fn identity(&self, entry: &ProvisionalEntry) -> IdentityKey {
        let (category, country) = self.labels(entry);
        IdentityKey::new(&self.canonical_name(&entry.name), &category, &country)
    }

    /// Category and country in listed form, defaults applied
    fn labels(&self, entry: &ProvisionalEntry) -> (String, String) {
        let country = tag_or(entry.country.as_deref(), &self.config.default_country);
        let category = match entry.category.as_deref().map(normalize_whitespace) {
            Some(label) if !label.is_empty() => label,
            _ if self.config.infer_category => infer_category(&entry.name).to_string(),
            _ => self.config.default_category.clone(),
        };
        (category, country)
    }

    /// Comparison name after alias folding
    pub fn canonical_name(&self, name: &str) -> String {
        let normalized = normalize_channel_name(name);
        self.config
            .aliases
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Fold per-repository entry lists, given in configured order
    pub fn fold<'a, I>(&self, sources: I) -> Vec<ChannelEntry>
    where
        I: IntoIterator<Item = (&'a str, Vec<ProvisionalEntry>)>,
    {
        let mut entries: Vec<ChannelEntry> = Vec::new();
        let mut index: HashMap<IdentityKey, usize> = HashMap::new();
        let mut provisional_count = 0usize;

        for (repository, provisional) in sources {
            for item in provisional {
                provisional_count += 1;
                let key = self.identity(&item);

                match index.get(&key) {
                    Some(&pos) => {
                        let entry = &mut entries[pos];
                        for url in &item.urls {
                            entry.push_url(url);
                        }
                    }
                    None => {
                        let language = tag_or(item.language.as_deref(), &self.config.default_language);
                        let display = normalize_whitespace(&item.name);
                        let (category, country) = self.labels(&item);
                        let entry = ChannelEntry::new(&key, display, language, repository)
                            .with_labels(category, country)
                            .with_urls(&item.urls);
                        index.insert(key, entries.len());
                        entries.push(entry);
                    }
                }
            }
        }

        if let Some(max) = self.config.max_urls {
            for entry in &mut entries {
                entry.urls.truncate(max);
            }
        }

        tracing::debug!(
            provisional = provisional_count,
            unique = entries.len(),
            "Deduplicated entries"
        );

        entries
    }

    /// Merge the previous generation into freshly folded candidates
    ///
    /// - A candidate that was live keeps its previous primary URL first, even
    ///   when no repository lists that URL any more (a supplementary win).
    /// - When any repository failed, a candidate also gets back every prior
    ///   URL the new fold lacks, since the failed repository may have been
    ///   the only one listing them.
    /// - Entries of failed repositories that the new fetch no longer lists
    ///   are carried over whole, reset to `unchecked`.
    pub fn carry_over(
        &self,
        mut candidates: Vec<ChannelEntry>,
        previous: &Catalog,
        failed_repositories: &HashSet<&str>,
    ) -> (Vec<ChannelEntry>, CarryOverStats) {
        let mut stats = CarryOverStats::default();
        let present: HashSet<String> = candidates.iter().map(|e| e.id.clone()).collect();

        for entry in &mut candidates {
            let Some(prior) = previous.get(&entry.id) else {
                continue;
            };

            if !failed_repositories.is_empty() {
                for url in &prior.urls {
                    if entry.push_url(url) {
                        stats.restored += 1;
                    }
                }
            }

            if prior.status() != ChannelStatus::Live {
                continue;
            }
            let Some(primary) = prior.url() else {
                continue;
            };
            if !entry.urls.iter().any(|u| u == primary) {
                entry.push_url(primary);
            }
            let Some(pos) = entry.urls.iter().position(|u| u == primary) else {
                continue;
            };
            if pos > 0 {
                entry.promote_url(pos);
                stats.promoted += 1;
            }
        }

        if let Some(max) = self.config.max_urls {
            for entry in &mut candidates {
                entry.urls.truncate(max);
            }
        }

        for prior in previous.entries() {
            if present.contains(&prior.id)
                || !failed_repositories.contains(prior.source_repository.as_str())
            {
                continue;
            }
            candidates.push(prior.clone().reset_for_check());
            stats.carried += 1;
        }

        if stats.carried > 0 || stats.promoted > 0 || stats.restored > 0 {
            tracing::info!(
                carried = stats.carried,
                promoted = stats.promoted,
                restored_urls = stats.restored,
                "Merged previous generation"
            );
        }

        (candidates, stats)
    }
}

fn tag_or(tag: Option<&str>, default: &str) -> String {
    match tag.map(normalize_whitespace) {
        Some(t) if !t.is_empty() => t,
        _ => default.to_string(),
    }
}
