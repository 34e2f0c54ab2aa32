//! Property tests for deduplication and parsing

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use tvbox_sync::models::ProvisionalEntry;
use tvbox_sync::parser::parse_repository;
use tvbox_sync::storage::Deduplicator;

const NAMES: &[&str] = &["CCTV-1", "cctv-1 ", "CCTV  1", "CCTV-2", "湖南卫视"];
const CATEGORIES: &[Option<&str>] = &[Some("央视频道"), Some("央视频道 "), Some("卫视频道"), None];

fn provisional_entry() -> impl Strategy<Value = ProvisionalEntry> {
    (
        0..NAMES.len(),
        0..CATEGORIES.len(),
        prop::collection::vec(0u8..6, 0..4),
    )
        .prop_map(|(name, category, hosts)| ProvisionalEntry {
            name: NAMES[name].to_string(),
            category: CATEGORIES[category].map(String::from),
            urls: hosts
                .into_iter()
                .map(|h| format!("http://h{h}.example/live.m3u8"))
                .collect(),
            ..Default::default()
        })
}

fn repositories() -> impl Strategy<Value = Vec<Vec<ProvisionalEntry>>> {
    prop::collection::vec(prop::collection::vec(provisional_entry(), 0..8), 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Folding keeps one entry per identity whose URLs are the first-seen
    /// union of every listing of that identity, without duplicates
    #[test]
    fn prop_fold_is_first_seen_union(repos in repositories()) {
        let dedup = Deduplicator::default();
        let locators: Vec<String> = (0..repos.len()).map(|i| format!("repo-{i}")).collect();

        let mut expected_urls: HashMap<String, Vec<String>> = HashMap::new();
        let mut expected_source: HashMap<String, String> = HashMap::new();
        let mut expected_order: Vec<String> = Vec::new();
        for (locator, items) in locators.iter().zip(&repos) {
            for item in items {
                let id = dedup.identity(item).id();
                if !expected_urls.contains_key(&id) {
                    expected_order.push(id.clone());
                    expected_source.insert(id.clone(), locator.clone());
                }
                let urls = expected_urls.entry(id).or_default();
                for url in &item.urls {
                    if !urls.contains(url) {
                        urls.push(url.clone());
                    }
                }
            }
        }

        let folded = dedup.fold(locators.iter().map(String::as_str).zip(repos.clone()));

        let ids: Vec<String> = folded.iter().map(|e| e.id.clone()).collect();
        prop_assert_eq!(&ids, &expected_order);

        for entry in &folded {
            let unique: HashSet<&String> = entry.urls.iter().collect();
            prop_assert_eq!(unique.len(), entry.urls.len());
            prop_assert_eq!(&entry.urls, &expected_urls[&entry.id]);
            prop_assert_eq!(&entry.source_repository, &expected_source[&entry.id]);
        }
    }

    /// Folding the same repositories twice gives the same identities
    #[test]
    fn prop_fold_is_deterministic(repos in repositories()) {
        let dedup = Deduplicator::default();
        let a = dedup.fold(repos.clone().into_iter().map(|r| ("r", r)));
        let b = dedup.fold(repos.into_iter().map(|r| ("r", r)));

        let ids = |v: &[tvbox_sync::models::ChannelEntry]| -> Vec<String> {
            v.iter().map(|e| e.id.clone()).collect()
        };
        prop_assert_eq!(ids(&a), ids(&b));
    }

    /// Arbitrary input never aborts a parse, and every kept URL is usable
    #[test]
    fn prop_parse_never_panics(text in "(?s).{0,400}") {
        let parsed = parse_repository(&text, "fuzz");
        for entry in &parsed.entries {
            prop_assert!(!entry.name.trim().is_empty());
            for url in &entry.urls {
                prop_assert!(url.contains("://"));
            }
        }
    }

    #[test]
    fn prop_parse_txt_rows(
        rows in prop::collection::vec(("[A-Za-z][A-Za-z0-9 ]{0,10}", 0u8..10), 1..20)
    ) {
        let mut text = String::from("测试,#genre#\n");
        for (name, host) in &rows {
            text.push_str(&format!("{name},http://h{host}.example/s.m3u8\n"));
        }

        let parsed = parse_repository(&text, "gen");

        prop_assert_eq!(parsed.entries.len(), rows.len());
        prop_assert!(parsed.skipped.is_empty());
        prop_assert!(parsed
            .entries
            .iter()
            .all(|e| e.category.as_deref() == Some("测试") && e.urls.len() == 1));
    }
}
