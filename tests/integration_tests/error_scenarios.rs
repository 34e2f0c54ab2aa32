//! Error scenario integration tests
//!
//! Tests the failure modes of a refresh run:
//! 1. Repository fetch failures (all, some, over HTTP)
//! 2. Run timeout
//! 3. Entries with nothing to probe
//! 4. Persistence failures
//! 5. Terminal dead entries

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tvbox_sync::crawler::fetcher::HttpRepositoryFetcher;
use tvbox_sync::crawler::pipeline::PipelineBuilder;
use tvbox_sync::models::ChannelStatus;
use tvbox_sync::storage::FileCatalogStore;
use tvbox_sync::utils::retry::RetryConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{healthy_urls, MALFORMED_TXT, SAMPLE_TXT};
use crate::common::{txt_repo, CountingProber, MemoryFetcher};

// ============================================================================
// Repository Failures
// ============================================================================

#[tokio::test]
async fn test_all_repositories_failing_keeps_previous_generation() {
    let fetcher = MemoryFetcher::with(&[("a", SAMPLE_TXT)]);
    let prober = CountingProber::live(&healthy_urls());
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher.clone())
        .prober(prober)
        .repositories(vec!["a".into(), "b".into()])
        .build()
        .unwrap();

    let first = pipeline.run_once().await;
    assert!(first.is_published());
    let before = pipeline.snapshot().await;

    fetcher.clear();
    let result = pipeline.run_once().await;

    assert!(!result.is_published());
    assert_eq!(
        result.aborted_reason.as_deref(),
        Some("all 2 repositories failed to fetch")
    );
    assert_eq!(result.failed_repositories, vec!["a", "b"]);
    assert_eq!(result.generation, 1);

    let after = pipeline.snapshot().await;
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.len(), 5);
}

#[tokio::test]
async fn test_partial_failure_keeps_entries_of_failed_repository() {
    let fetcher = MemoryFetcher::with(&[
        ("a", txt_repo("x", &[("A", "http://a/1")]).as_str()),
        ("b", txt_repo("x", &[("B", "http://b/1")]).as_str()),
    ]);
    let prober = CountingProber::live(&["http://a/1", "http://b/1"]);
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher.clone())
        .prober(prober.clone())
        .repositories(vec!["a".into(), "b".into()])
        .supplementary_repositories(Vec::new())
        .build()
        .unwrap();

    pipeline.run_once().await;
    fetcher.remove("b");
    prober.set_live(&["http://a/1"]);

    let result = pipeline.run_once().await;

    assert!(result.is_published());
    assert_eq!(result.generation, 2);
    assert_eq!(result.failed_repositories, vec!["b"]);
    assert_eq!(result.updated_count, 2);

    // Carried entries are re-checked like any other
    let snapshot = pipeline.snapshot().await;
    let carried = snapshot.get("b/x/unknown").unwrap();
    assert_eq!(carried.source_repository, "b");
    assert_eq!(carried.status(), ChannelStatus::Dead);
}

#[tokio::test]
async fn test_http_error_marks_repository_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/good.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(txt_repo(
            "x",
            &[("A", "http://a/1")],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher =
        HttpRepositoryFetcher::new(Duration::from_secs(5), RetryConfig::none(), None).unwrap();
    let broken = format!("{}/broken.txt", server.uri());
    let pipeline = PipelineBuilder::new()
        .fetcher(Arc::new(fetcher))
        .prober(CountingProber::live(&["http://a/1"]))
        .repositories(vec![format!("{}/good.txt", server.uri()), broken.clone()])
        .supplementary_repositories(Vec::new())
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(result.is_published());
    assert_eq!(result.failed_repositories, vec![broken]);
    assert_eq!(result.live_count, 1);
}

#[tokio::test]
async fn test_no_repositories_configured() {
    let pipeline = PipelineBuilder::new()
        .fetcher(MemoryFetcher::with(&[]))
        .prober(CountingProber::live(&[]))
        .repositories(Vec::new())
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert_eq!(result.aborted_reason.as_deref(), Some("no repositories configured"));
    assert_eq!(result.generation, 0);
    assert!(pipeline.snapshot().await.is_empty());
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_run_timeout_discards_work() {
    let fetcher = MemoryFetcher::with(&[("a", SAMPLE_TXT)]);
    let prober = CountingProber::slow(&healthy_urls(), Duration::from_secs(5));
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober)
        .repositories(vec!["a".into()])
        .probe_timeout(Duration::from_secs(10))
        .run_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(!result.is_published());
    assert!(result.aborted_reason.unwrap().contains("timeout"));
    assert!(result.failed_repositories.is_empty());
    assert_eq!(pipeline.snapshot().await.generation(), 0);
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn test_slow_probe_counts_as_dead() {
    let fetcher = MemoryFetcher::with(&[("a", txt_repo("x", &[("A", "http://a/1")]).as_str())]);
    let prober = CountingProber::slow(&["http://a/1"], Duration::from_secs(5));
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober)
        .repositories(vec!["a".into()])
        .supplementary_repositories(Vec::new())
        .probe_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(result.is_published());
    assert_eq!(result.dead_count, 1);
}

// ============================================================================
// Entry Edge Cases
// ============================================================================

#[tokio::test]
async fn test_name_only_entry_stays_unchecked() {
    let fetcher = MemoryFetcher::with(&[("a", MALFORMED_TXT)]);
    let prober = CountingProber::live(&["http://news.example/13"]);
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober.clone())
        .repositories(vec!["a".into()])
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert_eq!(result.updated_count, 2);
    assert_eq!(result.live_count, 1);
    assert_eq!(result.unchecked_count, 1);
    assert_eq!(prober.calls(), vec!["http://news.example/13"]);

    let snapshot = pipeline.snapshot().await;
    let servable: Vec<_> = snapshot.entries().iter().filter(|e| e.is_servable()).collect();
    assert_eq!(servable.len(), 1);
    assert_eq!(servable[0].name, "CCTV-13");
}

#[tokio::test]
async fn test_dead_entries_stay_in_catalog() {
    let fetcher = MemoryFetcher::with(&[("a", SAMPLE_TXT)]);
    let prober = CountingProber::live(&[]);
    let pipeline = PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober)
        .repositories(vec!["a".into()])
        .build()
        .unwrap();

    let first = pipeline.run_once().await;
    let second = pipeline.run_once().await;

    assert_eq!(first.dead_count, 5);
    assert_eq!(second.dead_count, 5);
    let snapshot = pipeline.snapshot().await;
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot
        .entries()
        .iter()
        .all(|e| e.status() == ChannelStatus::Dead && e.last_checked_at().is_some()));
}

// ============================================================================
// Persistence Failures
// ============================================================================

#[tokio::test]
async fn test_persist_failure_still_publishes() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file in the way").unwrap();

    let pipeline = PipelineBuilder::new()
        .fetcher(MemoryFetcher::with(&[("a", SAMPLE_TXT)]))
        .prober(CountingProber::live(&healthy_urls()))
        .persister(Arc::new(FileCatalogStore::new(&blocker)))
        .repositories(vec!["a".into()])
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(result.is_published());
    assert!(result.persist_error.is_some());
    assert_eq!(result.generation, 1);
    assert_eq!(pipeline.snapshot().await.len(), 5);
}
