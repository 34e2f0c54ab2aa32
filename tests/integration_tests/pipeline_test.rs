//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Repository fetch (in memory or mocked HTTP)
//! 2. List parsing and deduplication
//! 3. Bounded concurrent checking with resolution
//! 4. Atomic publication and persistence

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tvbox_sync::crawler::fetcher::HttpRepositoryFetcher;
use tvbox_sync::crawler::pipeline::{PipelineBuilder, RefreshPipeline};
use tvbox_sync::crawler::prober::HttpStreamProber;
use tvbox_sync::models::ChannelStatus;
use tvbox_sync::storage::{Catalog, CatalogQuery, CatalogStore, FileCatalogStore};
use tvbox_sync::utils::retry::RetryConfig;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{healthy_urls, SAMPLE_M3U, SAMPLE_TXT};
use crate::common::{txt_repo, CountingProber, MemoryFetcher};

fn memory_pipeline(
    fetcher: Arc<MemoryFetcher>,
    prober: Arc<CountingProber>,
    repos: &[&str],
    workers: usize,
) -> RefreshPipeline {
    PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober)
        .repositories(repos.iter().map(|r| r.to_string()).collect())
        .supplementary_repositories(Vec::new())
        .workers(workers)
        .probe_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_over_http() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(path("/repo-a.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(txt_repo("央视频道", &[("CCTV-1", format!("{base}/u1.m3u8").as_str())])),
        )
        .mount(&server)
        .await;
    Mock::given(path("/repo-b.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(txt_repo("央视频道", &[("CCTV-1", format!("{base}/u2.m3u8").as_str())])),
        )
        .mount(&server)
        .await;
    Mock::given(path("/u2.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "#EXTM3U\n#EXTINF:10,\nseg0.ts\n",
            "application/vnd.apple.mpegurl",
        ))
        .mount(&server)
        .await;
    // u1 is not mounted: wiremock answers 404

    let fetcher =
        HttpRepositoryFetcher::new(Duration::from_secs(5), RetryConfig::none(), None).unwrap();
    let prober = HttpStreamProber::new(Duration::from_secs(5)).unwrap();
    let files = FileCatalogStore::new(temp_dir.path());

    let pipeline = PipelineBuilder::new()
        .fetcher(Arc::new(fetcher))
        .prober(Arc::new(prober))
        .persister(Arc::new(files.clone()))
        .repositories(vec![format!("{base}/repo-a.txt"), format!("{base}/repo-b.txt")])
        .supplementary_repositories(Vec::new())
        .workers(2)
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(result.is_published(), "aborted: {:?}", result.aborted_reason);
    assert_eq!(result.updated_count, 1);
    assert_eq!(result.resolved_count, 1);
    assert_eq!(result.dead_count, 0);
    assert!(result.persist_error.is_none());

    let snapshot = pipeline.snapshot().await;
    let entry = snapshot.get("cctv-1/央视频道/unknown").unwrap();
    assert_eq!(entry.status(), ChannelStatus::Live);
    assert_eq!(
        entry.urls,
        vec![format!("{base}/u2.m3u8"), format!("{base}/u1.m3u8")]
    );
    assert!(entry.last_checked_at().is_some());

    let txt = std::fs::read_to_string(files.txt_path()).unwrap();
    assert_eq!(txt, format!("央视频道,#genre#\nCCTV-1,{base}/u2.m3u8\n"));
    assert!(files.m3u_path().exists());
    assert_eq!(files.load().await.unwrap().generation(), 1);

    let stats: serde_json::Value =
        serde_json::from_slice(&std::fs::read(files.stats_path().unwrap()).unwrap()).unwrap();
    assert_eq!(stats["generation"], 1);
    assert_eq!(stats["urlCount"], 2);
    assert_eq!(stats["sources"]["total"], 2);
    assert_eq!(stats["sources"]["valid"], 2);
}

#[tokio::test]
async fn test_merge_across_formats() {
    let fetcher = MemoryFetcher::with(&[("txt", SAMPLE_TXT), ("m3u", SAMPLE_M3U)]);
    let prober = CountingProber::live(&healthy_urls());
    let pipeline = memory_pipeline(fetcher, prober, &["txt", "m3u"], 4);

    let result = pipeline.run_once().await;
    let snapshot = pipeline.snapshot().await;

    assert_eq!(result.updated_count, 6);
    assert_eq!(result.live_count, 6);

    let cctv1 = snapshot.get("cctv-1/央视频道/unknown").unwrap();
    assert_eq!(
        cctv1.urls,
        vec!["http://cctv.example/1.m3u8", "http://mirror.example/cctv1.m3u8"]
    );
    assert_eq!(cctv1.source_repository, "txt");

    let cctv2 = snapshot.get("cctv-2/央视频道/unknown").unwrap();
    assert_eq!(
        cctv2.urls,
        vec!["http://cctv.example/2.m3u8", "http://backup.example/2.m3u8"]
    );

    let dongfang = snapshot.get("东方卫视/卫视频道/unknown").unwrap();
    assert_eq!(dongfang.language, "Chinese");
    assert_eq!(dongfang.source_repository, "m3u");

    let zhejiang = snapshot.get("浙江卫视/卫视频道/unknown").unwrap();
    assert_eq!(zhejiang.url(), Some("http://ws.example/zhejiang.m3u8"));

    assert_eq!(snapshot.by_category("卫视频道").len(), 3);
    assert_eq!(snapshot.by_language("chinese").len(), 1);
    assert_eq!(snapshot.languages(), vec!["chinese", "unknown"]);
    assert_eq!(snapshot.search("cctv").len(), 3);
}

#[tokio::test]
async fn test_probes_never_exceed_worker_count() {
    let rows: Vec<(String, String)> = (0..60)
        .map(|i| (format!("Channel {i}"), format!("http://s.example/{i}")))
        .collect();
    let row_refs: Vec<(&str, &str)> = rows
        .iter()
        .map(|(n, u)| (n.as_str(), u.as_str()))
        .collect();
    let live: Vec<String> = rows.iter().step_by(2).map(|(_, u)| u.clone()).collect();
    let live_refs: Vec<&str> = live.iter().map(String::as_str).collect();

    let fetcher = MemoryFetcher::with(&[("repo", txt_repo("综合", &row_refs).as_str())]);
    let prober = CountingProber::slow(&live_refs, Duration::from_millis(10));
    let pipeline = memory_pipeline(fetcher, prober.clone(), &["repo"], 5);

    let result = pipeline.run_once().await;

    assert_eq!(result.updated_count, 60);
    assert_eq!(result.live_count, 30);
    assert_eq!(result.dead_count, 30);
    assert!(prober.peak() <= 5, "peak in-flight probes was {}", prober.peak());
    assert!(prober.peak() >= 2);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let fetcher = MemoryFetcher::with(&[("txt", SAMPLE_TXT), ("m3u", SAMPLE_M3U)]);
    let prober = CountingProber::live(&[
        "http://cctv.example/1.m3u8",
        "http://backup.example/2.m3u8",
        "http://ws.example/hunan.m3u8",
    ]);
    let pipeline = memory_pipeline(fetcher, prober, &["txt", "m3u"], 3);

    pipeline.run_once().await;
    let first = pipeline.snapshot().await;
    pipeline.run_once().await;
    let second = pipeline.snapshot().await;

    let view = |c: &Catalog| {
        let mut v: Vec<_> = c
            .entries()
            .iter()
            .map(|e| (e.id.clone(), e.status()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    };

    assert_eq!(second.generation(), first.generation() + 1);
    assert_eq!(view(&first), view(&second));
    assert_eq!(
        second.get("cctv-2/央视频道/unknown").unwrap().url(),
        Some("http://backup.example/2.m3u8")
    );
}

#[tokio::test]
async fn test_readers_see_previous_generation_during_run() {
    let fetcher = MemoryFetcher::with(&[("repo", txt_repo("x", &[("A", "http://a/1")]).as_str())]);
    let prober = CountingProber::slow(&["http://a/1"], Duration::from_millis(200));
    let pipeline = Arc::new(memory_pipeline(fetcher, prober, &["repo"], 1));

    let running = Arc::clone(&pipeline);
    let handle = tokio::spawn(async move { running.run_once().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pipeline.is_running());
    assert_eq!(pipeline.snapshot().await.generation(), 0);
    assert!(pipeline.snapshot().await.is_empty());

    let result = handle.await.unwrap();
    assert_eq!(result.generation, 1);
    assert_eq!(pipeline.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_reload_continues_generations() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileCatalogStore::new(temp_dir.path());
    let fetcher = MemoryFetcher::with(&[("txt", SAMPLE_TXT)]);
    let prober = CountingProber::live(&healthy_urls());

    let first = PipelineBuilder::new()
        .fetcher(fetcher.clone())
        .prober(prober.clone())
        .persister(Arc::new(files.clone()))
        .repositories(vec!["txt".into()])
        .build()
        .unwrap();
    first.run_once().await;
    first.run_once().await;

    let reloaded = files.load().await.unwrap();
    assert_eq!(reloaded.generation(), 2);
    assert_eq!(reloaded.len(), 5);

    let second = PipelineBuilder::new()
        .store(Arc::new(CatalogStore::new(reloaded)))
        .fetcher(fetcher)
        .prober(prober)
        .persister(Arc::new(files.clone()))
        .repositories(vec!["txt".into()])
        .build()
        .unwrap();
    let result = second.run_once().await;

    assert_eq!(result.generation, 3);
    let servable = second
        .store()
        .query(&CatalogQuery::default().category("央视频道").servable_only())
        .await;
    assert_eq!(servable.len(), 3);
}

#[tokio::test]
async fn test_aborted_run_still_writes_summary() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileCatalogStore::new(temp_dir.path());
    let pipeline = PipelineBuilder::new()
        .fetcher(MemoryFetcher::with(&[]))
        .prober(CountingProber::live(&[]))
        .persister(Arc::new(files.clone()))
        .repositories(vec!["gone".into()])
        .build()
        .unwrap();

    let result = pipeline.run_once().await;

    assert!(!result.is_published());
    assert!(!files.catalog_path().exists());
    let stats: serde_json::Value =
        serde_json::from_slice(&std::fs::read(files.stats_path().unwrap()).unwrap()).unwrap();
    assert_eq!(stats["abortedReason"], "all 1 repositories failed to fetch");
    assert_eq!(stats["sources"]["failed"], 1);
    assert_eq!(stats["generation"], 0);
}
