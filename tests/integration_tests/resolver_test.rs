//! Replacement resolution through the full pipeline

use std::sync::Arc;
use tvbox_sync::crawler::pipeline::{PipelineBuilder, RefreshPipeline};
use tvbox_sync::models::ChannelStatus;

use crate::common::{txt_repo, CountingProber, MemoryFetcher};

fn pipeline(
    fetcher: Arc<MemoryFetcher>,
    prober: Arc<CountingProber>,
    repos: &[&str],
    fallback: &[&str],
) -> RefreshPipeline {
    PipelineBuilder::new()
        .fetcher(fetcher)
        .prober(prober)
        .repositories(repos.iter().map(|r| r.to_string()).collect())
        .supplementary_repositories(fallback.iter().map(|r| r.to_string()).collect())
        .workers(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_first_working_alternate_is_promoted() {
    let fetcher = MemoryFetcher::with(&[(
        "repo",
        txt_repo("央视频道", &[("CCTV-1", "http://a/1#http://b/1#http://c/1")]).as_str(),
    )]);
    let prober = CountingProber::live(&["http://b/1", "http://c/1"]);
    let p = pipeline(fetcher, prober.clone(), &["repo"], &[]);

    let result = p.run_once().await;

    assert_eq!(result.resolved_count, 1);
    let snapshot = p.snapshot().await;
    let entry = snapshot.get("cctv-1/央视频道/unknown").unwrap();
    assert_eq!(entry.status(), ChannelStatus::Live);
    assert_eq!(entry.urls, vec!["http://b/1", "http://a/1", "http://c/1"]);
    assert_eq!(prober.calls(), vec!["http://a/1", "http://b/1"]);
    assert!(!prober.probed("http://c/1"));
}

#[tokio::test]
async fn test_winning_url_is_tried_first_next_run() {
    let fetcher = MemoryFetcher::with(&[(
        "repo",
        txt_repo("x", &[("A", "http://a/1#http://a/2")]).as_str(),
    )]);
    let prober = CountingProber::live(&["http://a/2"]);
    let p = pipeline(fetcher, prober.clone(), &["repo"], &[]);

    p.run_once().await;
    prober.reset_calls();
    let second = p.run_once().await;

    assert_eq!(second.resolved_count, 0);
    assert_eq!(second.live_count, 1);
    assert_eq!(prober.calls(), vec!["http://a/2"]);
}

#[tokio::test]
async fn test_supplementary_repository_supplies_replacement() {
    let fetcher = MemoryFetcher::with(&[
        ("main", txt_repo("央视频道", &[("CCTV-1", "http://dead/1"), ("CCTV-2", "http://dead/2")]).as_str()),
        ("search", txt_repo("央视频道", &[("CCTV-1", "http://dead/1#http://fresh/1")]).as_str()),
    ]);
    let prober = CountingProber::live(&["http://fresh/1"]);
    let p = pipeline(fetcher.clone(), prober.clone(), &["main"], &["search"]);

    let result = p.run_once().await;

    assert_eq!(result.resolved_count, 1);
    assert_eq!(result.dead_count, 1);

    let snapshot = p.snapshot().await;
    let cctv1 = snapshot.get("cctv-1/央视频道/unknown").unwrap();
    assert_eq!(cctv1.urls, vec!["http://fresh/1", "http://dead/1"]);
    assert_eq!(cctv1.status(), ChannelStatus::Live);

    // One fetch of "main" plus one shared fetch of "search"
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
        prober.calls().iter().filter(|u| *u == "http://dead/1").count(),
        1
    );
}

#[tokio::test]
async fn test_name_only_entry_filled_from_other_repository() {
    let fetcher = MemoryFetcher::with(&[
        ("names", "央视频道,#genre#\nCCTV-5\n"),
        ("urls", txt_repo("体育频道", &[("CCTV-5", "http://sports/5")]).as_str()),
    ]);
    let prober = CountingProber::live(&["http://sports/5"]);
    let p = pipeline(fetcher, prober, &["names", "urls"], &["urls"]);

    let result = p.run_once().await;

    assert_eq!(result.updated_count, 2);
    assert_eq!(result.unchecked_count, 0);
    let snapshot = p.snapshot().await;
    let named = snapshot.get("cctv-5/央视频道/unknown").unwrap();
    assert_eq!(named.urls, vec!["http://sports/5"]);
    assert!(named.is_servable());
}

#[tokio::test]
async fn test_unreachable_supplementary_source_degrades_to_dead() {
    let fetcher = MemoryFetcher::with(&[("main", txt_repo("x", &[("A", "http://a/1")]).as_str())]);
    let prober = CountingProber::live(&[]);
    let p = pipeline(fetcher, prober, &["main"], &["missing"]);

    let result = p.run_once().await;

    assert!(result.is_published());
    assert_eq!(result.dead_count, 1);
    assert!(result.failed_repositories.is_empty());
}

#[tokio::test]
async fn test_live_url_survives_failure_of_its_repository() {
    let fetcher = MemoryFetcher::with(&[
        ("repo-a", txt_repo("x", &[("A", "http://a/1")]).as_str()),
        ("repo-b", txt_repo("x", &[("A", "http://b/1")]).as_str()),
    ]);
    let prober = CountingProber::live(&["http://a/1"]);
    let p = pipeline(fetcher.clone(), prober.clone(), &["repo-a", "repo-b"], &[]);

    p.run_once().await;
    let first = p.snapshot().await;
    assert_eq!(first.get("a/x/unknown").unwrap().urls, vec!["http://a/1", "http://b/1"]);

    fetcher.remove("repo-a");
    prober.reset_calls();
    let second = p.run_once().await;

    assert_eq!(second.failed_repositories, vec!["repo-a"]);
    assert_eq!(second.live_count, 1);
    let snapshot = p.snapshot().await;
    let entry = snapshot.get("a/x/unknown").unwrap();
    assert_eq!(entry.status(), ChannelStatus::Live);
    assert_eq!(entry.urls, vec!["http://a/1", "http://b/1"]);
    assert_eq!(entry.source_repository, "repo-b");
    assert_eq!(prober.calls(), vec!["http://a/1"]);
}

#[tokio::test]
async fn test_supplementary_winner_is_tried_first_next_run() {
    let fetcher = MemoryFetcher::with(&[
        ("main", txt_repo("央视频道", &[("CCTV-1", "http://dead/1")]).as_str()),
        ("search", txt_repo("体育频道", &[("CCTV-1", "http://alt/1")]).as_str()),
    ]);
    let prober = CountingProber::live(&["http://alt/1"]);
    let p = pipeline(fetcher.clone(), prober.clone(), &["main"], &["search"]);

    let first = p.run_once().await;
    assert_eq!(first.resolved_count, 1);
    assert_eq!(
        p.snapshot().await.get("cctv-1/央视频道/unknown").unwrap().urls,
        vec!["http://alt/1", "http://dead/1"]
    );

    prober.reset_calls();
    let second = p.run_once().await;

    assert_eq!(second.resolved_count, 0);
    assert_eq!(second.live_count, 1);
    assert_eq!(prober.calls(), vec!["http://alt/1"]);
    // main twice, search only during the first run
    assert_eq!(fetcher.calls(), 3);
}
