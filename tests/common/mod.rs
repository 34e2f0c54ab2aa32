//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tvbox_sync::crawler::fetcher::RepositoryFetcher;
use tvbox_sync::crawler::prober::{ProbeFailure, ProbeOutcome, StreamProber};
use tvbox_sync::utils::error::FetchError;

/// Repositories held in memory; unknown locators fail with a 503
#[derive(Default)]
pub struct MemoryFetcher {
    repos: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn with(repos: &[(&str, &str)]) -> Arc<Self> {
        let fetcher = Self::default();
        for (locator, text) in repos {
            fetcher.set(locator, text);
        }
        Arc::new(fetcher)
    }

    pub fn set(&self, locator: &str, text: &str) {
        self.repos
            .lock()
            .unwrap()
            .insert(locator.to_string(), text.to_string());
    }

    pub fn remove(&self, locator: &str) {
        self.repos.lock().unwrap().remove(locator);
    }

    pub fn clear(&self) {
        self.repos.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryFetcher for MemoryFetcher {
    async fn fetch_repository(&self, locator: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or(FetchError::Status(503))
    }
}

/// Prober with a fixed live set that records calls and peak concurrency
#[derive(Default)]
pub struct CountingProber {
    live: Mutex<HashSet<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl CountingProber {
    pub fn live(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(urls.iter().map(|u| u.to_string()).collect()),
            ..Default::default()
        })
    }

    pub fn slow(urls: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(urls.iter().map(|u| u.to_string()).collect()),
            delay,
            ..Default::default()
        })
    }

    pub fn set_live(&self, urls: &[&str]) {
        *self.live.lock().unwrap() = urls.iter().map(|u| u.to_string()).collect();
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probed(&self, url: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == url)
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl StreamProber for CountingProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(url.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reachable = self.live.lock().unwrap().contains(url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if reachable {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::Unreachable(ProbeFailure::Connect("connection refused".into()))
        }
    }
}

/// Repository text in TVBox format, one category
pub fn txt_repo(category: &str, rows: &[(&str, &str)]) -> String {
    let mut text = format!("{category},#genre#\n");
    for (name, urls) in rows {
        text.push_str(&format!("{name},{urls}\n"));
    }
    text
}
