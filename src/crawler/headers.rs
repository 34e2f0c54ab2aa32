use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RANGE, USER_AGENT};

/// Browser User-Agent strings rotated across repository requests
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Player-like User-Agent used for stream probes
pub const PROBE_USER_AGENT: &str = "Lavf/60.3.100";

/// Pick a random User-Agent from the pool
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Build headers for a repository list request
///
/// Uses `user_agent` when given, otherwise a rotated browser UA.
pub fn build_list_headers(user_agent: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let ua = user_agent
        .and_then(|ua| HeaderValue::from_str(ua).ok())
        .unwrap_or_else(|| HeaderValue::from_static(random_user_agent()));
    headers.insert(USER_AGENT, ua);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/plain,audio/x-mpegurl,application/vnd.apple.mpegurl,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );

    headers
}

/// Build headers for a stream probe
///
/// `ranged` adds a small byte range so a GET only pulls the stream head.
pub fn build_probe_headers(ranged: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(PROBE_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    if ranged {
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-2047"));
    }

    headers
}
