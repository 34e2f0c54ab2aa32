//! Stream probes
//!
//! A probe answers "is this URL serving a live stream right now". It checks
//! content, not just connectivity: an HTTP 200 carrying an HTML error page is
//! a failure. A failed probe is a verdict, not an error.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, StatusCode};
use std::fmt;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};

use crate::crawler::headers::build_probe_headers;
use crate::utils::{host_port, url_scheme};

/// Bytes inspected from a stream body
const HEAD_BYTES: usize = 2048;

/// MPEG transport stream sync byte
const TS_SYNC_BYTE: u8 = 0x47;

/// Why a probe did not find a live stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// No answer within the probe timeout
    Timeout,
    /// Connection refused, reset, DNS failure and the like
    Connect(String),
    /// Non-success HTTP status
    Status(u16),
    /// Response is not stream content (e.g. an HTML page)
    ContentType(String),
    /// Body is neither a playlist nor a transport stream
    InvalidPlaylist,
    /// URL scheme cannot be probed
    UnsupportedScheme(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::ContentType(ct) => write!(f, "unexpected content type '{ct}'"),
            Self::InvalidPlaylist => write!(f, "not a playlist or stream"),
            Self::UnsupportedScheme(s) => write!(f, "unsupported scheme '{s}'"),
        }
    }
}

impl ProbeFailure {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Status(_) => "status",
            Self::ContentType(_) => "content_type",
            Self::InvalidPlaylist => "invalid_playlist",
            Self::UnsupportedScheme(_) => "unsupported_scheme",
        }
    }
}

/// Verdict of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }

    fn from_result(result: Result<(), ProbeFailure>) -> Self {
        match result {
            Ok(()) => Self::Reachable,
            Err(failure) => Self::Unreachable(failure),
        }
    }
}

/// Probes one stream URL
///
/// Callers bound every call with their own timeout.
#[async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Probe implementation over reqwest and tokio sockets
pub struct HttpStreamProber {
    client: Client,
}

impl HttpStreamProber {
    /// Create a prober; `timeout` also bounds each HTTP request
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn probe_http(&self, url: &str) -> Result<(), ProbeFailure> {
        // Many origins reject HEAD, so a failed HEAD falls through to GET
        if let Ok(response) = self.send(Method::HEAD, url).await {
            if response.status().is_success() && is_stream_content_type(&content_type(&response)) {
                return Ok(());
            }
        }

        let mut response = self.send(Method::GET, url).await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(ProbeFailure::Status(status.as_u16()));
        }

        let ct = content_type(&response);
        if is_stream_content_type(&ct) {
            return Ok(());
        }

        let mut head = Vec::with_capacity(HEAD_BYTES);
        while head.len() < HEAD_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => head.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return Err(request_failure(e)),
            }
        }

        classify_body(&ct, &head)
    }

    async fn send(&self, method: Method, url: &str) -> Result<reqwest::Response, ProbeFailure> {
        let ranged = method == Method::GET;
        self.client
            .request(method, url)
            .headers(build_probe_headers(ranged))
            .send()
            .await
            .map_err(request_failure)
    }

    async fn probe_udp(url: &str) -> Result<(), ProbeFailure> {
        let (host, port) = host_port(url, 1234)
            .ok_or_else(|| ProbeFailure::Connect(format!("no address in {url}")))?;

        let addr = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?
            .next()
            .ok_or_else(|| ProbeFailure::Connect(format!("{host} did not resolve")))?;

        let bind = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;
        socket
            .send_to(&[0u8], addr)
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;

        Ok(())
    }

    async fn probe_tcp(url: &str, default_port: u16) -> Result<(), ProbeFailure> {
        let (host, port) = host_port(url, default_port)
            .ok_or_else(|| ProbeFailure::Connect(format!("no address in {url}")))?;

        TcpStream::connect((host.as_str(), port))
            .await
            .map(|_| ())
            .map_err(|e| ProbeFailure::Connect(e.to_string()))
    }
}

#[async_trait]
impl StreamProber for HttpStreamProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let scheme = url_scheme(url).unwrap_or_default();
        let result = match scheme.as_str() {
            "http" | "https" => self.probe_http(url).await,
            "udp" | "rtp" => Self::probe_udp(url).await,
            "rtmp" => Self::probe_tcp(url, 1935).await,
            "rtsp" => Self::probe_tcp(url, 554).await,
            _ => Err(ProbeFailure::UnsupportedScheme(scheme)),
        };
        ProbeOutcome::from_result(result)
    }
}

fn request_failure(e: reqwest::Error) -> ProbeFailure {
    if e.is_timeout() {
        ProbeFailure::Timeout
    } else {
        ProbeFailure::Connect(e.to_string())
    }
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Whether a content type alone identifies stream content
pub fn is_stream_content_type(content_type: &str) -> bool {
    let ct = content_type.trim().to_ascii_lowercase();
    ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct.contains("mpegurl")
        || ct.contains("octet-stream")
        || ct.contains("mp2t")
        || ct.contains("dash+xml")
}

/// Judge a response body head when the content type was inconclusive
pub fn classify_body(content_type: &str, head: &[u8]) -> Result<(), ProbeFailure> {
    if content_type.contains("html") {
        return Err(ProbeFailure::ContentType(content_type.to_string()));
    }

    if head.first() == Some(&TS_SYNC_BYTE) {
        return Ok(());
    }

    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("#EXTM3U") || text.contains("#EXTINF") {
        return Ok(());
    }

    if text.starts_with('<') {
        return Err(ProbeFailure::ContentType(String::from("text/html")));
    }

    Err(ProbeFailure::InvalidPlaylist)
}
