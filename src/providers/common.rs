//! Shared HTTP plumbing for provider adapters.

use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    /// One pooled client reused by every adapter, per the connection-reuse rationale the
    /// platform's client pool is built on: DNS/TLS handshakes are expensive enough that a fresh
    /// `reqwest::Client` per call is the wrong default.
    pub static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::Client::builder()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("default TLS backend is available");
}

/// Default per-call timeout for a non-streaming completion (§4.A: "Default 60s for blocking").
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Fast-tier timeout for providers like Groq (§4.A: "30s for fast-path").
pub const FAST_PATH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing the connection itself, before any response bytes arrive.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle-chunk timeout for a streaming completion (§4.A: "idle-chunk timeout of 30s").
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
