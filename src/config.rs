//! Process-wide configuration assembled once at startup.
//!
//! Following the teacher's `CloudLLMConfig` philosophy ("no TOML/YAML parsing dependencies,
//! users construct it however they want"), [`Settings`] is a plain struct read from environment
//! variables via [`Settings::from_env`]. No config file format is introduced; `dotenvy` only
//! loads a local `.env` file into the process environment before `from_env` reads it.

use std::env;
use std::time::Duration;

/// Snapshot of the environment variables the core consults.
///
/// Assembled once at process startup and then passed explicitly into request handlers and
/// workers — there is no global mutable settings singleton.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection string for the persistent relational store. The core never opens this
    /// connection itself (the store is an external collaborator per the core's scope); the
    /// value is only plumbed through for callers that construct a real `Store` implementation.
    pub database_url: Option<String>,
    /// Connection string for the Redis-backed job broker / pub-sub backend, when a caller wires
    /// one in place of the in-memory [`crate::events::EventBus`].
    pub redis_url: Option<String>,
    /// Key used by the external auth layer to encrypt tenant BYOK credentials at rest. The core
    /// never sees encrypted blobs or performs decryption itself; this is threaded through only so
    /// a caller's decryption step can be configured alongside everything else.
    pub secret_key: Option<String>,
    /// Platform-held OpenAI API key, used when a tenant's `TenantLLMConfig` usage mode allows
    /// platform keys.
    pub openai_api_key: Option<String>,
    /// Platform-held Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// Platform-held Groq API key.
    pub groq_api_key: Option<String>,
    /// Base URL workers use for callbacks to the orchestrator (out of the core's scope to call,
    /// but threaded through configuration for completeness).
    pub backend_url: Option<String>,
    /// Size of the worker pool that consumes jobs from the event bus's queue.
    pub max_jobs: usize,
    /// Wall-clock budget, in seconds, allotted to a single job before a worker gives up on it.
    pub job_timeout: Duration,
    /// Hard cap on workflow task transitions (covers both the loop iteration cap and the goto
    /// cap described in the interpreter's error policy).
    pub max_iterations: u32,
    /// Default timezone used for cron evaluation when a scheduled job does not specify one.
    pub default_timezone: String,
    /// Directory a [`crate::store::LedgerBackedStore`] persists its execution/usage ledgers
    /// under. Unused when a caller wires up a database-backed `Store` instead.
    pub ledger_dir: String,
}

impl Settings {
    /// Read settings from the process environment, applying the documented defaults for any
    /// variable that is unset.
    ///
    /// # Example
    ///
    /// ```rust
    /// use conduit::config::Settings;
    ///
    /// std::env::set_var("MAX_JOBS", "25");
    /// let settings = Settings::from_env();
    /// assert_eq!(settings.max_jobs, 25);
    /// std::env::remove_var("MAX_JOBS");
    /// ```
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            secret_key: env::var("SECRET_KEY").ok(),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            groq_api_key: env::var("GROQ_API_KEY").ok(),
            backend_url: env::var("BACKEND_URL").ok(),
            max_jobs: env::var("MAX_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            job_timeout: Duration::from_secs(
                env::var("JOB_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            max_iterations: env::var("MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            default_timezone: env::var("TZ").unwrap_or_else(|_| "Europe/Paris".to_string()),
            ledger_dir: env::var("LEDGER_DIR").unwrap_or_else(|_| "data/ledgers".to_string()),
        }
    }
}

impl Default for Settings {
    /// Settings with no provider keys and the documented defaults — useful for tests.
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            secret_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            backend_url: None,
            max_jobs: 10,
            job_timeout: Duration::from_secs(300),
            max_iterations: 100,
            default_timezone: "Europe/Paris".to_string(),
            ledger_dir: "data/ledgers".to_string(),
        }
    }
}
