//! Runtime configuration.
//!
//! All knobs are environment variables with compile-time defaults from
//! [`crate::constants`]. The configuration is loaded once at startup and
//! shared through the application state.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

/// Runtime configuration for the proxy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server listens on (`PORT`).
    pub port: u16,

    /// Maximum number of accounts the pool will hold (`MAX_ACCOUNTS`).
    pub max_accounts: usize,

    /// Maximum account/endpoint retry attempts per request (`MAX_ATTEMPTS`).
    pub max_attempts: u32,

    /// Longest the dispatcher sleeps for a rate-limited account before
    /// surfacing an error (`MAX_WAIT_BEFORE_ERROR_MS`).
    pub max_wait_before_error: Duration,

    /// Output-token clamp for Gemini destinations (`GEMINI_MAX_OUTPUT_TOKENS`).
    pub gemini_max_output_tokens: u32,

    /// TTL for the thought-signature cache (`GEMINI_SIGNATURE_CACHE_TTL_MS`).
    pub signature_cache_ttl: Duration,

    /// Minimum valid thinking signature length (`MIN_SIGNATURE_LENGTH`).
    pub min_signature_length: usize,

    /// Path of the persisted account file (`ACCOUNTS_FILE`).
    pub accounts_file: PathBuf,

    /// Cooldown applied when a 429 carries no reset hint
    /// (`COOLDOWN_DURATION_MS`).
    pub cooldown_duration: Duration,

    /// Emit logs as JSON (`LOG_JSON`).
    pub log_json: bool,

    /// Whether the static fallback-model table is consulted when a model
    /// has zero available accounts (`FALLBACK_ENABLED`).
    pub fallback_enabled: bool,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", constants::DEFAULT_PORT),
            max_accounts: env_parse("MAX_ACCOUNTS", constants::MAX_ACCOUNTS),
            max_attempts: env_parse("MAX_ATTEMPTS", constants::MAX_ATTEMPTS),
            max_wait_before_error: Duration::from_millis(env_parse(
                "MAX_WAIT_BEFORE_ERROR_MS",
                constants::MAX_WAIT_BEFORE_ERROR_MS,
            )),
            gemini_max_output_tokens: env_parse(
                "GEMINI_MAX_OUTPUT_TOKENS",
                constants::GEMINI_MAX_OUTPUT_TOKENS,
            ),
            signature_cache_ttl: Duration::from_millis(env_parse(
                "GEMINI_SIGNATURE_CACHE_TTL_MS",
                constants::SIGNATURE_CACHE_TTL.as_millis() as u64,
            )),
            min_signature_length: env_parse(
                "MIN_SIGNATURE_LENGTH",
                constants::MIN_SIGNATURE_LENGTH,
            ),
            accounts_file: std::env::var("ACCOUNTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_accounts_file()),
            cooldown_duration: Duration::from_millis(env_parse(
                "COOLDOWN_DURATION_MS",
                constants::DEFAULT_COOLDOWN_MS,
            )),
            log_json: env_parse("LOG_JSON", false),
            fallback_enabled: env_parse("FALLBACK_ENABLED", true),
        }
    }

    /// The socket address string the server binds to.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_PORT,
            max_accounts: constants::MAX_ACCOUNTS,
            max_attempts: constants::MAX_ATTEMPTS,
            max_wait_before_error: Duration::from_millis(constants::MAX_WAIT_BEFORE_ERROR_MS),
            gemini_max_output_tokens: constants::GEMINI_MAX_OUTPUT_TOKENS,
            signature_cache_ttl: constants::SIGNATURE_CACHE_TTL,
            min_signature_length: constants::MIN_SIGNATURE_LENGTH,
            accounts_file: default_accounts_file(),
            cooldown_duration: Duration::from_millis(constants::DEFAULT_COOLDOWN_MS),
            log_json: false,
            fallback_enabled: true,
        }
    }
}

/// Resolve the default account-file path under the user config dir.
fn default_accounts_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("antigravity-proxy")
        .join("accounts.json")
}

/// Parse an environment variable, falling back to `default` when the
/// variable is unset or unparseable.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
