//! Constants and model detection for the Cloud Code upstream.
//!
//! This module contains API endpoints, OAuth configuration, model family
//! detection, signature handling constants, and the static fallback-model
//! table used when a model has no available accounts.

use std::time::Duration;

// ============================================================================
// API Endpoints
// ============================================================================

/// Daily/experimental Cloud Code API endpoint.
pub const CLOUDCODE_ENDPOINT_DAILY: &str = "https://daily-cloudcode-pa.googleapis.com";

/// Production Cloud Code API endpoint.
pub const CLOUDCODE_ENDPOINT_PROD: &str = "https://cloudcode-pa.googleapis.com";

/// Endpoint fallback order for generateContent requests (daily first).
///
/// The daily endpoint typically has newer features and better availability
/// for generateContent requests.
pub const CLOUDCODE_ENDPOINT_FALLBACKS: &[&str] =
    &[CLOUDCODE_ENDPOINT_DAILY, CLOUDCODE_ENDPOINT_PROD];

/// Endpoint order for loadCodeAssist / onboardUser (prod first).
///
/// The prod endpoint works better for fresh, unprovisioned accounts
/// when discovering project IDs.
pub const LOAD_CODE_ASSIST_ENDPOINTS: &[&str] =
    &[CLOUDCODE_ENDPOINT_PROD, CLOUDCODE_ENDPOINT_DAILY];

/// Path for generateContent (non-streaming JSON).
pub const API_PATH_GENERATE_CONTENT: &str = "/v1internal:generateContent";

/// Path for streamGenerateContent (SSE).
pub const API_PATH_STREAM_GENERATE_CONTENT: &str = "/v1internal:streamGenerateContent?alt=sse";

/// Path for loadCodeAssist (project discovery).
pub const API_PATH_LOAD_CODE_ASSIST: &str = "/v1internal:loadCodeAssist";

/// Path for onboardUser (project provisioning).
pub const API_PATH_ONBOARD_USER: &str = "/v1internal:onboardUser";

// ============================================================================
// OAuth Configuration
// ============================================================================

/// OAuth 2.0 configuration for Google authentication.
///
/// These are the Antigravity desktop app's credentials, which are
/// intentionally public (they ship inside the application).
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID.
    pub client_id: &'static str,
    /// OAuth client secret.
    pub client_secret: &'static str,
    /// Token URL for refresh-token exchange.
    pub token_url: &'static str,
}

/// Default OAuth configuration for Google Cloud Code.
pub const DEFAULT_OAUTH_CONFIG: OAuthConfig = OAuthConfig {
    client_id: "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com",
    client_secret: "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",
    token_url: "https://oauth2.googleapis.com/token",
};

// ============================================================================
// Model Detection
// ============================================================================

/// Model family classification.
///
/// Determines format conversion and signature handling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Anthropic Claude models.
    Claude,
    /// Google Gemini models.
    Gemini,
    /// Unknown model family.
    Unknown,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Claude => write!(f, "claude"),
            ModelFamily::Gemini => write!(f, "gemini"),
            ModelFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// Determine the model family from a model name.
///
/// Detection is case-insensitive and looks for "claude" or "gemini"
/// anywhere in the model name.
pub fn get_model_family(model: &str) -> ModelFamily {
    let lower = model.to_lowercase();
    if lower.contains("claude") {
        ModelFamily::Claude
    } else if lower.contains("gemini") {
        ModelFamily::Gemini
    } else {
        ModelFamily::Unknown
    }
}

/// Check if a model supports thinking/reasoning output.
///
/// Thinking models are Claude models with "thinking" in the name, Gemini
/// models with "thinking" in the name, and Gemini version 3+ models.
pub fn is_thinking_model(model: &str) -> bool {
    let lower = model.to_lowercase();

    if lower.contains("claude") && lower.contains("thinking") {
        return true;
    }

    if lower.contains("gemini") {
        if lower.contains("thinking") {
            return true;
        }
        // gemini-3 and above enable thinking implicitly
        if let Some(version_start) = lower.find("gemini-") {
            let after_prefix = &lower[version_start + 7..];
            let version_str: String = after_prefix
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(version) = version_str.parse::<u32>() {
                if version >= 3 {
                    return true;
                }
            }
        }
    }

    false
}

/// Known Claude model identifiers served by the upstream.
pub const CLAUDE_MODELS: &[&str] = &[
    "claude-opus-4-5-thinking",
    "claude-sonnet-4-5-thinking",
    "claude-sonnet-4-5",
];

/// Known Gemini model identifiers served by the upstream.
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-3-pro-high",
    "gemini-3-pro-low",
    "gemini-3-flash",
    "gemini-2.5-flash-lite",
];

/// Static fallback-model table.
///
/// Consulted only when the primary model has zero available accounts,
/// never on a mere rate limit with a viable wait.
pub const FALLBACK_MODELS: &[(&str, &str)] = &[
    ("gemini-3-pro-high", "claude-opus-4-5-thinking"),
    ("claude-opus-4-5-thinking", "gemini-3-pro-high"),
    ("gemini-3-flash", "claude-sonnet-4-5-thinking"),
    ("claude-sonnet-4-5-thinking", "gemini-3-flash"),
    ("gemini-3-pro-low", "claude-sonnet-4-5"),
    ("claude-sonnet-4-5", "gemini-3-flash"),
];

/// Look up the fallback model for a given model id.
pub fn fallback_model(model: &str) -> Option<&'static str> {
    FALLBACK_MODELS
        .iter()
        .find(|(from, _)| *from == model)
        .map(|(_, to)| *to)
}

// ============================================================================
// Signatures and Limits
// ============================================================================

/// Default project ID used when project discovery fails.
///
/// This is a shared fallback project that may have limited quota.
pub const DEFAULT_PROJECT_ID: &str = "rising-fact-p41fc";

/// Default maximum output tokens for Gemini models.
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 65536;

/// Sentinel value accepted by Gemini in place of a real thought signature.
///
/// Clients routinely strip the `thoughtSignature` field from tool calls;
/// injecting this value bypasses signature validation on the replayed turn.
pub const GEMINI_SKIP_SIGNATURE: &str = "skip_thought_signature_validator";

/// Default TTL for cached thought signatures.
pub const SIGNATURE_CACHE_TTL: Duration = Duration::from_secs(7200);

/// Minimum valid thinking signature length.
///
/// Signatures shorter than this are invalid or truncated and are never
/// forwarded upstream.
pub const MIN_SIGNATURE_LENGTH: usize = 50;

/// Default thinking budget for Gemini thinking models.
pub const GEMINI_DEFAULT_THINKING_BUDGET: u32 = 16000;

/// Default thinking budget for Claude thinking models.
pub const CLAUDE_DEFAULT_THINKING_BUDGET: u32 = 10000;

/// Headroom added above the thinking budget when `max_tokens` is too small
/// to hold both the thinking trace and the visible response.
pub const CLAUDE_THINKING_HEADROOM: u32 = 8192;

// ============================================================================
// Retry and Rate Limiting
// ============================================================================

/// Default cooldown applied when a 429 carries no usable reset hint.
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

/// Maximum time the dispatcher will sleep waiting for a rate-limited
/// account before surfacing `NoAccounts` to the caller.
pub const MAX_WAIT_BEFORE_ERROR_MS: u64 = 120_000;

/// Maximum account/endpoint retry attempts per request.
pub const MAX_ATTEMPTS: u32 = 5;

/// Maximum number of accounts in the pool.
pub const MAX_ACCOUNTS: usize = 10;

// ============================================================================
// HTTP Defaults
// ============================================================================

/// Default port the proxy listens on.
pub const DEFAULT_PORT: u16 = 8082;

/// User-Agent header value for upstream requests.
pub const USER_AGENT: &str = "antigravity/1.11.5 (linux; x64)";

/// X-Goog-Api-Client header value.
pub const GOOG_API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";

/// Client-Metadata header value (JSON).
pub const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;

/// Beta header required for Claude interleaved thinking.
pub const ANTHROPIC_BETA_INTERLEAVED: &str = "interleaved-thinking-2025-05-14";

/// Connection timeout for upstream requests.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall deadline for non-streaming upstream requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// System Instruction
// ============================================================================

/// Identity preamble expected by the Cloud Code endpoint.
///
/// Prepended ahead of the caller's system prompt on every request.
pub const ANTIGRAVITY_SYSTEM_INSTRUCTION: &str = "You are Antigravity, a powerful agentic AI coding assistant designed by the Google Deepmind team working on Advanced Agentic Coding.";

/// Sentinel appended to the system prompt for Claude thinking models that
/// also carry tools.
pub const INTERLEAVED_THINKING_HINT: &str = "Interleaved thinking is enabled. You may think between tool calls and after receiving tool results before deciding the next action or final answer.";
