//! HTTP client for the Cloud Code endpoint.
//!
//! Builds the header set the endpoint expects, wraps generative requests
//! in the Cloud Code envelope (identity preamble included), and issues
//! POSTs against a single endpoint; endpoint and account failover policy
//! live in the dispatcher, which classifies each response itself.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Response;
use serde::Serialize;
use tracing::debug;

use crate::constants::{
    get_model_family, is_thinking_model, ModelFamily, ANTHROPIC_BETA_INTERLEAVED,
    ANTIGRAVITY_SYSTEM_INSTRUCTION, API_PATH_GENERATE_CONTENT, API_PATH_STREAM_GENERATE_CONTENT,
    CLIENT_METADATA, CONNECT_TIMEOUT, GOOG_API_CLIENT, REQUEST_TIMEOUT, USER_AGENT,
};
use crate::models::google::{CloudCodeWrapper, Content, GoogleRequest, Part};

/// Thin wrapper around a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    /// Overrides the Cloud Code endpoints; used by tests.
    base_url: Option<String>,
}

impl HttpClient {
    /// Create a client with the standard timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(connect: Duration, request: Duration) -> Self {
        let inner = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .unwrap_or_default();
        Self {
            inner,
            base_url: None,
        }
    }

    /// Point every request at a fixed base URL (for tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// The endpoint list to try, honoring the test override.
    pub fn endpoints(&self) -> Vec<String> {
        match &self.base_url {
            Some(url) => vec![url.clone()],
            None => crate::constants::CLOUDCODE_ENDPOINT_FALLBACKS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// POST a JSON body to one endpoint.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        path: &str,
        token: &str,
        model: &str,
        sse: bool,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{endpoint}{path}");
        debug!(url = %url, model = %model, token = %mask_token(token), "POST upstream");
        self.inner
            .post(&url)
            .headers(build_headers(token, model, sse))
            .json(body)
            .send()
            .await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the header set for a Cloud Code request.
///
/// `Accept: text/event-stream` is sent only on SSE paths; the unary JSON
/// path deliberately sends no `Accept` header at all (the endpoint
/// answers differently when one is present).
pub fn build_headers(token: &str, model: &str, sse: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(USER_AGENT),
    );
    headers.insert(
        HeaderName::from_static("x-goog-api-client"),
        HeaderValue::from_static(GOOG_API_CLIENT),
    );
    headers.insert(
        HeaderName::from_static("client-metadata"),
        HeaderValue::from_static(CLIENT_METADATA),
    );

    if get_model_family(model) == ModelFamily::Claude && is_thinking_model(model) {
        headers.insert(
            HeaderName::from_static("anthropic-beta"),
            HeaderValue::from_static(ANTHROPIC_BETA_INTERLEAVED),
        );
    }

    if sse {
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
    }

    headers
}

/// Pick the API path for a request.
///
/// Thinking-capable models must use the SSE path even for unary calls;
/// the dispatcher then collects the stream into a single response.
pub fn api_path(model: &str, streaming: bool) -> &'static str {
    if streaming || is_thinking_model(model) {
        API_PATH_STREAM_GENERATE_CONTENT
    } else {
        API_PATH_GENERATE_CONTENT
    }
}

/// Whether the chosen path speaks SSE.
pub fn path_is_sse(path: &str) -> bool {
    path == API_PATH_STREAM_GENERATE_CONTENT
}

/// Wrap a generative request in the Cloud Code envelope.
///
/// The Antigravity identity preamble is prepended ahead of the caller's
/// system instruction; the endpoint expects it on every request.
pub fn wrap_request(project_id: &str, model: &str, mut request: GoogleRequest) -> CloudCodeWrapper {
    let mut system_parts = vec![Part::text(ANTIGRAVITY_SYSTEM_INSTRUCTION)];
    if let Some(existing) = request.system_instruction.take() {
        system_parts.extend(existing.parts);
    }
    request.system_instruction = Some(Content {
        role: Some("user".to_string()),
        parts: system_parts,
    });

    CloudCodeWrapper::new(project_id, model, request)
}

/// Mask a token for logging: first four and last four characters only.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 {
        return "***".to_string();
    }
    format!("{}***{}", &token[..4], &token[token.len() - 4..])
}
