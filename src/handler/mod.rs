//! Request dispatch: the retry state machine shared by the unary and
//! streaming handlers.
//!
//! One loop drives both paths; they differ only in what they do with a
//! successful upstream response (collect into a single Messages response
//! vs. yield the SSE event sequence). Per attempt:
//!
//! 1. Sticky account selection, with a bounded cancellable wait when the
//!    whole pool is rate-limited, and a one-shot model fallback when the
//!    primary model has zero available accounts.
//! 2. Token and project resolution through the credential caches.
//! 3. One POST per candidate endpoint (daily, then prod). 401/403 and
//!    `invalid_grant` invalidate the caches and advance the account; 429
//!    marks the rate limit and tries the next endpoint; 5xx, network
//!    failures, and empty streaming bodies try the next endpoint then
//!    advance; other 4xx fail after both endpoints.
//!
//! Attempts are bounded by `MAX_ATTEMPTS`; the loop never spins forever.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::accounts::manager::AccountManager;
use crate::accounts::pool::Account;
use crate::accounts::selector::StickySelection;
use crate::constants::fallback_model;
use crate::config::Config;
use crate::convert::{convert_request, convert_response};
use crate::error::{ProxyError, Result};
use crate::models::google::GoogleResponse;
use crate::models::request::MessagesRequest;
use crate::models::response::MessagesResponse;
use crate::models::stream::StreamEvent;
use crate::ratelimit::parse_reset_time;
use crate::transport::collect::collect_sse_response;
use crate::transport::http::{api_path, path_is_sse, wrap_request, HttpClient};
use crate::transport::sse::SseEventStream;

/// Error-body fragments that mean "rate limited" regardless of status.
const RATE_LIMIT_SIGNATURES: &[&str] = &[
    "RESOURCE_EXHAUSTED",
    "rateLimitExceeded",
    "Quota exceeded",
    "quota exceeded",
];

/// Boxed upstream byte stream with the first chunk already verified.
type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// A successful upstream body.
enum UpstreamBody {
    /// Unary JSON response.
    Json(reqwest::Response),
    /// SSE byte stream, guaranteed to carry at least one byte.
    Sse(ByteStream),
}

/// Outcome of trying one account across all endpoints.
enum AttemptOutcome {
    /// Upstream accepted the request.
    Success(UpstreamBody),
    /// Move to the next account and count an attempt.
    AdvanceAccount,
    /// Terminal failure; surface immediately.
    Fail(ProxyError),
}

/// The dispatcher that owns the retry loop.
#[derive(Clone)]
pub struct Dispatcher {
    manager: Arc<AccountManager>,
    http: HttpClient,
    config: Config,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(manager: Arc<AccountManager>, http: HttpClient, config: Config) -> Self {
        Self {
            manager,
            http,
            config,
        }
    }

    /// The account manager behind this dispatcher.
    pub fn manager(&self) -> &AccountManager {
        &self.manager
    }

    /// Unary path: build, send, and parse one Messages response.
    #[instrument(skip(self, request, cancel), fields(model = %request.model))]
    pub async fn send(
        &self,
        request: &MessagesRequest,
        cancel: CancellationToken,
    ) -> Result<MessagesResponse> {
        let (body, model) = self.acquire(request, false, &cancel).await?;

        match body {
            // Thinking models only answer on the SSE path; collect it.
            UpstreamBody::Sse(stream) => {
                let collected = tokio::select! {
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    r = collect_sse_response(stream, &model) => r,
                };
                Ok(collected)
            }
            UpstreamBody::Json(response) => {
                let google: GoogleResponse = tokio::select! {
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    r = response.json() => r?,
                };
                Ok(convert_response(&google, &model))
            }
        }
    }

    /// Streaming path: build, send, and yield the Anthropic event stream.
    #[instrument(skip(self, request, cancel), fields(model = %request.model))]
    pub async fn stream(
        &self,
        request: &MessagesRequest,
        cancel: CancellationToken,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>> {
        let (body, model) = self.acquire(request, true, &cancel).await?;
        match body {
            UpstreamBody::Sse(stream) => Ok(Box::pin(SseEventStream::new(stream, model))),
            UpstreamBody::Json(_) => Err(ProxyError::Internal(
                "streaming path produced a non-SSE body".to_string(),
            )),
        }
    }

    /// The retry loop. Returns a successful upstream body together with
    /// the model that finally served.
    async fn acquire(
        &self,
        request: &MessagesRequest,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<(UpstreamBody, String)> {
        let mut model = request.model.clone();
        let mut google_request = convert_request(request);
        let mut attempts: u32 = 0;
        let mut total_waited = Duration::ZERO;
        let mut tried_fallback = false;
        let mut last_error: Option<ProxyError> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ProxyError::Cancelled);
            }
            if attempts >= self.config.max_attempts {
                return Err(ProxyError::MaxRetries {
                    attempts,
                    last_error: last_error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no upstream response".to_string()),
                });
            }

            match self.manager.pick_sticky_account(Some(&model)).await {
                StickySelection::Account { account, .. } => {
                    match self
                        .try_account(&account, &model, &google_request, streaming, cancel, &mut last_error)
                        .await?
                    {
                        AttemptOutcome::Success(body) => return Ok((body, model)),
                        AttemptOutcome::AdvanceAccount => {
                            attempts += 1;
                            let _ = self.manager.pick_next(Some(&model)).await;
                        }
                        AttemptOutcome::Fail(error) => return Err(error),
                    }
                }

                StickySelection::Wait { wait_ms } => {
                    if total_waited >= self.config.max_wait_before_error {
                        return Err(ProxyError::NoAccounts {
                            all_rate_limited: true,
                        });
                    }
                    let remaining = self.config.max_wait_before_error - total_waited;
                    let sleep = Duration::from_millis(wait_ms).min(remaining);

                    info!(
                        model = %model,
                        wait_ms = sleep.as_millis() as u64,
                        "All accounts rate limited, waiting for reset"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                        _ = tokio::time::sleep(sleep) => {}
                    }
                    total_waited += sleep;
                    self.manager.clear_expired_limits().await;
                }

                StickySelection::None => {
                    if self.config.fallback_enabled && !tried_fallback {
                        if let Some(fallback) = fallback_model(&model) {
                            tried_fallback = true;
                            info!(from = %model, to = %fallback, "No accounts for model, trying fallback");
                            model = fallback.to_string();
                            let mut fallback_request = request.clone();
                            fallback_request.model = model.clone();
                            google_request = convert_request(&fallback_request);
                            continue;
                        }
                    }
                    let all_rate_limited = self.manager.is_all_rate_limited(Some(&model)).await;
                    return Err(ProxyError::NoAccounts { all_rate_limited });
                }
            }
        }
    }

    /// One account, both endpoints.
    async fn try_account(
        &self,
        account: &Account,
        model: &str,
        google_request: &crate::models::google::GoogleRequest,
        streaming: bool,
        cancel: &CancellationToken,
        last_error: &mut Option<ProxyError>,
    ) -> Result<AttemptOutcome> {
        // Token and project. Credential failures advance the account.
        let token = match self.manager.get_token_for_account(account).await {
            Ok(token) => token,
            Err(error) => {
                return Ok(self.handle_auth_failure(account, error, last_error).await);
            }
        };
        let project = match self.manager.get_project_for_account(account).await {
            Ok(project) => project,
            Err(error) => {
                return Ok(self.handle_auth_failure(account, error, last_error).await);
            }
        };

        let path = api_path(model, streaming);
        let sse = path_is_sse(path);
        let wrapped = wrap_request(&project, model, google_request.clone());

        let mut non_retryable: Option<ProxyError> = None;

        for endpoint in self.http.endpoints() {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                r = self.http.post(&endpoint, path, &token, model, sse, &wrapped) => r,
            };

            let response = match result {
                Ok(response) => response,
                Err(error) => {
                    warn!(endpoint = %endpoint, error = %error, "Upstream request failed");
                    *last_error = Some(ProxyError::Network(error));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                if !sse {
                    debug!(endpoint = %endpoint, account = %account.email, "Upstream accepted request");
                    return Ok(AttemptOutcome::Success(UpstreamBody::Json(response)));
                }

                // Chunked SSE responses carry no Content-Length, so an
                // empty body is only observable from the stream itself.
                let peeked = tokio::select! {
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    r = peek_sse_body(response) => r,
                };
                match peeked {
                    Ok(Some(body)) => {
                        debug!(endpoint = %endpoint, account = %account.email, "Upstream accepted request");
                        return Ok(AttemptOutcome::Success(UpstreamBody::Sse(body)));
                    }
                    Ok(None) => {
                        // A streaming success with no body behaves like a 5xx.
                        warn!(endpoint = %endpoint, "Streaming response had empty body");
                        *last_error = Some(ProxyError::api(502, "empty streaming body"));
                        continue;
                    }
                    Err(error) => {
                        warn!(endpoint = %endpoint, error = %error, "Streaming body failed before first chunk");
                        *last_error = Some(ProxyError::Network(error));
                        continue;
                    }
                }
            }

            let status_code = status.as_u16();
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();

            if status_code == 401 || status_code == 403 || body.contains("invalid_grant") {
                let reason = if body.contains("invalid_grant") {
                    "invalid_grant".to_string()
                } else {
                    format!("HTTP {status_code}")
                };
                let error = ProxyError::AuthInvalid {
                    account_email: account.email.clone(),
                    reason,
                };
                return Ok(self.handle_auth_failure(account, error, last_error).await);
            }

            if status_code == 429 || is_rate_limit_body(&body) {
                let reset_ms = parse_reset_time(Some(&headers), Some(&body));
                info!(
                    account = %account.email,
                    model = %model,
                    reset_ms = ?reset_ms,
                    "Account rate limited"
                );
                self.manager
                    .mark_rate_limited(&account.email, model, reset_ms)
                    .await;
                *last_error = Some(ProxyError::RateLimited {
                    account_email: account.email.clone(),
                    reset_ms,
                });
                continue;
            }

            if status_code >= 500 {
                warn!(endpoint = %endpoint, status = status_code, "Upstream server error");
                *last_error = Some(ProxyError::api(status_code, body));
                continue;
            }

            // Other 4xx: not the account's fault; try the alternate
            // endpoint, then surface.
            non_retryable = Some(ProxyError::api(status_code, body));
        }

        if let Some(error) = non_retryable {
            return Ok(AttemptOutcome::Fail(error));
        }
        Ok(AttemptOutcome::AdvanceAccount)
    }

    /// Invalidate credential caches after an auth failure; permanent
    /// rejections also mark the account invalid.
    async fn handle_auth_failure(
        &self,
        account: &Account,
        error: ProxyError,
        last_error: &mut Option<ProxyError>,
    ) -> AttemptOutcome {
        warn!(account = %account.email, error = %error, "Auth failure, rotating account");
        self.manager.clear_token_cache(Some(&account.email)).await;
        self.manager.clear_project_cache(Some(&account.email)).await;

        if error.to_string().contains("invalid_grant") {
            self.manager
                .mark_invalid(&account.email, "invalid_grant")
                .await;
        }

        *last_error = Some(error);
        AttemptOutcome::AdvanceAccount
    }
}

/// Whether an error body carries a rate-limit signature.
fn is_rate_limit_body(body: &str) -> bool {
    RATE_LIMIT_SIGNATURES
        .iter()
        .any(|signature| body.contains(signature))
}

/// Take the first non-empty chunk off an SSE body.
///
/// Returns `Ok(None)` when the body ends without yielding a byte; a
/// consumed chunk is stitched back onto the front of the returned stream.
async fn peek_sse_body(
    response: reqwest::Response,
) -> std::result::Result<Option<ByteStream>, reqwest::Error> {
    let mut stream = response.bytes_stream();
    loop {
        match stream.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                let replayed =
                    futures::stream::iter([Ok::<Bytes, reqwest::Error>(chunk)]).chain(stream);
                return Ok(Some(Box::pin(replayed)));
            }
            Some(Err(error)) => return Err(error),
            None => return Ok(None),
        }
    }
}
