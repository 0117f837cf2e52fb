// ABOUTME: Access-token storage and refresh-token renewal against the identity provider
// ABOUTME: Renews on demand and on a fixed schedule owned by a cancellable RenewalTask

use anyhow::{Context, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Prefix the chat transport expects in front of the bearer token
pub const TOKEN_SCHEME: &str = "oauth:";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-lived material for the refresh-token grant
#[derive(Clone)]
pub struct RefreshCredentials {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for RefreshCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCredentials")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Credentials shared by the renewal timer and the chat transport.
///
/// Only the access token is ever replaced; the swap happens under a write lock
/// so readers see either the old or the new token, never a mix.
pub struct Credentials {
    access_token: RwLock<String>,
    refresh: Option<RefreshCredentials>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl Credentials {
    /// Create credentials from a configured token, adding the scheme prefix if missing
    pub fn new(access_token: &str, refresh: Option<RefreshCredentials>) -> Self {
        Self {
            access_token: RwLock::new(with_scheme(access_token)),
            refresh,
        }
    }

    /// Current access token in "oauth:<token>" form
    pub fn access_token(&self) -> String {
        match self.access_token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn refresh(&self) -> Option<&RefreshCredentials> {
        self.refresh.as_ref()
    }

    /// Replace the access token with a freshly issued raw token
    pub fn replace_access_token(&self, raw_token: &str) {
        let token = with_scheme(raw_token);
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

fn with_scheme(token: &str) -> String {
    let token = token.trim();
    if token.starts_with(TOKEN_SCHEME) {
        token.to_string()
    } else {
        format!("{TOKEN_SCHEME}{token}")
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

// =============================================================================
// Renewal
// =============================================================================

/// Result of a single renewal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The provider issued a new access token and it is now in use
    Renewed,
    /// The provider answered without an access token
    Rejected { reason: String },
    /// The request could not be completed (network, status, body)
    Failed { error: String },
    /// No refresh material is configured
    Skipped,
}

/// Exchanges the refresh token for new access tokens
pub struct CredentialManager {
    credentials: Arc<Credentials>,
    http: reqwest::Client,
    token_url: String,
    interval: Duration,
    outcomes: broadcast::Sender<RenewalOutcome>,
}

impl CredentialManager {
    pub fn new(credentials: Arc<Credentials>, token_url: impl Into<String>, interval: Duration) -> Self {
        let (outcomes, _) = broadcast::channel(16);
        Self {
            credentials,
            http: http_client(HTTP_TIMEOUT),
            token_url: token_url.into(),
            interval,
            outcomes,
        }
    }

    /// Bound each token request by `timeout` instead of the 30s default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Subscribe to the outcome of every renewal attempt
    pub fn outcomes(&self) -> broadcast::Receiver<RenewalOutcome> {
        self.outcomes.subscribe()
    }

    /// Renew the access token once. Never fails: problems are logged and
    /// reported through the returned outcome, leaving the old token in place.
    pub async fn renew(&self) -> RenewalOutcome {
        let outcome = match self.credentials.refresh() {
            None => {
                tracing::debug!("No refresh credentials configured, skipping token renewal");
                RenewalOutcome::Skipped
            }
            Some(refresh) => match self.request_token(refresh).await {
                Ok(body) => match body.get("access_token").and_then(|v| v.as_str()) {
                    Some(token) if !token.trim().is_empty() => {
                        self.credentials.replace_access_token(token);
                        tracing::info!("Access token refreshed successfully");
                        RenewalOutcome::Renewed
                    }
                    _ => {
                        tracing::error!(response = %body, "Failed to refresh token: no access_token in response");
                        RenewalOutcome::Rejected {
                            reason: body.to_string(),
                        }
                    }
                },
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "Error refreshing token");
                    RenewalOutcome::Failed {
                        error: format!("{e:#}"),
                    }
                }
            },
        };

        let _ = self.outcomes.send(outcome.clone());
        outcome
    }

    async fn request_token(&self, refresh: &RefreshCredentials) -> Result<serde_json::Value> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.refresh_token.as_str()),
            ("client_id", refresh.client_id.as_str()),
            ("client_secret", refresh.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .context("Token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token endpoint returned {}: {}", status, body);
        }

        response
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse token response")
    }

    /// Renew immediately, then again every interval until the returned task
    /// is shut down or dropped.
    pub fn start_auto_renew(self: &Arc<Self>) -> RenewalTask {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            // First tick completes immediately
            let mut ticker = tokio::time::interval(manager.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        manager.renew().await;
                    }
                }
            }
            tracing::info!("Token renewal stopped");
        });

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Token auto-renewal started"
        );

        RenewalTask {
            cancel: cancel_tx,
            handle: Some(handle),
        }
    }
}

/// Handle to the recurring renewal task. Dropping it aborts the timer.
pub struct RenewalTask {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RenewalTask {
    /// Stop the timer and wait for an in-flight renewal to finish
    pub async fn shutdown(mut self) {
        let _ = self.cancel.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Token renewal task ended abnormally");
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

impl Drop for RenewalTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
