//! Governed evidence page fetches.
//!
//! # Responsibilities
//! - Use `reqwest` as the transport for the page-fetch dependency
//! - Map non-2xx answers to `HttpError` and client failures to `Transport`
//! - Offer a degraded path that skips a page when admission is refused
//!
//! # Design Decisions
//! - URLs are validated before a bulkhead slot is taken
//! - The attempt future is dropped on timeout or cancellation, which aborts
//!   the in-flight request

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{GovernorError, GovernorResult, HttpError};
use crate::governor::{CallOptions, Dependency};

const USER_AGENT: &str = concat!("call-governor/", env!("CARGO_PKG_VERSION"));

/// Fetches page bodies through one governed dependency.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    dependency: Arc<Dependency>,
}

impl PageFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new(dependency: Arc<Dependency>) -> GovernorResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_client(client, dependency))
    }

    pub fn with_client(client: reqwest::Client, dependency: Arc<Dependency>) -> Self {
        Self { client, dependency }
    }

    pub fn dependency(&self) -> &Arc<Dependency> {
        &self.dependency
    }

    /// Fetch `url` and return its body.
    pub async fn fetch(&self, url: &str, options: CallOptions<'_>) -> GovernorResult<String> {
        let url = parse_url(url)?;

        self.dependency
            .call(options, |_signal| {
                let request = self.client.get(url.clone());
                async move {
                    let response = request.send().await.map_err(transport_error)?;
                    let status = response.status();
                    if !status.is_success() {
                        let reason = status.canonical_reason().unwrap_or("Unknown Status");
                        return Err(GovernorError::from(HttpError::new(status.as_u16(), reason)));
                    }
                    response.text().await.map_err(transport_error)
                }
            })
            .await
    }

    /// [`PageFetcher::fetch`] for pages the caller can do without.
    ///
    /// Admission rejections and a spent budget yield `Ok(None)`; transport
    /// failures and cancellation are still returned.
    pub async fn fetch_optional(
        &self,
        url: &str,
        options: CallOptions<'_>,
    ) -> GovernorResult<Option<String>> {
        match self.fetch(url, options).await {
            Ok(body) => Ok(Some(body)),
            Err(error) if error.is_admission_rejection() => {
                tracing::warn!(
                    url = %url,
                    dependency = %self.dependency.name(),
                    reason = error.kind(),
                    "Skipping optional page fetch"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

fn parse_url(raw: &str) -> GovernorResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| GovernorError::Transport(format!("invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(GovernorError::Transport(format!(
            "unsupported URL scheme '{scheme}' in '{raw}'"
        ))),
    }
}

fn transport_error(error: reqwest::Error) -> GovernorError {
    GovernorError::Transport(error.to_string())
}
