//! Request helpers shared by the HTTP connectors.

use std::time::Duration;

use devassist_core::{CollectError, InitError};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Per-request bound; the aggregator's round timeout still applies on top.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub fn client() -> Result<reqwest::Client, InitError> {
    reqwest::Client::builder()
        .user_agent(concat!("devassist/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| InitError::Client(e.to_string()))
}

/// Send `request` and decode a JSON success body.
pub async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CollectError> {
    let response = request
        .send()
        .await
        .map_err(|e| CollectError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let reason = format!("HTTP {}: {}", status.as_u16(), body.trim());
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollectError::Unauthorized(reason),
            _ => CollectError::Remote(reason),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| CollectError::Protocol(e.to_string()))
}

/// Unwrap one fragment of a collection, logging and substituting an empty
/// list on failure.
pub fn fragment<T>(
    connector: &str,
    what: &str,
    outcome: Result<Vec<T>, CollectError>,
) -> Vec<T> {
    outcome.unwrap_or_else(|e| {
        warn!(connector, fragment = what, error = %e, "fragment unavailable");
        Vec::new()
    })
}

/// Outcome ledger for the top-level fragments of one `collect` call.
///
/// A failing fragment degrades to an empty list. The call as a whole
/// fails when any fragment hit a service-wide error (unreachable host,
/// timeout, rejected credentials) or when every fragment failed.
pub struct Fragments {
    connector: &'static str,
    attempted: usize,
    failed: usize,
    service_wide: Option<CollectError>,
    last: Option<CollectError>,
}

impl Fragments {
    pub fn new(connector: &'static str) -> Self {
        Self {
            connector,
            attempted: 0,
            failed: 0,
            service_wide: None,
            last: None,
        }
    }

    /// Record `outcome` and return its items, or an empty list on failure.
    pub fn take<T>(&mut self, what: &str, outcome: Result<Vec<T>, CollectError>) -> Vec<T> {
        self.attempted += 1;
        match outcome {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    connector = self.connector,
                    fragment = what,
                    error = %e,
                    "fragment unavailable"
                );
                self.failed += 1;
                if self.service_wide.is_none() && e.is_service_wide() {
                    self.service_wide = Some(e.clone());
                }
                self.last = Some(e);
                Vec::new()
            }
        }
    }

    /// `Err` when the collection as a whole should count as failed.
    pub fn finish(self) -> Result<(), CollectError> {
        if let Some(e) = self.service_wide {
            return Err(e);
        }
        match self.last {
            Some(e) if self.failed == self.attempted => Err(e),
            _ => Ok(()),
        }
    }
}


/// Normalize a configured base URL.
pub fn base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
