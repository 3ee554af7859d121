//! Discovery of the game client version the upstream expects.

use reqwest::Method;
use reqwest::header;
use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::retry::RetryingExecutor;
use crate::transport::{Transport, UpstreamRequest};

const USER_AGENT: &str = "val-store-backend";

#[derive(Deserialize)]
struct VersionEnvelope {
    data: VersionData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionData {
    #[serde(default)]
    riot_client_version: String,
}

/// Fetch the current client version from the public version endpoint.
///
/// # Errors
///
/// Returns transport errors, [`Error::UnexpectedStatus`] on a non-2xx
/// answer, or [`Error::Decode`] if no version is published.
pub async fn fetch_client_version<T: Transport>(
    executor: &RetryingExecutor<T>,
    url: &Url,
) -> Result<String, Error> {
    let request = UpstreamRequest::new(Method::GET, url.clone())
        .header(header::USER_AGENT, USER_AGENT)?
        .header(header::ACCEPT, "application/json")?;

    let response = executor.execute(request).await?;
    if !response.status().is_success() {
        return Err(Error::UnexpectedStatus {
            operation: "client version",
            status: response.status().as_u16(),
        });
    }
    let envelope: VersionEnvelope = response.json("client version")?;
    let version = envelope.data.riot_client_version.trim().to_owned();
    if version.is_empty() {
        return Err(Error::Decode {
            operation: "client version",
            detail: "empty riotClientVersion".into(),
        });
    }
    Ok(version)
}

/// [`fetch_client_version`], falling back to `fallback` on any failure.
pub async fn discover_client_version<T: Transport>(
    executor: &RetryingExecutor<T>,
    url: &Url,
    fallback: &str,
) -> String {
    match fetch_client_version(executor, url).await {
        Ok(version) => {
            tracing::info!(version = %version, "Discovered upstream client version");
            version
        }
        Err(e) => {
            tracing::warn!(error = %e, fallback, "Client version discovery failed, using fallback");
            fallback.to_owned()
        }
    }
}
