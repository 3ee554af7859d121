//! Discovery of the shard that holds a user's game data.

use std::sync::Arc;

use crate::error::Error;
use crate::transport::Transport;
use crate::types::{Region, TokenSet, UserId};
use crate::upstream::UpstreamApi;

/// Candidates in probe order, most likely first.
pub const PROBE_ORDER: [Region; 6] = [
    Region::Na,
    Region::Eu,
    Region::Ap,
    Region::Kr,
    Region::Latam,
    Region::Br,
];

/// Probes shards one at a time until one recognizes the user.
pub struct RegionResolver<T> {
    api: Arc<UpstreamApi<T>>,
}

impl<T> Clone for RegionResolver<T> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
        }
    }
}

impl<T: Transport> RegionResolver<T> {
    #[must_use]
    pub fn new(api: Arc<UpstreamApi<T>>) -> Self {
        Self { api }
    }

    /// Return the first region in [`PROBE_ORDER`] whose shard answers
    /// the profile lookup with success.
    ///
    /// A probe that fails, at HTTP or transport level, moves on to the
    /// next candidate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegionUndetermined`] carrying the configured default
    /// region when no candidate succeeds.
    pub async fn resolve(&self, user_id: &UserId, tokens: &TokenSet) -> Result<Region, Error> {
        for region in PROBE_ORDER {
            match self.api.probe_shard(region, user_id, tokens).await {
                Ok(true) => {
                    tracing::info!(user_id = %user_id, region = %region, "Region resolved");
                    return Ok(region);
                }
                Ok(false) => {
                    tracing::debug!(user_id = %user_id, region = %region, "Region probe rejected");
                }
                Err(e) => {
                    tracing::debug!(user_id = %user_id, region = %region, error = %e, "Region probe failed");
                }
            }
        }
        Err(Error::RegionUndetermined {
            fallback: self.api.config().default_region(),
        })
    }

    /// [`resolve`](Self::resolve), degrading to the default region.
    pub async fn resolve_or_default(&self, user_id: &UserId, tokens: &TokenSet) -> Region {
        match self.resolve(user_id, tokens).await {
            Ok(region) => region,
            Err(Error::RegionUndetermined { fallback }) => {
                tracing::warn!(user_id = %user_id, fallback = %fallback, "Region undetermined, using default");
                fallback
            }
            Err(e) => {
                let fallback = self.api.config().default_region();
                tracing::warn!(user_id = %user_id, error = %e, fallback = %fallback, "Region resolution failed, using default");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;
    use crate::config::Config;
    use crate::retry::{RetryPolicy, RetryingExecutor};
    use crate::test_support::StubTransport;
    use crate::transport::UpstreamResponse;

    fn resolver(stub: StubTransport) -> RegionResolver<StubTransport> {
        let config = Config::new()
            .with_shard_url_template("https://{shard}.shard.test")
            .unwrap();
        let executor = RetryingExecutor::new(stub, RetryPolicy::default().with_max_attempts(1));
        RegionResolver::new(Arc::new(UpstreamApi::new(executor, config)))
    }

    fn tokens() -> TokenSet {
        TokenSet::new("access", "entitlement")
    }

    #[tokio::test]
    async fn test_stops_at_first_success_in_order() {
        let resolver = resolver(StubTransport::new(|req, _| {
            let status = if req.url().host_str() == Some("eu.shard.test") {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            Ok(UpstreamResponse::new(status, "[]"))
        }));

        let region = resolver.resolve(&"puuid-1".into(), &tokens()).await.unwrap();

        assert_eq!(region, Region::Eu);
        let calls = resolver.api.executor().transport().calls();
        let hosts: Vec<_> = calls.iter().map(|c| c.url().host_str().unwrap().to_owned()).collect();
        assert_eq!(hosts, ["na.shard.test", "eu.shard.test"]);
    }

    #[tokio::test]
    async fn test_probe_carries_tokens_and_user() {
        let resolver = resolver(StubTransport::scripted(vec![Ok(UpstreamResponse::new(
            StatusCode::OK,
            "[]",
        ))]));

        resolver.resolve(&"puuid-1".into(), &tokens()).await.unwrap();

        let call = &resolver.api.executor().transport().calls()[0];
        assert_eq!(call.method(), reqwest::Method::PUT);
        assert_eq!(call.url().path(), "/name-service/v2/players");
        assert_eq!(call.body(), Some(&b"[\"puuid-1\"]"[..]));
        assert_eq!(call.headers().get("authorization").unwrap(), "Bearer access");
        assert_eq!(call.headers().get("x-riot-entitlements-jwt").unwrap(), "entitlement");
        assert!(call.headers().contains_key("x-riot-clientversion"));
        assert!(call.headers().contains_key("x-riot-clientplatform"));
    }

    #[tokio::test]
    async fn test_all_fail_is_undetermined() {
        let resolver = resolver(StubTransport::new(|_, _| {
            Ok(UpstreamResponse::new(StatusCode::FORBIDDEN, ""))
        }));

        let err = resolver.resolve(&"puuid-1".into(), &tokens()).await.unwrap_err();

        assert!(matches!(err, Error::RegionUndetermined { fallback: Region::Ap }));
        assert_eq!(resolver.api.executor().transport().call_count(), PROBE_ORDER.len());
        assert_eq!(
            resolver.resolve_or_default(&"puuid-1".into(), &tokens()).await,
            Region::Ap
        );
    }
}
