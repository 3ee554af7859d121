//! Upstream login.
//!
//! [`AuthClient::authenticate`] dispatches on the [`Credential`] variant to
//! the password or the cookie strategy. Both compose calls on the shared
//! [`UpstreamApi`] and return a fully populated [`Session`]; the client
//! keeps no per-login state.

mod cookie;
mod password;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Error;
use crate::region::RegionResolver;
use crate::retry::RetryingExecutor;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Credential, Session};
use crate::upstream::UpstreamApi;

/// Multi-strategy login client.
///
/// Cheap to clone; clones share the connection pool.
pub struct AuthClient<T> {
    api: Arc<UpstreamApi<T>>,
    resolver: RegionResolver<T>,
}

impl<T> Clone for AuthClient<T> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            resolver: self.resolver.clone(),
        }
    }
}

impl AuthClient<ReqwestTransport> {
    /// Build the production client and discover the current client version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    /// Version discovery failures are logged and never fail construction.
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(config.http_timeout())?;
        let executor = RetryingExecutor::new(transport, config.retry_policy().clone());
        let api = UpstreamApi::new(executor, config)
            .with_discovered_client_version()
            .await;
        Ok(Self::new(api))
    }
}

impl<T: Transport> AuthClient<T> {
    #[must_use]
    pub fn new(api: UpstreamApi<T>) -> Self {
        let api = Arc::new(api);
        Self {
            resolver: RegionResolver::new(Arc::clone(&api)),
            api,
        }
    }

    #[must_use]
    pub fn api(&self) -> &UpstreamApi<T> {
        &self.api
    }

    #[must_use]
    pub fn region_resolver(&self) -> &RegionResolver<T> {
        &self.resolver
    }

    /// Log in with `credential`.
    ///
    /// Dropping the returned future abandons the login at its next await
    /// point, backoff sleeps included.
    ///
    /// # Errors
    ///
    /// Password logins fail with [`Error::InitFailed`],
    /// [`Error::InvalidCredentials`], [`Error::TokenExtractionFailed`] or an
    /// upstream error from a later step. Cookie logins fail with
    /// [`Error::NoCookiesProvided`] or [`Error::CookieAuthFailed`]. A region
    /// that cannot be determined is never an error.
    pub async fn authenticate(&self, credential: &Credential) -> Result<Session, Error> {
        let (strategy, result) = match credential {
            Credential::Password(c) => ("password", self.authenticate_password(c).await),
            Credential::Cookie(c) => ("cookie", self.authenticate_cookie(c).await),
        };

        match &result {
            Ok(session) => tracing::info!(
                strategy,
                user_id = %session.user_id,
                region = %session.region,
                "Login succeeded"
            ),
            Err(e) => tracing::warn!(strategy, error = %e, "Login failed"),
        }
        result
    }

    /// [`authenticate`](Self::authenticate) bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the whole login does not finish in time,
    /// otherwise whatever `authenticate` returns.
    pub async fn authenticate_within(
        &self,
        credential: &Credential,
        deadline: Duration,
    ) -> Result<Session, Error> {
        tokio::time::timeout(deadline, self.authenticate(credential))
            .await
            .map_err(|_| Error::Timeout)?
    }
}
