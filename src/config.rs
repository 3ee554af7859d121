use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::types::Region;

const DEFAULT_AUTH_URL: &str = "https://auth.riotgames.com/api/v1/authorization";
const DEFAULT_AUTHORIZE_URL: &str = "https://auth.riotgames.com/authorize";
const DEFAULT_ENTITLEMENTS_URL: &str = "https://entitlements.auth.riotgames.com/api/token/v1";
const DEFAULT_USERINFO_URL: &str = "https://auth.riotgames.com/userinfo";
const DEFAULT_CLIENT_VERSION_URL: &str = "https://valorant-api.com/v1/version";
const DEFAULT_REDIRECT_URI: &str = "https://playvalorant.com/opt_in";

/// Placeholder replaced by a region's shard code in the shard URL template.
pub const SHARD_PLACEHOLDER: &str = "{shard}";

/// Upstream endpoints and client behavior.
///
/// Every field has a working default. Override with `with_*` methods, or
/// load overrides from the environment with [`from_env()`](Config::from_env).
///
/// ```rust,ignore
/// use valstore_auth::Config;
///
/// let config = Config::new()
///     .with_default_region(Region::Eu)
///     .with_http_timeout(Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) auth_url: Url,
    pub(crate) authorize_url: Url,
    pub(crate) entitlements_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) shard_url_template: String,
    pub(crate) client_version_url: Url,
    pub(crate) fallback_client_version: String,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: Url,
    pub(crate) scope: String,
    pub(crate) default_region: Region,
    pub(crate) retry: RetryPolicy,
    pub(crate) http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auth_url: DEFAULT_AUTH_URL.parse().expect("valid default URL"),
            authorize_url: DEFAULT_AUTHORIZE_URL.parse().expect("valid default URL"),
            entitlements_url: DEFAULT_ENTITLEMENTS_URL.parse().expect("valid default URL"),
            userinfo_url: DEFAULT_USERINFO_URL.parse().expect("valid default URL"),
            shard_url_template: "https://pd.{shard}.a.pvp.net".into(),
            client_version_url: DEFAULT_CLIENT_VERSION_URL.parse().expect("valid default URL"),
            fallback_client_version: "release-10.07-shipping-6-3399868".into(),
            client_id: "play-valorant-web-prod".into(),
            redirect_uri: DEFAULT_REDIRECT_URI.parse().expect("valid default URL"),
            scope: "account openid".into(),
            default_region: Region::Ap,
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// All variables are optional; unset ones keep their defaults.
    ///
    /// # Env vars
    /// - `UPSTREAM_AUTH_URL`, `UPSTREAM_AUTHORIZE_URL`, `UPSTREAM_ENTITLEMENTS_URL`,
    ///   `UPSTREAM_USERINFO_URL`, `UPSTREAM_CLIENT_VERSION_URL`: endpoint overrides
    /// - `UPSTREAM_SHARD_URL_TEMPLATE`: shard base URL containing `{shard}`
    /// - `UPSTREAM_CLIENT_VERSION`: fallback client version
    /// - `DEFAULT_REGION`: one of `ap`, `na`, `eu`, `kr`, `latam`, `br`
    /// - `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`
    /// - `HTTP_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a set variable does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::new();

        if let Some(url) = env_url("UPSTREAM_AUTH_URL")? {
            config = config.with_auth_url(url);
        }
        if let Some(url) = env_url("UPSTREAM_AUTHORIZE_URL")? {
            config = config.with_authorize_url(url);
        }
        if let Some(url) = env_url("UPSTREAM_ENTITLEMENTS_URL")? {
            config = config.with_entitlements_url(url);
        }
        if let Some(url) = env_url("UPSTREAM_USERINFO_URL")? {
            config = config.with_userinfo_url(url);
        }
        if let Some(url) = env_url("UPSTREAM_CLIENT_VERSION_URL")? {
            config = config.with_client_version_url(url);
        }
        if let Ok(template) = std::env::var("UPSTREAM_SHARD_URL_TEMPLATE") {
            config = config.with_shard_url_template(template)?;
        }
        if let Ok(version) = std::env::var("UPSTREAM_CLIENT_VERSION") {
            config = config.with_fallback_client_version(version);
        }
        if let Ok(region) = std::env::var("DEFAULT_REGION") {
            let region = region
                .parse()
                .map_err(|e| Error::Configuration(format!("DEFAULT_REGION: {e}")))?;
            config = config.with_default_region(region);
        }

        let mut retry = config.retry.clone();
        if let Some(n) = env_number("RETRY_MAX_ATTEMPTS")? {
            retry = retry.with_max_attempts(u32::try_from(n).unwrap_or(u32::MAX));
        }
        if let Some(ms) = env_number("RETRY_BASE_DELAY_MS")? {
            retry = retry.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = env_number("RETRY_MAX_DELAY_MS")? {
            retry = retry.with_max_delay(Duration::from_millis(ms));
        }
        config = config.with_retry_policy(retry);

        if let Some(secs) = env_number("HTTP_TIMEOUT_SECS")? {
            config = config.with_http_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the credential authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the authorize-redirect endpoint used by cookie login.
    #[must_use]
    pub fn with_authorize_url(mut self, url: Url) -> Self {
        self.authorize_url = url;
        self
    }

    #[must_use]
    pub fn with_entitlements_url(mut self, url: Url) -> Self {
        self.entitlements_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_client_version_url(mut self, url: Url) -> Self {
        self.client_version_url = url;
        self
    }

    /// Override the shard base URL. Must contain `{shard}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the placeholder is missing or the
    /// template does not yield a valid URL.
    pub fn with_shard_url_template(mut self, template: impl Into<String>) -> Result<Self, Error> {
        let template = template.into();
        if !template.contains(SHARD_PLACEHOLDER) {
            return Err(Error::Configuration(format!(
                "shard URL template must contain {SHARD_PLACEHOLDER}: {template}"
            )));
        }
        self.shard_url_template = template;
        self.shard_url(Region::Ap.shard())?;
        Ok(self)
    }

    #[must_use]
    pub fn with_fallback_client_version(mut self, version: impl Into<String>) -> Self {
        self.fallback_client_version = version.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, uri: Url) -> Self {
        self.redirect_uri = uri;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Region used when none can be determined.
    #[must_use]
    pub fn with_default_region(mut self, region: Region) -> Self {
        self.default_region = region;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Per-request timeout of the shared HTTP client.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn default_region(&self) -> Region {
        self.default_region
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    #[must_use]
    pub fn client_version_url(&self) -> &Url {
        &self.client_version_url
    }

    #[must_use]
    pub fn fallback_client_version(&self) -> &str {
        &self.fallback_client_version
    }

    /// Base URL of a shard, e.g. `https://pd.eu.a.pvp.net/`, always ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the substituted template is not a URL.
    pub fn shard_url(&self, shard: &str) -> Result<Url, Error> {
        let raw = self.shard_url_template.replace(SHARD_PLACEHOLDER, shard);
        let mut url: Url = raw
            .parse()
            .map_err(|e| Error::Configuration(format!("shard URL {raw}: {e}")))?;
        // Endpoint paths are joined onto this base.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

fn env_url(name: &str) -> Result<Option<Url>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_number(name: &str) -> Result<Option<u64>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}
