//! Typed calls against the identity provider and the game shards.
//!
//! Every call takes the tokens and cookies it needs as arguments; nothing
//! request-scoped is stored on [`UpstreamApi`], which is shared by all
//! concurrent logins.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{self, HeaderName};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::cookies;
use crate::error::Error;
use crate::retry::RetryingExecutor;
use crate::transport::{Transport, UpstreamRequest, UpstreamResponse};
use crate::types::{CookieMap, Region, TokenSet, UserId};
use crate::version;

const ACCEPT: &str = "application/json, text/plain, */*";
const RESPONSE_TYPE: &str = "token id_token";

const CLIENT_PLATFORM: HeaderName = HeaderName::from_static("x-riot-clientplatform");
const CLIENT_VERSION: HeaderName = HeaderName::from_static("x-riot-clientversion");
const ENTITLEMENTS_JWT: HeaderName = HeaderName::from_static("x-riot-entitlements-jwt");

/// Answer of the credential submission.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AuthorizationResponse {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub response: Option<AuthorizationPayload>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationPayload {
    pub parameters: AuthorizationParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationParameters {
    pub uri: String,
}

impl AuthorizationResponse {
    /// `true` when the provider accepted the credentials.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.kind == "response"
    }

    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.parameters.uri.as_str())
    }
}

/// Profile returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub acct: Option<Account>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

impl UserInfo {
    /// Display name and tag.
    ///
    /// The structured `acct` pair wins when both parts are present;
    /// otherwise the legacy top-level `name`/`tag` are used.
    #[must_use]
    pub fn display_identity(&self) -> (String, String) {
        if let Some(Account {
            game_name: Some(name),
            tag_line: Some(tag),
        }) = &self.acct
        {
            if !name.is_empty() && !tag.is_empty() {
                return (name.clone(), tag.clone());
            }
        }
        (
            self.name.clone().unwrap_or_default(),
            self.tag.clone().unwrap_or_default(),
        )
    }
}

#[derive(Deserialize)]
struct EntitlementResponse {
    #[serde(default)]
    entitlements_token: String,
}

/// How a userinfo request authenticates.
#[derive(Clone, Copy)]
pub enum UserinfoAuth<'a> {
    Bearer(&'a str),
    Cookies(&'a CookieMap),
}

/// Tokens carried in a redirect URI fragment.
#[derive(Debug, Clone)]
pub struct FragmentTokens {
    pub access_token: String,
    pub id_token: Option<String>,
}

/// Extract `access_token` (and `id_token`, if any) from a redirect URI fragment.
///
/// # Errors
///
/// Returns [`Error::TokenExtractionFailed`] if the URI is empty, does not
/// parse, has no fragment, or the fragment carries no access token.
pub fn parse_fragment_tokens(uri: &str) -> Result<FragmentTokens, Error> {
    if uri.is_empty() {
        return Err(Error::TokenExtractionFailed("empty redirect URI".into()));
    }
    let url = Url::parse(uri)
        .map_err(|e| Error::TokenExtractionFailed(format!("unparseable redirect URI: {e}")))?;
    let fragment = url
        .fragment()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| Error::TokenExtractionFailed("redirect URI has no fragment".into()))?;

    let mut access_token = None;
    let mut id_token = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
            "id_token" if !value.is_empty() => id_token = Some(value.into_owned()),
            _ => {}
        }
    }

    let access_token = access_token
        .ok_or_else(|| Error::TokenExtractionFailed("fragment has no access_token".into()))?;
    Ok(FragmentTokens {
        access_token,
        id_token,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientPlatform {
    platform_type: &'static str,
    #[serde(rename = "platformOS")]
    platform_os: &'static str,
    #[serde(rename = "platformOSVersion")]
    platform_os_version: &'static str,
    platform_chipset: &'static str,
}

fn client_platform_header() -> String {
    let platform = ClientPlatform {
        platform_type: "PC",
        platform_os: "Windows",
        platform_os_version: "10.0.19042.1.256.64bit",
        platform_chipset: "Unknown",
    };
    // Serializing a struct of static strings cannot fail.
    let json = serde_json::to_vec(&platform).unwrap_or_default();
    STANDARD.encode(json)
}

/// Upstream protocol client shared by every login.
pub struct UpstreamApi<T> {
    executor: RetryingExecutor<T>,
    config: Config,
    client_version: String,
    client_platform: String,
}

impl<T: Transport> UpstreamApi<T> {
    /// Create the client with the configured fallback client version.
    #[must_use]
    pub fn new(executor: RetryingExecutor<T>, config: Config) -> Self {
        let client_version = config.fallback_client_version.clone();
        Self {
            executor,
            config,
            client_version,
            client_platform: client_platform_header(),
        }
    }

    /// Replace the client version with the one currently published upstream.
    ///
    /// Keeps the fallback if discovery fails.
    pub async fn with_discovered_client_version(mut self) -> Self {
        self.client_version = version::discover_client_version(
            &self.executor,
            &self.config.client_version_url,
            &self.config.fallback_client_version,
        )
        .await;
        self
    }

    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn executor(&self) -> &RetryingExecutor<T> {
        &self.executor
    }

    #[must_use]
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    fn user_agent(&self) -> String {
        format!(
            "RiotClient/{} rso-auth (Windows;10;;Professional, x64)",
            self.client_version
        )
    }

    /// Request skeleton for identity-provider endpoints.
    fn auth_request(&self, method: Method, url: Url) -> Result<UpstreamRequest, Error> {
        Ok(UpstreamRequest::new(method, url)
            .header(header::USER_AGENT, &self.user_agent())?
            .header(header::ACCEPT, ACCEPT)?
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")?)
    }

    fn with_cookies(request: UpstreamRequest, cookies: &CookieMap) -> Result<UpstreamRequest, Error> {
        if cookies.is_empty() {
            return Ok(request);
        }
        Ok(request.sensitive_header(header::COOKIE, &cookies::cookie_header(cookies))?)
    }

    /// Open an anonymous authorization exchange.
    ///
    /// Cookies set by the provider are merged into `cookies`; they must be
    /// replayed on [`submit_credentials`](Self::submit_credentials).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`]/[`Error::Transport`] on network failure,
    /// or [`Error::UnexpectedStatus`] on a non-2xx answer.
    pub async fn init_authorization(&self, nonce: &str, cookies: &mut CookieMap) -> Result<(), Error> {
        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "nonce": nonce,
            "redirect_uri": self.config.redirect_uri.as_str(),
            "response_type": RESPONSE_TYPE,
            "scope": self.config.scope,
        });
        let request = self
            .auth_request(Method::POST, self.config.auth_url.clone())?
            .json(&body)?;
        let request = Self::with_cookies(request, cookies)?;

        let response = self.executor.execute(request).await?;
        let response = ensure_success(response, "authorization init")?;
        cookies::absorb_set_cookies(response.headers(), cookies);
        Ok(())
    }

    /// Submit a username/password pair to the open exchange.
    ///
    /// # Errors
    ///
    /// Returns transport errors, [`Error::UnexpectedStatus`] on a non-2xx
    /// answer, or [`Error::Decode`] if the body is not an authorization response.
    pub async fn submit_credentials(
        &self,
        cookies: &mut CookieMap,
        username: &str,
        password: &str,
    ) -> Result<AuthorizationResponse, Error> {
        let body = serde_json::json!({
            "type": "auth",
            "username": username,
            "password": password,
        });
        let request = self
            .auth_request(Method::PUT, self.config.auth_url.clone())?
            .json(&body)?;
        let request = Self::with_cookies(request, cookies)?;

        let response = self.executor.execute(request).await?;
        let response = ensure_success(response, "credential submission")?;
        cookies::absorb_set_cookies(response.headers(), cookies);
        response.json("credential submission")
    }

    /// Exchange an access token for an entitlement token.
    ///
    /// # Errors
    ///
    /// Returns transport errors, [`Error::UnexpectedStatus`], or
    /// [`Error::Decode`] if the answer carries no token.
    pub async fn fetch_entitlement(&self, access_token: &str) -> Result<String, Error> {
        let request = self
            .auth_request(Method::POST, self.config.entitlements_url.clone())?
            .bearer(access_token)?
            .json(&serde_json::json!({}))?;

        let response = self.executor.execute(request).await?;
        let response = ensure_success(response, "entitlement exchange")?;
        let parsed: EntitlementResponse = response.json("entitlement exchange")?;
        if parsed.entitlements_token.is_empty() {
            return Err(Error::Decode {
                operation: "entitlement exchange",
                detail: "empty entitlements_token".into(),
            });
        }
        Ok(parsed.entitlements_token)
    }

    /// Fetch the account profile.
    ///
    /// # Errors
    ///
    /// Returns transport errors, [`Error::UnexpectedStatus`] on a non-200
    /// answer, or [`Error::Decode`] if the profile has no `sub`.
    pub async fn fetch_userinfo(&self, auth: UserinfoAuth<'_>) -> Result<UserInfo, Error> {
        let request = self.auth_request(Method::GET, self.config.userinfo_url.clone())?;
        let request = match auth {
            UserinfoAuth::Bearer(token) => request.bearer(token)?,
            UserinfoAuth::Cookies(cookies) => Self::with_cookies(request, cookies)?,
        };

        let response = self.executor.execute(request).await?;
        if response.status() != StatusCode::OK {
            return Err(Error::UnexpectedStatus {
                operation: "userinfo",
                status: response.status().as_u16(),
            });
        }
        let info: UserInfo = response.json("userinfo")?;
        if info.sub.is_empty() {
            return Err(Error::Decode {
                operation: "userinfo",
                detail: "empty sub".into(),
            });
        }
        Ok(info)
    }

    /// URL of the browser authorize endpoint for this client.
    #[must_use]
    pub fn authorize_url(&self, nonce: &str) -> Url {
        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", RESPONSE_TYPE)
            .append_pair("scope", &self.config.scope)
            .append_pair("nonce", nonce);
        url
    }

    /// Replay the authorize redirect with `cookies` attached.
    ///
    /// Returns the `Location` of the 302/303 answer without following it.
    ///
    /// # Errors
    ///
    /// Returns transport errors, [`Error::UnexpectedStatus`] if the answer is
    /// not a 302/303, or [`Error::Decode`] if it has no `Location`.
    pub async fn authorize_redirect(&self, cookies: &CookieMap, nonce: &str) -> Result<String, Error> {
        let request = self.auth_request(Method::GET, self.authorize_url(nonce))?;
        let request = Self::with_cookies(request, cookies)?;

        let response = self.executor.execute(request).await?;
        if !matches!(response.status(), StatusCode::FOUND | StatusCode::SEE_OTHER) {
            return Err(Error::UnexpectedStatus {
                operation: "authorize redirect",
                status: response.status().as_u16(),
            });
        }
        response
            .location()
            .map(str::to_owned)
            .ok_or_else(|| Error::Decode {
                operation: "authorize redirect",
                detail: "missing Location header".into(),
            })
    }

    /// Look `user_id` up on `region`'s shard.
    ///
    /// Returns `Ok(true)` on a 2xx answer and `Ok(false)` on any other status.
    ///
    /// # Errors
    ///
    /// Returns transport errors once retries are exhausted.
    pub async fn probe_shard(
        &self,
        region: Region,
        user_id: &UserId,
        tokens: &TokenSet,
    ) -> Result<bool, Error> {
        let url = self
            .config
            .shard_url(region.shard())?
            .join("name-service/v2/players")
            .map_err(|e| Error::Configuration(format!("shard URL: {e}")))?;

        let request = UpstreamRequest::new(Method::PUT, url)
            .header(header::USER_AGENT, &self.user_agent())?
            .header(CLIENT_PLATFORM, &self.client_platform)?
            .header(CLIENT_VERSION, &self.client_version)?
            .sensitive_header(ENTITLEMENTS_JWT, &tokens.entitlement_token)?
            .bearer(&tokens.access_token)?
            .json(&[user_id.as_str()])?;

        let response = self.executor.execute(request).await?;
        Ok(response.status().is_success())
    }
}

fn ensure_success(response: UpstreamResponse, operation: &'static str) -> Result<UpstreamResponse, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(Error::UnexpectedStatus {
        operation,
        status: response.status().as_u16(),
    })
}
