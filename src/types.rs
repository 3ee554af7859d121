use std::collections::BTreeMap;
use std::fmt;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

/// Stable upstream account identifier (the userinfo `sub` claim).
///
/// Unique per upstream account and the sole key of the session cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Upstream regional shard holding a user's game data.
///
/// Closed set. `Na`, `Latam` and `Br` are served by the same shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Ap,
    Na,
    Eu,
    Kr,
    Latam,
    Br,
}

impl Region {
    /// All regions, in listing order.
    pub const ALL: [Region; 6] = [
        Region::Ap,
        Region::Na,
        Region::Eu,
        Region::Kr,
        Region::Latam,
        Region::Br,
    ];

    /// Lowercase region code as used by clients.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Ap => "ap",
            Self::Na => "na",
            Self::Eu => "eu",
            Self::Kr => "kr",
            Self::Latam => "latam",
            Self::Br => "br",
        }
    }

    /// Shard code substituted into upstream game-data URLs.
    #[must_use]
    pub fn shard(self) -> &'static str {
        match self {
            Self::Na | Self::Latam | Self::Br => "na",
            Self::Eu => "eu",
            Self::Ap => "ap",
            Self::Kr => "kr",
        }
    }

    /// Human-readable name for region listings.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ap => "Asia Pacific",
            Self::Na => "North America",
            Self::Eu => "Europe",
            Self::Kr => "Korea",
            Self::Latam => "Latin America",
            Self::Br => "Brazil",
        }
    }

    /// Lenient parse: anything unrecognized (including empty input) becomes `default`.
    #[must_use]
    pub fn normalize(input: &str, default: Region) -> Region {
        input.parse().unwrap_or(default)
    }

    /// Region listing for unauthenticated clients, `default` flagged.
    #[must_use]
    pub fn supported(default: Region) -> Vec<SupportedRegion> {
        Self::ALL
            .iter()
            .map(|&r| SupportedRegion {
                code: r.code(),
                name: r.name(),
                default: r == default,
            })
            .collect()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::InvalidRegion(trimmed.to_owned()))
    }
}

/// Entry of the public region listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedRegion {
    pub code: &'static str,
    pub name: &'static str,
    pub default: bool,
}

/// Upstream tokens obtained at login.
///
/// No expiry is tracked; the set is usable until an upstream call is rejected.
#[derive(Clone)]
#[non_exhaustive]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub entitlement_token: String,
    pub issued_at: OffsetDateTime,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>, entitlement_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
            entitlement_token: entitlement_token.into(),
            issued_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("entitlement_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Cookie name to value, ordered so the `Cookie` header is deterministic.
pub type CookieMap = BTreeMap<String, String>;

/// An authenticated upstream session.
///
/// Serializes only the profile part: upstream tokens and raw cookies never
/// leave the process.
#[derive(Clone, Serialize)]
#[non_exhaustive]
pub struct Session {
    pub user_id: UserId,
    pub login_username: String,
    pub display_name: String,
    pub display_tag: String,
    #[serde(skip)]
    pub tokens: TokenSet,
    pub region: Region,
    #[serde(skip)]
    pub raw_cookies: CookieMap,
}

impl Session {
    #[must_use]
    pub fn new(user_id: UserId, tokens: TokenSet) -> Self {
        Self {
            user_id,
            login_username: String::new(),
            display_name: String::new(),
            display_tag: String::new(),
            tokens,
            region: Region::default(),
            raw_cookies: CookieMap::new(),
        }
    }

    #[must_use]
    pub fn with_login_username(mut self, username: impl Into<String>) -> Self {
        self.login_username = username.into();
        self
    }

    #[must_use]
    pub fn with_display(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.display_name = name.into();
        self.display_tag = tag.into();
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn with_raw_cookies(mut self, cookies: CookieMap) -> Self {
        self.raw_cookies = cookies;
        self
    }

    /// `name#tag`, or just `name` when the account has no tag.
    #[must_use]
    pub fn formatted_name(&self) -> String {
        if self.display_tag.is_empty() {
            self.display_name.clone()
        } else {
            format!("{}#{}", self.display_name, self.display_tag)
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("login_username", &self.login_username)
            .field("display_name", &self.display_name)
            .field("display_tag", &self.display_tag)
            .field("tokens", &self.tokens)
            .field("region", &self.region)
            .field("raw_cookies", &self.raw_cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Username/password pair for the interactive login flow.
#[derive(Clone, Deserialize)]
pub struct PasswordCredential {
    pub username: String,
    pub password: String,
}

impl PasswordCredential {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Cookie blob copied from an established upstream browser session.
#[derive(Clone)]
pub struct CookieCredential {
    pub raw_cookie_text: String,
    pub region_hint: Option<Region>,
}

impl CookieCredential {
    #[must_use]
    pub fn new(raw_cookie_text: impl Into<String>) -> Self {
        Self {
            raw_cookie_text: raw_cookie_text.into(),
            region_hint: None,
        }
    }

    #[must_use]
    pub fn with_region_hint(mut self, region: Region) -> Self {
        self.region_hint = Some(region);
        self
    }
}

/// Login input, one variant per strategy.
#[derive(Clone)]
pub enum Credential {
    Password(PasswordCredential),
    Cookie(CookieCredential),
}

impl From<PasswordCredential> for Credential {
    fn from(c: PasswordCredential) -> Self {
        Self::Password(c)
    }
}

impl From<CookieCredential> for Credential {
    fn from(c: CookieCredential) -> Self {
        Self::Cookie(c)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(c) => f
                .debug_struct("Password")
                .field("username", &c.username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Cookie(c) => f
                .debug_struct("Cookie")
                .field("raw_cookie_text", &format_args!("<{} bytes>", c.raw_cookie_text.len()))
                .field("region_hint", &c.region_hint)
                .finish(),
        }
    }
}

/// Public identity part of a login response.
#[derive(Debug, Clone, Serialize)]
pub struct LoginUser {
    pub username: String,
    pub user_id: UserId,
}

/// Successful login: the bearer credential plus the user it was issued for.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: LoginUser,
}
