use std::fmt;

use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::version4::{LocalToken, V4};
use pasetors::{Local, local};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::types::{Session, UserId};

const TOKEN_PREFIX: &str = "v4.local.";
const MIN_SECRET_LEN: usize = 32;
const DEFAULT_TTL: Duration = Duration::hours(24);

/// Claims carried by a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerClaims {
    pub user_id: UserId,
    /// `name#tag`, or just `name` when the account has no tag.
    pub display_name: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Mints and checks the service's own bearer credentials.
///
/// Tokens are PASETO `v4.local`, encrypted and authenticated with a key
/// derived (SHA-256) from one shared secret. They are unrelated to the
/// upstream tokens held in the session.
pub struct TokenIssuer {
    key: SymmetricKey<V4>,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer from the shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `secret` is shorter than 32 bytes.
    pub fn new(secret: &str) -> Result<Self, Error> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Configuration(format!(
                "token secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        let digest = Sha256::digest(secret.as_bytes());
        let key = SymmetricKey::<V4>::from(digest.as_slice())
            .map_err(|e| Error::Configuration(format!("token key: {e}")))?;
        Ok(Self {
            key,
            ttl: DEFAULT_TTL,
        })
    }

    /// Create an issuer from environment variables.
    ///
    /// # Env vars
    /// - `AUTH_TOKEN_SECRET` (required): at least 32 bytes
    /// - `AUTH_TOKEN_TTL_HOURS` (optional, default 24)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the secret is missing or too
    /// short, or the TTL does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let secret = std::env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| Error::Configuration("AUTH_TOKEN_SECRET is required".into()))?;
        let mut issuer = Self::new(&secret)?;

        if let Ok(hours) = std::env::var("AUTH_TOKEN_TTL_HOURS") {
            let hours: i64 = hours
                .trim()
                .parse()
                .map_err(|e| Error::Configuration(format!("AUTH_TOKEN_TTL_HOURS: {e}")))?;
            issuer = issuer.with_ttl(Duration::hours(hours.clamp(1, 24 * 365)));
        }
        Ok(issuer)
    }

    /// Override the validity window (default 24 hours).
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a credential for `session`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenInvalid`] if the claims cannot be encoded.
    pub fn issue(&self, session: &Session) -> Result<String, Error> {
        self.issue_at(session, OffsetDateTime::now_utc())
    }

    /// Issue a credential as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenInvalid`] if the claims cannot be encoded.
    pub fn issue_at(&self, session: &Session, now: OffsetDateTime) -> Result<String, Error> {
        let issued_at = now.replace_nanosecond(0).unwrap_or(now);
        let expires_at = issued_at + self.ttl;

        let mut claims = Claims::new().map_err(token_invalid)?;
        claims.subject(session.user_id.as_str()).map_err(token_invalid)?;
        claims
            .add_additional("name", session.formatted_name())
            .map_err(token_invalid)?;
        claims.issued_at(&rfc3339(issued_at)?).map_err(token_invalid)?;
        claims.not_before(&rfc3339(issued_at)?).map_err(token_invalid)?;
        claims.expiration(&rfc3339(expires_at)?).map_err(token_invalid)?;

        local::encrypt(&self.key, &claims, None, None).map_err(token_invalid)
    }

    /// Check `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenExpired`] for an authentic token past its
    /// expiry, and [`Error::TokenInvalid`] for anything else that is wrong:
    /// another token type, a foreign key, tampering, or missing claims.
    pub fn validate(&self, token: &str) -> Result<BearerClaims, Error> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// Check `token` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<BearerClaims, Error> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(Error::TokenInvalid("unsupported token format".into()));
        }

        let untrusted = UntrustedToken::<Local, V4>::try_from(token).map_err(token_invalid)?;

        // Authenticate only; time-based claims are checked against `now` below.
        let trusted = LocalToken::decrypt(&self.key, &untrusted, None, None)
            .map_err(|_| Error::TokenInvalid("token authentication failed".into()))?;
        let claims = Claims::from_string(trusted.payload()).map_err(token_invalid)?;

        let user_id = string_claim(&claims, "sub")?;
        let display_name = string_claim(&claims, "name")?;
        let issued_at = time_claim(&claims, "iat")?;
        let not_before = time_claim(&claims, "nbf")?;
        let expires_at = time_claim(&claims, "exp")?;

        if not_before > now {
            return Err(Error::TokenInvalid("token not yet valid".into()));
        }
        if expires_at <= now {
            return Err(Error::TokenExpired);
        }

        Ok(BearerClaims {
            user_id: UserId(user_id),
            display_name,
            issued_at,
            expires_at,
        })
    }
}

fn token_invalid(e: pasetors::errors::Error) -> Error {
    Error::TokenInvalid(e.to_string())
}

fn rfc3339(t: OffsetDateTime) -> Result<String, Error> {
    t.format(&Rfc3339)
        .map_err(|e| Error::TokenInvalid(format!("timestamp: {e}")))
}

fn string_claim(claims: &Claims, name: &str) -> Result<String, Error> {
    claims
        .get_claim(name)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::TokenInvalid(format!("missing claim: {name}")))
}

fn time_claim(claims: &Claims, name: &str) -> Result<OffsetDateTime, Error> {
    let raw = string_claim(claims, name)?;
    OffsetDateTime::parse(&raw, &Rfc3339)
        .map_err(|e| Error::TokenInvalid(format!("claim {name}: {e}")))
}
