#![doc = include_str!("../README.md")]

pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
#[cfg(feature = "token")]
pub mod login;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod nonce;
pub mod region;
pub mod retry;
pub mod session;
#[cfg(feature = "token")]
pub mod token;
pub mod transport;
pub mod types;
pub mod upstream;
pub mod version;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use auth::AuthClient;
pub use config::Config;
pub use error::{AUTHENTICATION_FAILED, Error};
#[cfg(feature = "token")]
pub use login::LoginService;
pub use region::{PROBE_ORDER, RegionResolver};
pub use retry::{RetryPolicy, RetryingExecutor};
pub use session::{MemorySessionStore, SessionStore};
#[cfg(feature = "token")]
pub use token::{BearerClaims, TokenIssuer};
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportErrorKind, UpstreamRequest,
    UpstreamResponse,
};
pub use types::{
    CookieCredential, CookieMap, Credential, LoginOutcome, LoginUser, PasswordCredential, Region,
    Session, SupportedRegion, TokenSet, UserId,
};
pub use upstream::{UpstreamApi, UserInfo};
