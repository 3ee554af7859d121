//! Login orchestration: authenticate, cache the session, issue a credential.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthClient;
use crate::error::Error;
use crate::session::SessionStore;
use crate::token::TokenIssuer;
use crate::transport::Transport;
use crate::types::{Credential, LoginOutcome, LoginUser};

/// Everything a login endpoint needs, wired together.
///
/// # Example
///
/// ```rust,ignore
/// let service = LoginService::new(
///     AuthClient::connect(Config::from_env()?).await?,
///     Arc::new(MemorySessionStore::new()),
///     Arc::new(TokenIssuer::from_env()?),
/// );
///
/// match service.login(&credential).await {
///     Ok(outcome) => Json(outcome).into_response(),
///     Err(e) => (StatusCode::UNAUTHORIZED, e.public_message()).into_response(),
/// }
/// ```
pub struct LoginService<T, S> {
    auth: AuthClient<T>,
    store: Arc<S>,
    issuer: Arc<TokenIssuer>,
    deadline: Option<Duration>,
}

impl<T: Transport, S: SessionStore> LoginService<T, S> {
    #[must_use]
    pub fn new(auth: AuthClient<T>, store: Arc<S>, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            auth,
            store,
            issuer,
            deadline: None,
        }
    }

    /// Bound every login by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn auth(&self) -> &AuthClient<T> {
        &self.auth
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Authenticate upstream, cache the session and issue a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns the authentication error unchanged, or a store or token error.
    /// Nothing is cached when authentication fails.
    pub async fn login(&self, credential: &Credential) -> Result<LoginOutcome, Error> {
        let session = match self.deadline {
            Some(deadline) => self.auth.authenticate_within(credential, deadline).await?,
            None => self.auth.authenticate(credential).await?,
        };

        let token = self.issuer.issue(&session)?;
        let user = LoginUser {
            username: session.formatted_name(),
            user_id: session.user_id.clone(),
        };
        self.store.put(session).await?;

        Ok(LoginOutcome { token, user })
    }
}
