use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use super::error::AuthError;
use crate::session::SessionStore;
use crate::token::{BearerClaims, TokenIssuer};
use crate::types::Session;

/// Caller authenticated by a bearer credential.
///
/// Returns `401 Unauthorized` if the header is missing or the credential
/// does not validate.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(user: BearerUser) -> impl IntoResponse {
///     format!("Hello, {} ({})", user.claims.display_name, user.claims.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BearerUser {
    pub claims: BearerClaims,
}

impl<S> FromRequestParts<S> for BearerUser
where
    Arc<TokenIssuer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::Unauthenticated)?;

        let issuer = Arc::<TokenIssuer>::from_ref(state);
        let claims = issuer.validate(bearer.token())?;
        Ok(Self { claims })
    }
}

/// Load the cached session of an authenticated caller.
///
/// # Errors
///
/// Returns [`AuthError::SessionExpired`] if the store no longer holds a
/// session for the user, or [`AuthError::Store`] if the lookup fails.
pub async fn resolve_session<S: SessionStore>(
    store: &S,
    user: &BearerUser,
) -> Result<Session, AuthError> {
    store
        .get(&user.claims.user_id)
        .await?
        .ok_or(AuthError::SessionExpired)
}
