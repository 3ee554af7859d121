//! Bearer credential authentication for Axum.
//!
//! Handlers take [`BearerUser`] to require a valid `Authorization: Bearer`
//! credential. The router state only has to provide an
//! `Arc<TokenIssuer>` through [`FromRef`](axum::extract::FromRef).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use valstore_auth::middleware::{BearerUser, resolve_session};
//!
//! async fn store_front(user: BearerUser, State(app): State<AppState>) -> Result<Json<Offers>, AuthError> {
//!     let session = resolve_session(app.sessions.as_ref(), &user).await?;
//!     Ok(Json(app.shop.offers(&session).await?))
//! }
//!
//! let app = axum::Router::new()
//!     .route("/store", get(store_front))
//!     .with_state(app_state);
//! ```

mod error;
mod extractor;

pub use error::AuthError;
pub use extractor::{BearerUser, resolve_session};
