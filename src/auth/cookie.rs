use crate::cookies::{self, SESSION_TOKEN_COOKIE};
use crate::error::Error;
use crate::nonce::generate_nonce;
use crate::transport::Transport;
use crate::types::{CookieCredential, CookieMap, Session, TokenSet, UserId};
use crate::upstream::{UserInfo, UserinfoAuth, parse_fragment_tokens};

use super::AuthClient;

/// Path segment of the provider's login page; a redirect there means the
/// cookies no longer hold a session.
const LOGIN_PATH: &str = "/login";

impl<T: Transport> AuthClient<T> {
    pub(super) async fn authenticate_cookie(
        &self,
        credential: &CookieCredential,
    ) -> Result<Session, Error> {
        let cookies = cookies::parse_cookie_text(&credential.raw_cookie_text);
        if !cookies::has_recognized(&cookies) {
            return Err(Error::NoCookiesProvided);
        }

        let (info, tokens) = match self.direct_profile_probe(&cookies).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Direct cookie probe failed, replaying authorize redirect");
                self.authorize_redirect_replay(&cookies).await.map_err(|e| match e {
                    Error::CookieAuthFailed(_) => e,
                    other => Error::CookieAuthFailed(other.to_string()),
                })?
            }
        };

        let region = credential
            .region_hint
            .unwrap_or_else(|| self.api.config().default_region());
        let (name, tag) = info.display_identity();
        let login_username = info.email.clone().unwrap_or_else(|| name.clone());

        Ok(Session::new(UserId(info.sub), tokens)
            .with_login_username(login_username)
            .with_display(name, tag)
            .with_region(region)
            .with_raw_cookies(cookies))
    }

    /// Userinfo accepts the cookies directly; the session cookie then
    /// stands in for the access token.
    async fn direct_profile_probe(&self, cookies: &CookieMap) -> Result<(UserInfo, TokenSet), Error> {
        let info = self.api.fetch_userinfo(UserinfoAuth::Cookies(cookies)).await?;
        let access_token = cookies
            .get(SESSION_TOKEN_COOKIE)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::CookieAuthFailed(format!("no {SESSION_TOKEN_COOKIE} cookie to use as access token")))?;
        let entitlement = self.api.fetch_entitlement(access_token).await?;
        Ok((info, TokenSet::new(access_token.as_str(), entitlement)))
    }

    /// Replay the authorize redirect with the cookies attached and take the
    /// access token from the `Location` fragment.
    async fn authorize_redirect_replay(&self, cookies: &CookieMap) -> Result<(UserInfo, TokenSet), Error> {
        let location = self.api.authorize_redirect(cookies, &generate_nonce()).await?;
        if location.contains(LOGIN_PATH) {
            return Err(Error::CookieAuthFailed(
                "authorize redirected to login, cookies expired".into(),
            ));
        }

        let fragment = parse_fragment_tokens(&location)?;
        let entitlement = self.api.fetch_entitlement(&fragment.access_token).await?;
        let info = self
            .api
            .fetch_userinfo(UserinfoAuth::Bearer(&fragment.access_token))
            .await?;
        let tokens = TokenSet::new(fragment.access_token, entitlement).with_id_token(fragment.id_token);
        Ok((info, tokens))
    }
}
