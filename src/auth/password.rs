use crate::error::Error;
use crate::nonce::generate_nonce;
use crate::transport::Transport;
use crate::types::{CookieMap, PasswordCredential, Session, TokenSet, UserId};
use crate::upstream::{UserinfoAuth, parse_fragment_tokens};

use super::AuthClient;

impl<T: Transport> AuthClient<T> {
    pub(super) async fn authenticate_password(
        &self,
        credential: &PasswordCredential,
    ) -> Result<Session, Error> {
        let nonce = generate_nonce();
        let mut cookies = CookieMap::new();

        self.api
            .init_authorization(&nonce, &mut cookies)
            .await
            .map_err(|e| Error::InitFailed(Box::new(e)))?;

        let answer = self
            .api
            .submit_credentials(&mut cookies, &credential.username, &credential.password)
            .await?;
        if !answer.is_accepted() {
            tracing::debug!(
                kind = %answer.kind,
                error = answer.error.as_deref().unwrap_or_default(),
                "Credentials rejected"
            );
            return Err(Error::InvalidCredentials);
        }

        let uri = answer
            .redirect_uri()
            .ok_or_else(|| Error::TokenExtractionFailed("accepted answer has no redirect URI".into()))?;
        let fragment = parse_fragment_tokens(uri)?;

        let entitlement = self.api.fetch_entitlement(&fragment.access_token).await?;
        let info = self
            .api
            .fetch_userinfo(UserinfoAuth::Bearer(&fragment.access_token))
            .await?;

        let tokens = TokenSet::new(fragment.access_token, entitlement).with_id_token(fragment.id_token);
        let user_id = UserId(info.sub.clone());
        let region = self.resolver.resolve_or_default(&user_id, &tokens).await;
        let (name, tag) = info.display_identity();

        Ok(Session::new(user_id, tokens)
            .with_login_username(credential.username.as_str())
            .with_display(name, tag)
            .with_region(region)
            .with_raw_cookies(cookies))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::COOKIE;
    use reqwest::{Method, StatusCode};

    use super::super::fixtures::*;
    use crate::test_support::StubTransport;
    use crate::transport::UpstreamResponse;
    use crate::types::{Credential, Region};

    use super::*;

    fn login(password: &str) -> Credential {
        PasswordCredential::new("player", password).into()
    }

    #[tokio::test]
    async fn test_full_password_login() {
        let client = client(StubTransport::new(provider));

        let session = client.authenticate(&login(PASSWORD)).await.unwrap();

        assert_eq!(session.user_id.as_str(), "puuid-1");
        assert_eq!(session.login_username, "player");
        assert_eq!(session.formatted_name(), "Player#EUW");
        assert_eq!(session.tokens.access_token, ACCESS_TOKEN);
        assert_eq!(session.tokens.entitlement_token, ENTITLEMENT);
        assert_eq!(session.tokens.id_token.as_deref(), Some("idt"));
        assert_eq!(session.region, Region::Eu);
        assert_eq!(session.raw_cookies.get("asid").unwrap(), "init-cookie");
    }

    #[tokio::test]
    async fn test_init_cookies_replayed_on_submission() {
        let client = client(StubTransport::new(provider));
        client.authenticate(&login(PASSWORD)).await.unwrap();

        let calls = client.api().executor().transport().calls();
        assert_eq!(calls[0].method(), Method::POST);
        assert!(calls[0].headers().get(COOKIE).is_none());
        assert_eq!(calls[1].method(), Method::PUT);
        assert_eq!(calls[1].headers().get(COOKIE).unwrap(), "asid=init-cookie");

        let init: serde_json::Value = serde_json::from_slice(calls[0].body().unwrap()).unwrap();
        assert_eq!(init["response_type"], "token id_token");
        assert_eq!(init["nonce"].as_str().unwrap().len(), 22);
    }

    #[tokio::test]
    async fn test_rejected_password_is_not_retried() {
        let client = client(StubTransport::new(provider));

        let err = client.authenticate(&login("wrong")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidCredentials));
        assert_eq!(client.api().executor().transport().call_count(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_is_terminal() {
        let client = client(StubTransport::scripted(vec![Ok(UpstreamResponse::new(
            StatusCode::FORBIDDEN,
            "",
        ))]));

        let err = client.authenticate(&login(PASSWORD)).await.unwrap_err();

        match err {
            Error::InitFailed(cause) => {
                assert!(matches!(*cause, Error::UnexpectedStatus { status: 403, .. }));
            }
            other => panic!("expected InitFailed, got {other:?}"),
        }
        assert_eq!(client.api().executor().transport().call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_fragment_token() {
        let client = client(StubTransport::new(|req, n| {
            if req.method() == Method::PUT {
                return Ok(crate::test_support::json_response(
                    StatusCode::OK,
                    serde_json::json!({
                        "type": "response",
                        "response": { "parameters": { "uri": "https://playvalorant.com/opt_in#error=denied" } }
                    }),
                ));
            }
            provider(req, n)
        }));

        let err = client.authenticate(&login(PASSWORD)).await.unwrap_err();
        assert!(matches!(err, Error::TokenExtractionFailed(_)));
    }

    #[tokio::test]
    async fn test_undetermined_region_falls_back() {
        let client = client(StubTransport::new(|req, n| {
            if req.url().host_str().is_some_and(|h| h.starts_with("pd.")) {
                return Ok(UpstreamResponse::new(StatusCode::NOT_FOUND, ""));
            }
            provider(req, n)
        }));

        let session = client.authenticate(&login(PASSWORD)).await.unwrap();
        assert_eq!(session.region, Region::Ap);
    }
}
