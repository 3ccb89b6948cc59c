use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::session::{AuthBackend, AuthError, AuthSession};

const SOURCE: &str = "infra::auth::hosted";

/// GoTrue-compatible password sign-in against a hosted auth service.
#[derive(Clone, Debug)]
pub struct HostedAuthBackend {
    client: Client,
    base: Url,
    api_key: String,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl HostedAuthBackend {
    pub fn new(base: &str, api_key: impl Into<String>) -> Result<Self, AuthError> {
        let base = Url::parse(base)
            .and_then(|url| url.join("/"))
            .map_err(AuthError::backend)?;
        let client = Client::builder()
            .user_agent(concat!("kubinet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AuthError::backend)?;
        Ok(Self {
            client,
            base,
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.base.join(path).map_err(AuthError::backend)
    }
}

#[async_trait]
impl AuthBackend for HostedAuthBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let mut url = self.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(AuthError::backend)?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            debug!(target = SOURCE, status = status.as_u16(), "password grant rejected");
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::backend(format!("status {status} body {text}")));
        }

        let token: TokenResponse = response.json().await.map_err(AuthError::backend)?;
        Ok(AuthSession {
            user_id: token.user.id,
            email: token.user.email.unwrap_or_else(|| email.to_string()),
            access_token: token.access_token,
        })
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("auth/v1/logout")?)
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(AuthError::backend)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::backend(format!("logout returned status {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_keeps_the_grant_type() {
        let backend = HostedAuthBackend::new("https://abc.supabase.co", "anon").expect("backend");
        let mut url = backend.url("auth/v1/token").expect("url");
        url.query_pairs_mut().append_pair("grant_type", "password");
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/auth/v1/token?grant_type=password"
        );
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = HostedAuthBackend::new("not a url", "anon").expect_err("invalid");
        assert!(matches!(err, AuthError::Backend { .. }));
    }

    #[test]
    fn token_payload_parses() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"jwt","token_type":"bearer","user":{"id":"u-1","email":"a@b.c"}}"#,
        )
        .expect("json");
        assert_eq!(token.user.id, "u-1");
        assert_eq!(token.access_token, "jwt");
    }
}
