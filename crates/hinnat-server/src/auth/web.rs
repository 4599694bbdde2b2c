//! Remote login API authenticator.

use std::time::Duration;

use async_trait::async_trait;
use hinnat_vfs::Identity;
use hinnat_vfs::constants::USER_AGENT;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AuthError, Authenticator};

const LOGIN_ENDPOINT: &str = "/api/futur/login";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
}

/// Authenticates against `POST {base}/api/futur/login`.
///
/// On success the password becomes the session credential, which the remote
/// storage adapters send as their API key.
#[derive(Debug, Clone)]
pub struct WebAuthenticator {
    client: Client,
    login_url: String,
}

impl WebAuthenticator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            login_url: format!("{}{}", base_url.trim_end_matches('/'), LOGIN_ENDPOINT),
        })
    }
}

#[async_trait]
impl Authenticator for WebAuthenticator {
    fn name(&self) -> &'static str {
        "web_api"
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        tracing::info!(user = %username, url = %self.login_url, "authenticating against login API");

        let response = self
            .client
            .post(&self.login_url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .inspect_err(|e| tracing::error!(user = %username, "login API unreachable: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(user = %username, status = status.as_u16(), body = %body, "login rejected");
            return Err(AuthError::Rejected(format!("HTTP {}", status.as_u16())));
        }

        let login: LoginResponse = response.json().await?;
        if !login.success {
            let message = login.message.unwrap_or_default();
            tracing::warn!(user = %username, message = %message, "login rejected");
            return Err(AuthError::InvalidCredentials(username.to_string()));
        }

        let user_id = login.user_id.map(|v| v.to_string()).unwrap_or_default();
        tracing::info!(user = %username, user_id = %user_id, "login API authentication succeeded");
        Ok(Identity::new(username, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn authenticator(server: &MockServer) -> WebAuthenticator {
        WebAuthenticator::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_success_uses_password_as_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_ENDPOINT))
            .and(body_json(serde_json::json!({"username": "alice", "password": "key-123"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "user_id": "42"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let identity = authenticator(&server)
            .await
            .authenticate("alice", "key-123")
            .await
            .unwrap();
        assert_eq!(identity.username(), "alice");
        assert_eq!(identity.credential(), "key-123");
    }

    #[tokio::test]
    async fn test_unsuccessful_body_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": false, "message": "bad password"})),
            )
            .mount(&server)
            .await;

        let err = authenticator(&server)
            .await
            .authenticate("alice", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn test_http_error_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_ENDPOINT))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = authenticator(&server)
            .await
            .authenticate("alice", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let auth = WebAuthenticator::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            auth.authenticate("alice", "x").await,
            Err(AuthError::Http(_))
        ));
    }
}
