//! Discord OAuth2 client

use super::{build_http_client, ensure_success, TokenProvider};
use crate::config::DiscordConfig;
use crate::error::{UpstreamError, UpstreamResult};
use async_trait::async_trait;
use guildlink_types::{DiscordUser, RefreshOutcome, TokenGrant};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// OAuth2 error code Discord returns once a grant has been revoked
pub const REVOKED_GRANT_ERROR: &str = "invalid_grant";

/// Token endpoint response, success and error shapes merged
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Client for the Discord OAuth2 endpoints
pub struct DiscordOAuthClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_url: String,
    token_url: String,
    api_base_url: String,
    scopes: Vec<String>,
}

impl DiscordOAuthClient {
    pub fn new(config: &DiscordConfig) -> UpstreamResult<Self> {
        Url::parse(&config.auth_url)
            .map_err(|e| UpstreamError::InvalidConfig(format!("discord.auth_url: {}", e)))?;
        Url::parse(&config.token_url)
            .map_err(|e| UpstreamError::InvalidConfig(format!("discord.token_url: {}", e)))?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            scopes: config.auth_scopes.clone(),
        })
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> UpstreamResult<TokenResponse> {
        let response = self.client.post(&self.token_url).form(form).send().await?;

        // Error grants come back as 400 with a JSON body, so decode first
        let status = response.status();
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            UpstreamError::Decode(format!("token response (status {}): {}", status, e))
        })
    }
}

#[async_trait]
impl TokenProvider for DiscordOAuthClient {
    async fn refresh(&self, refresh_token: &str, scope: &str) -> UpstreamResult<RefreshOutcome> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("redirect_uri", self.redirect_url.as_str()),
            ("refresh_token", refresh_token),
            ("scope", scope),
        ];
        let token = self.post_token_form(&form).await?;

        if let Some(error) = token.error {
            if error == REVOKED_GRANT_ERROR {
                return Ok(RefreshOutcome::Revoked);
            }
            return Err(UpstreamError::Provider {
                error,
                description: token.error_description,
            });
        }

        match token.access_token {
            Some(access_token) => Ok(RefreshOutcome::Refreshed {
                access_token,
                scope: token.scope,
            }),
            None => Err(UpstreamError::Protocol(
                "token response has neither access_token nor error".to_string(),
            )),
        }
    }

    async fn exchange_code(&self, code: &str) -> UpstreamResult<TokenGrant> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_url.as_str()),
            ("code", code),
        ];
        let response = self.client.post(&self.token_url).form(&form).send().await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn fetch_user(&self, access_token: &str) -> UpstreamResult<DiscordUser> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base_url))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    fn authorize_url(&self, state: &str) -> UpstreamResult<String> {
        let scopes = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", scopes.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| UpstreamError::InvalidConfig(format!("discord.auth_url: {}", e)))?;

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DiscordOAuthClient {
        DiscordOAuthClient::new(&DiscordConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "https://link.example/callback".to_string(),
            token_url: format!("{}/oauth2/token", server.uri()),
            api_base_url: format!("{}/api/", server.uri()),
            ..DiscordConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .and(body_string_contains("client_secret=secret"))
            .and(body_string_contains("scope=identify+guilds.join"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 604800,
                "refresh_token": "new-refresh",
                "scope": "identify guilds.join"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server)
            .refresh("old-refresh", "identify guilds.join")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::Refreshed {
                access_token: "new-access".to_string(),
                scope: Some("identify guilds.join".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_is_revocation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let outcome = client(&server).refresh("old", "identify").await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Revoked);
    }

    #[tokio::test]
    async fn test_refresh_other_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "bad secret"
            })))
            .mount(&server)
            .await;

        let result = client(&server).refresh("old", "identify").await;
        match result {
            Err(UpstreamError::Provider { error, description }) => {
                assert_eq!(error, "invalid_client");
                assert_eq!(description.as_deref(), Some("bad secret"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_missing_access_token_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"scope": "identify"})))
            .mount(&server)
            .await;

        let result = client(&server).refresh("old", "identify").await;
        assert!(matches!(result, Err(UpstreamError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_refresh_non_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let result = client(&server).refresh("old", "identify").await;
        assert!(matches!(result, Err(UpstreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_exchange_code_and_fetch_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "scope": "identify guilds.join",
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/@me"))
            .and(header("authorization", "Bearer access"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "1001", "username": "pilot"})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let grant = client.exchange_code("abc").await.unwrap();
        assert_eq!(grant.refresh_token, "refresh");

        let user = client.fetch_user(&grant.access_token).await.unwrap();
        assert_eq!(user.id, "1001");
    }

    #[tokio::test]
    async fn test_authorize_url() {
        let server = MockServer::start().await;
        let url = client(&server).authorize_url("xyz").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(url.starts_with("https://discord.com/api/oauth2/authorize?"));
        assert!(params.contains(&("state".to_string(), "xyz".to_string())));
        assert!(params.contains(&("scope".to_string(), "identify guilds.join".to_string())));
        assert!(params.contains(&("client_id".to_string(), "client".to_string())));
    }
}
