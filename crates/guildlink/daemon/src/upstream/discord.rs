//! Discord guild membership client

use super::{build_http_client, ensure_success, GuildMembership};
use crate::config::DiscordConfig;
use crate::error::{UpstreamError, UpstreamResult};
use async_trait::async_trait;
use guildlink_types::DiscordUserId;
use reqwest::{header, Client, RequestBuilder};
use serde_json::json;

/// Guild member management through the Discord REST API, authenticated as
/// the application's bot
pub struct DiscordGuildClient {
    client: Client,
    api_base_url: String,
    guild_id: String,
    bot_token: String,
}

impl DiscordGuildClient {
    pub fn new(config: &DiscordConfig) -> UpstreamResult<Self> {
        if config.guild_id.trim().is_empty() {
            return Err(UpstreamError::InvalidConfig(
                "discord.guild_id must be set".to_string(),
            ));
        }

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            guild_id: config.guild_id.clone(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn member_url(&self, discord_id: &DiscordUserId) -> String {
        format!(
            "{}/guilds/{}/members/{}",
            self.api_base_url, self.guild_id, discord_id
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(header::AUTHORIZATION, format!("Bot {}", self.bot_token))
    }
}

#[async_trait]
impl GuildMembership for DiscordGuildClient {
    async fn add_member(
        &self,
        discord_id: &DiscordUserId,
        access_token: &str,
        nickname: &str,
        roles: &[String],
    ) -> UpstreamResult<()> {
        let roles: Vec<&str> = roles
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        let body = json!({
            "access_token": access_token,
            "nick": nickname,
            "roles": roles,
        });

        // 201 when added, 204 when the user already is a member
        let request = self.client.put(self.member_url(discord_id)).json(&body);
        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn remove_member(&self, discord_id: &DiscordUserId) -> UpstreamResult<()> {
        let request = self.client.delete(self.member_url(discord_id));
        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn rename_member(
        &self,
        discord_id: &DiscordUserId,
        nickname: &str,
    ) -> UpstreamResult<()> {
        let request = self
            .client
            .patch(self.member_url(discord_id))
            .json(&json!({ "nick": nickname }));
        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DiscordGuildClient {
        DiscordGuildClient::new(&DiscordConfig {
            bot_token: "bot-token".to_string(),
            guild_id: "555".to_string(),
            api_base_url: server.uri(),
            ..DiscordConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_member() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/guilds/555/members/1001"))
            .and(header("authorization", "Bot bot-token"))
            .and(body_json(serde_json::json!({
                "access_token": "access",
                "nick": "[ABC] Pilot",
                "roles": ["42"]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .add_member(
                &DiscordUserId::new("1001"),
                "access",
                "[ABC] Pilot",
                &["42".to_string(), "".to_string()],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rename_member() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/guilds/555/members/1001"))
            .and(header("authorization", "Bot bot-token"))
            .and(body_json(serde_json::json!({"nick": "[ABC] Pilot"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .rename_member(&DiscordUserId::new("1001"), "[ABC] Pilot")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_member_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/guilds/555/members/1001"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string(r#"{"message": "Missing Permissions"}"#),
            )
            .mount(&server)
            .await;

        let result = client(&server)
            .remove_member(&DiscordUserId::new("1001"))
            .await;
        match result {
            Err(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 403);
                assert!(body.contains("Missing Permissions"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn test_guild_id_required() {
        let result = DiscordGuildClient::new(&DiscordConfig::default());
        assert!(matches!(result, Err(UpstreamError::InvalidConfig(_))));
    }
}
