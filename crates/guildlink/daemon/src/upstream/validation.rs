//! Validation server client

use super::{build_http_client, ensure_success, ValidationAuthority};
use crate::config::ValidationConfig;
use crate::error::{UpstreamError, UpstreamResult};
use async_trait::async_trait;
use guildlink_types::{CharacterId, ValidationVerdict};
use reqwest::Client;

/// Posts character ids to the validation server and decodes its verdicts.
///
/// No retries: the next scheduled pass is the retry.
pub struct HttpValidationClient {
    client: Client,
    endpoint: String,
}

impl HttpValidationClient {
    pub fn new(config: &ValidationConfig) -> UpstreamResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(UpstreamError::InvalidConfig(
                "validation.endpoint must be set".to_string(),
            ));
        }

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ValidationAuthority for HttpValidationClient {
    async fn validate(&self, ids: &[CharacterId]) -> UpstreamResult<Vec<ValidationVerdict>> {
        let response = self.client.post(&self.endpoint).json(ids).send().await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await?;
        let elements: Vec<serde_json::Value> =
            serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(decode_verdicts(elements))
    }
}

/// Decode each verdict on its own, dropping the ones that do not parse
fn decode_verdicts(elements: Vec<serde_json::Value>) -> Vec<ValidationVerdict> {
    let total = elements.len();
    let mut verdicts = Vec::with_capacity(total);
    let mut malformed = 0usize;

    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<ValidationVerdict>(element) {
            Ok(verdict) => verdicts.push(verdict),
            Err(e) => {
                malformed += 1;
                tracing::warn!(index, error = %e, "Skipping malformed verdict");
            }
        }
    }

    if malformed > 0 {
        tracing::warn!(total, malformed, "Validation reply contained malformed verdicts");
    }
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpValidationClient {
        HttpValidationClient::new(&ValidationConfig {
            endpoint: format!("{}/api/validation/discord", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_validate_posts_ids_and_decodes_verdicts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/validation/discord"))
            .and(body_json(json!([7, 8])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"EveCharID": 7, "EveCharName": "Pilot", "EveCorpTicker": "ABC", "EveAlliTicker": "", "Valid": true},
                {"EveCharID": 8, "EveCharName": "Gone", "EveCorpTicker": "", "EveAlliTicker": "", "Valid": false}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let verdicts = client(&server)
            .validate(&[CharacterId::new(7), CharacterId::new(8)])
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 2);
        assert!(verdicts[0].valid);
        assert_eq!(verdicts[0].nickname(), "[ABC] Pilot");
        assert!(!verdicts[1].valid);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = client(&server).validate(&[CharacterId::new(7)]).await;
        match result {
            Err(UpstreamError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
            .mount(&server)
            .await;

        let result = client(&server).validate(&[CharacterId::new(7)]).await;
        assert!(matches!(result, Err(UpstreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_malformed_verdict_skipped_others_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"EveCharID": 7, "EveCharName": "Gone", "EveCorpTicker": "", "EveAlliTicker": "", "Valid": false},
                {"EveCharID": "oops", "EveCharName": "Broken", "EveCorpTicker": "", "EveAlliTicker": "", "Valid": true}
            ])))
            .mount(&server)
            .await;

        let verdicts = client(&server)
            .validate(&[CharacterId::new(7), CharacterId::new(8)])
            .await
            .unwrap();

        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].character_id, CharacterId::new(7));
        assert!(!verdicts[0].valid);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = HttpValidationClient::new(&ValidationConfig {
            endpoint: " ".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(UpstreamError::InvalidConfig(_))));
    }
}
