//! Discord account linking handshake
//!
//! The user arrives already authenticated with EVE SSO, which left the
//! character in the `char` cookie. These handlers run the Discord OAuth2
//! authorization code flow, store the resulting identity and add the user to
//! the guild.

use crate::api::rest::session::{
    expired_state_cookie, read_cookie, state_cookie, StateSigner, CHARACTER_COOKIE, STATE_COOKIE,
};
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, UpstreamError};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use guildlink_types::{CharacterCookie, LinkedIdentity};
use serde::{Deserialize, Serialize};

/// Query parameters Discord appends to the redirect
#[derive(Debug, Deserialize)]
pub struct AuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Generic success body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Start linking: issue a signed state and return the authorize URL
pub async fn discord_auth(State(state): State<AppState>) -> ApiResult<Response> {
    let oauth_state = StateSigner::new_state();
    let url = state.oauth.authorize_url(&oauth_state)?;

    let cookie = state_cookie(&state.signer.sign(&oauth_state));
    Ok(([(header::SET_COOKIE, cookie)], Json(url)).into_response())
}

/// Finish linking after Discord redirects back.
///
/// The state cookie is cleared whatever the outcome.
pub async fn discord_auth_callback(
    State(state): State<AppState>,
    Query(params): Query<AuthCallbackParams>,
    headers: HeaderMap,
) -> Response {
    let clear = [(header::SET_COOKIE, expired_state_cookie())];

    match complete_link(&state, params, &headers).await {
        Ok(identity) => {
            tracing::info!(
                discord_id = %identity.discord_id,
                character_id = %identity.character_id,
                "Linked Discord account"
            );
            (clear, Json(StatusResponse { status: "ok" })).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Discord linking failed");
            (clear, e).into_response()
        }
    }
}

async fn complete_link(
    state: &AppState,
    params: AuthCallbackParams,
    headers: &HeaderMap,
) -> ApiResult<LinkedIdentity> {
    let cookie_state = read_cookie(headers, STATE_COOKIE)
        .ok_or_else(|| ApiError::Forbidden("missing state cookie".to_string()))?;
    let expected = state
        .signer
        .verify(&cookie_state)
        .ok_or_else(|| ApiError::Forbidden("state cookie signature mismatch".to_string()))?;
    if params.state.as_deref() != Some(expected) {
        return Err(ApiError::Forbidden("state mismatch".to_string()));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".to_string()))?;

    let character = read_cookie(headers, CHARACTER_COOKIE)
        .ok_or_else(|| ApiError::BadRequest("missing character cookie".to_string()))?;
    let character = CharacterCookie::decode(&character)
        .map_err(|e| ApiError::BadRequest(format!("invalid character cookie: {}", e)))?;

    let grant = state.oauth.exchange_code(&code).await?;
    let user = state.oauth.fetch_user(&grant.access_token).await?;
    let discord_id = user
        .discord_id()
        .map_err(|e| UpstreamError::Protocol(format!("Discord user id: {}", e)))?;

    let identity = LinkedIdentity::new_link(
        character.character_id,
        character.character_name,
        character.corporation_ticker,
        character.alliance_ticker,
        discord_id,
        grant.access_token,
        grant.refresh_token,
        grant.scope,
    );
    let identity = state.storage.upsert_by_discord_id(identity).await?;

    state
        .guild
        .add_member(
            &identity.discord_id,
            &identity.access_token,
            &identity.nickname(),
            &state.guild_roles,
        )
        .await?;

    Ok(identity)
}
