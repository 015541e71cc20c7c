//! Provider presence handlers

use axum::extract::State;
use serde_json::{json, Value};

use super::{ok, ApiJson, ProviderUser, Reply};
use crate::error::ApiResult;
use crate::presence::{PresenceUpdate, ProviderPresence};
use crate::state::AppState;

pub async fn update_presence(
    State(app_state): State<AppState>,
    ProviderUser(user): ProviderUser,
    ApiJson(update): ApiJson<PresenceUpdate>,
) -> ApiResult<Reply<ProviderPresence>> {
    let presence = app_state.presence.update(user.user_id, update).await?;
    Ok(ok(presence))
}

pub async fn go_offline(
    State(app_state): State<AppState>,
    ProviderUser(user): ProviderUser,
) -> ApiResult<Reply<Value>> {
    let removed = app_state.presence.remove(user.user_id).await;
    Ok(ok(json!({ "provider_id": user.user_id, "removed": removed })))
}
