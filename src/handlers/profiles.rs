use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::Result,
    models::{Profile, ProfileResponse, UpdateProfileRequest},
    services::profile_service,
};

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth_user: OptionalAuthUser,
) -> Result<Json<ProfileResponse>> {
    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let profile = profile_service::get_profile_response(&state.db, &username, viewer_id).await?;

    Ok(Json(profile))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>> {
    payload.validate()?;

    let profile = profile_service::update_profile(&state.db, &auth_user, &payload).await?;

    Ok(Json(profile))
}

pub async fn follow_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    profile_service::follow_user(&state.db, &auth_user, user_id).await?;

    Ok(Json(json!({ "message": "User followed" })))
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    profile_service::unfollow_user(&state.db, &auth_user, user_id).await?;

    Ok(Json(json!({ "message": "User unfollowed" })))
}

pub async fn block_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    profile_service::block_user(&state.db, &auth_user, user_id).await?;

    Ok(Json(json!({ "message": "User blocked" })))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    profile_service::unblock_user(&state.db, &auth_user, user_id).await?;

    Ok(Json(json!({ "message": "User unblocked" })))
}
