use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{CreatePostRequest, LikeResponse, PostResponse},
    services::post_service,
};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<PostResponse>> {
    payload.validate()?;

    let rate_limit_key = format!("post_create:user:{}", auth_user.user_id);
    if !state.redis.check_rate_limit(&rate_limit_key, 5, 300).await? {
        return Err(AppError::RateLimit);
    }

    let post = post_service::create_post(&state.db, &auth_user, &payload).await?;

    Ok(Json(post))
}

pub async fn get_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedQuery>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let limit = params.limit.unwrap_or(25).min(100) as i64;
    let offset = params.offset.unwrap_or(0) as i64;

    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let posts = post_service::get_feed(&state.db, viewer_id, limit, offset).await?;

    Ok(Json(json!({
        "posts": posts,
        "limit": limit,
        "offset": offset
    })))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    auth_user: OptionalAuthUser,
) -> Result<Json<PostResponse>> {
    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let post = post_service::get_post(&state.db, post_id, viewer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode> {
    post_service::delete_post(&state.db, &auth_user, post_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeResponse>> {
    let rate_limit_key = format!("post_like:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 30, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    post_service::get_post_by_id_raw(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let response = post_service::toggle_post_like(&state.db, &auth_user, post_id).await?;

    Ok(Json(response))
}

pub async fn save_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::get_post_by_id_raw(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    post_service::save_post(&state.db, &auth_user, post_id).await?;

    Ok(Json(json!({ "message": "Post saved" })))
}

pub async fn unsave_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::unsave_post(&state.db, &auth_user, post_id).await?;

    Ok(Json(json!({ "message": "Post unsaved" })))
}

pub async fn hide_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::get_post_by_id_raw(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    post_service::hide_post(&state.db, &auth_user, post_id).await?;

    Ok(Json(json!({ "message": "Post hidden" })))
}

pub async fn unhide_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::unhide_post(&state.db, &auth_user, post_id).await?;

    Ok(Json(json!({ "message": "Post unhidden" })))
}

pub async fn report_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<ReportPostRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    let rate_limit_key = format!("post_report:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 5, 3600)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    post_service::get_post_by_id_raw(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    post_service::report_post(
        &state.db,
        &auth_user,
        post_id,
        &payload.reason,
        payload.description.as_deref(),
    )
    .await?;

    Ok(Json(json!({ "message": "Post reported" })))
}

pub async fn get_saved_posts(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>> {
    let posts = post_service::get_saved_posts(&state.db, &auth_user).await?;

    Ok(Json(json!({ "posts": posts })))
}

#[derive(Debug, Validate, Deserialize)]
pub struct ReportPostRequest {
    #[validate(length(min = 1, max = 100))]
    pub reason: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}
