use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{CommentResponse, CreateCommentRequest, LikeResponse},
    services::{comment_service, post_service},
};

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<CommentResponse>> {
    payload.validate()?;

    // Whitespace-only content must fail before any store or redis call
    if payload.content.trim().is_empty() {
        return Err(AppError::Validation(
            "Comment content cannot be empty".to_string(),
        ));
    }

    let rate_limit_key = format!("comment_create:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 10, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    // Verify post exists
    post_service::get_post_by_id_raw(&state.db, payload.post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    // If replying, verify the parent exists on the same post. Depth is
    // not policed here: the thread view surfaces one level and drops the
    // rest, so a deeper row is inert rather than invalid.
    if let Some(parent_id) = payload.parent_id {
        let parent = comment_service::get_comment_by_id_raw(&state.db, parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

        if parent.post_id != payload.post_id {
            return Err(AppError::BadRequest(
                "Parent comment is not on the same post".to_string(),
            ));
        }
    }

    let comment = comment_service::create_comment(&state.db, &auth_user, &payload).await?;

    Ok(Json(comment))
}

pub async fn get_post_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    // Verify post exists
    post_service::get_post_by_id_raw(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let comments = comment_service::get_comment_tree(&state.db, post_id, viewer_id).await?;

    Ok(Json(json!({
        "comments": comments,
        "post_id": post_id
    })))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode> {
    comment_service::delete_comment(&state.db, &auth_user, comment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<LikeResponse>> {
    let rate_limit_key = format!("comment_like:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 30, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    comment_service::get_comment_by_id_raw(&state.db, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let response = comment_service::toggle_comment_like(&state.db, &auth_user, comment_id).await?;

    Ok(Json(response))
}
