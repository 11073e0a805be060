use chrono::Utc;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::{Profile, ProfileResponse, ProfileViewerState, UpdateProfileRequest},
};

#[derive(Debug, FromRow)]
struct ProfileStats {
    post_count: i64,
    follower_count: i64,
    following_count: i64,
}

/// Materialize the token subject locally. Ownership foreign keys need a
/// users row, and the read queries join profiles, so both are seeded on
/// first write. The provider's username claim fills the profile until the
/// user edits it.
pub async fn ensure_subject(db: &PgPool, user: &AuthUser) -> Result<()> {
    sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(user.user_id)
        .execute(db)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO profiles (id, username, created_at, updated_at)
        VALUES ($1, $2, NOW(), NOW())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user.user_id)
    .bind(&user.username)
    .execute(db)
    .await
    .map_err(username_conflict)?;

    Ok(())
}

fn username_conflict(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.constraint() == Some("profiles_username_key") {
            return AppError::Conflict("Username already taken".to_string());
        }
    }
    AppError::Database(e)
}

pub async fn get_profile_by_username(db: &PgPool, username: &str) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE username = $1")
        .bind(username)
        .fetch_optional(db)
        .await?;

    Ok(profile)
}

pub async fn get_profile_by_id(db: &PgPool, user_id: Uuid) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    Ok(profile)
}

pub async fn update_profile(
    db: &PgPool,
    user: &AuthUser,
    request: &UpdateProfileRequest,
) -> Result<Profile> {
    ensure_subject(db, user).await?;

    sqlx::query(
        r#"
        UPDATE profiles
        SET display_name = COALESCE($2, display_name),
            avatar_url = COALESCE($3, avatar_url),
            updated_at = $4
        WHERE id = $1
        "#,
    )
    .bind(user.user_id)
    .bind(&request.display_name)
    .bind(&request.avatar_url)
    .bind(Utc::now())
    .execute(db)
    .await?;

    get_profile_by_id(db, user.user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Failed to retrieve updated profile".to_string()))
}

pub async fn get_profile_response(
    db: &PgPool,
    username: &str,
    viewer_id: Option<Uuid>,
) -> Result<ProfileResponse> {
    let profile = get_profile_by_username(db, username)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    let stats = sqlx::query_as::<_, ProfileStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM posts WHERE user_id = $1) as post_count,
            (SELECT COUNT(*) FROM follows WHERE followed_id = $1) as follower_count,
            (SELECT COUNT(*) FROM follows WHERE follower_id = $1) as following_count
        "#,
    )
    .bind(profile.id)
    .fetch_one(db)
    .await?;

    let viewer = match viewer_id {
        Some(viewer_id) => Some(ProfileViewerState {
            is_following: is_following(db, viewer_id, profile.id).await?,
            has_blocked: is_blocked(db, viewer_id, profile.id).await?,
        }),
        None => None,
    };

    Ok(ProfileResponse {
        id: profile.id,
        username: profile.username,
        display_name: profile.display_name,
        avatar_url: profile.avatar_url,
        badge: profile.badge,
        post_count: stats.post_count,
        follower_count: stats.follower_count,
        following_count: stats.following_count,
        created_at: profile.created_at,
        viewer,
    })
}

pub async fn is_following(db: &PgPool, follower_id: Uuid, followed_id: Uuid) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND followed_id = $2)",
    )
    .bind(follower_id)
    .bind(followed_id)
    .fetch_one(db)
    .await?;

    Ok(exists)
}

pub async fn is_blocked(db: &PgPool, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2)",
    )
    .bind(blocker_id)
    .bind(blocked_id)
    .fetch_one(db)
    .await?;

    Ok(exists)
}

pub async fn follow_user(db: &PgPool, follower: &AuthUser, followed_id: Uuid) -> Result<()> {
    if follower.user_id == followed_id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    let target = get_profile_by_id(db, followed_id).await?;
    if target.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    if is_blocked(db, followed_id, follower.user_id).await? {
        return Err(AppError::Authorization(
            "You cannot follow this user".to_string(),
        ));
    }

    ensure_subject(db, follower).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO follows (id, follower_id, followed_id, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (follower_id, followed_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(follower.user_id)
    .bind(followed_id)
    .bind(Utc::now())
    .execute(db)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Already following this user".to_string(),
        ));
    }

    Ok(())
}

pub async fn unfollow_user(db: &PgPool, follower: &AuthUser, followed_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
        .bind(follower.user_id)
        .bind(followed_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Not following this user".to_string()));
    }

    Ok(())
}

pub async fn block_user(db: &PgPool, blocker: &AuthUser, blocked_id: Uuid) -> Result<()> {
    if blocker.user_id == blocked_id {
        return Err(AppError::BadRequest("You cannot block yourself".to_string()));
    }

    let target = get_profile_by_id(db, blocked_id).await?;
    if target.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    ensure_subject(db, blocker).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO user_blocks (id, blocker_id, blocked_id, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (blocker_id, blocked_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(blocker.user_id)
    .bind(blocked_id)
    .bind(Utc::now())
    .execute(db)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict("Already blocked this user".to_string()));
    }

    // Blocking severs the follow edge in both directions
    sqlx::query(
        r#"
        DELETE FROM follows
        WHERE (follower_id = $1 AND followed_id = $2)
           OR (follower_id = $2 AND followed_id = $1)
        "#,
    )
    .bind(blocker.user_id)
    .bind(blocked_id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn unblock_user(db: &PgPool, blocker: &AuthUser, blocked_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2")
        .bind(blocker.user_id)
        .bind(blocked_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User is not blocked".to_string()));
    }

    Ok(())
}
