use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::{
        CreatePostRequest, LikeResponse, Post, PostAuthor, PostResponse, PostViewerState,
        PostWithAuthor,
    },
    services::profile_service,
};

// $1 is always the (nullable) viewer id; with NULL bound every viewer
// annotation comes back false.
const POST_SELECT: &str = r#"
    SELECT
        p.id, p.user_id, p.match_name, p.pick, p.odds, p.confidence, p.analysis,
        p.image_url, p.video_url, p.likes_count, p.comments, p.created_at, p.updated_at,
        pr.username, pr.display_name, pr.avatar_url, pr.badge,
        (pl.id IS NOT NULL) AS is_liked,
        (sp.id IS NOT NULL) AS is_saved,
        (hp.id IS NOT NULL) AS is_hidden,
        EXISTS(
            SELECT 1 FROM follows f
            WHERE f.follower_id = $1 AND f.followed_id = p.user_id
        ) AS is_following_author,
        EXISTS(
            SELECT 1 FROM user_blocks ub
            WHERE ub.blocker_id = $1 AND ub.blocked_id = p.user_id
        ) AS has_blocked_author
    FROM posts p
    JOIN profiles pr ON pr.id = p.user_id
    LEFT JOIN post_likes pl ON pl.post_id = p.id AND pl.user_id = $1
    LEFT JOIN saved_posts sp ON sp.post_id = p.id AND sp.user_id = $1
    LEFT JOIN hidden_posts hp ON hp.post_id = p.id AND hp.user_id = $1
"#;

pub async fn get_post_by_id_raw(db: &PgPool, post_id: Uuid) -> Result<Option<Post>> {
    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    Ok(post)
}

pub async fn get_post(
    db: &PgPool,
    post_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Option<PostResponse>> {
    let query = format!("{POST_SELECT} WHERE p.id = $2");
    let row = sqlx::query_as::<_, PostWithAuthor>(&query)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    Ok(row.map(|row| to_response(row, viewer_id.is_some())))
}

/// Reverse-chronological feed. A signed-in viewer never sees posts they
/// hid, posts from authors they blocked, or posts from authors who
/// blocked them; an anonymous viewer sees everything.
pub async fn get_feed(
    db: &PgPool,
    viewer_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<PostResponse>> {
    let query = format!(
        r#"
        {POST_SELECT}
        WHERE $1::uuid IS NULL OR (
            hp.id IS NULL
            AND NOT EXISTS (
                SELECT 1 FROM user_blocks b
                WHERE b.blocker_id = $1 AND b.blocked_id = p.user_id
            )
            AND NOT EXISTS (
                SELECT 1 FROM user_blocks b
                WHERE b.blocker_id = p.user_id AND b.blocked_id = $1
            )
        )
        ORDER BY p.created_at DESC
        LIMIT $2 OFFSET $3
        "#
    );

    let rows = sqlx::query_as::<_, PostWithAuthor>(&query)
        .bind(viewer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

    let with_viewer = viewer_id.is_some();
    Ok(rows
        .into_iter()
        .map(|row| to_response(row, with_viewer))
        .collect())
}

fn to_response(row: PostWithAuthor, with_viewer: bool) -> PostResponse {
    let viewer = with_viewer.then_some(PostViewerState {
        is_liked: row.is_liked,
        is_saved: row.is_saved,
        is_hidden: row.is_hidden,
        is_following_author: row.is_following_author,
        has_blocked_author: row.has_blocked_author,
    });

    PostResponse {
        id: row.id,
        author: PostAuthor {
            id: row.user_id,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            badge: row.badge,
        },
        match_name: row.match_name,
        pick: row.pick,
        odds: row.odds,
        confidence: row.confidence,
        analysis: row.analysis,
        image_url: row.image_url,
        video_url: row.video_url,
        likes_count: row.likes_count,
        comments: row.comments,
        created_at: row.created_at,
        updated_at: row.updated_at,
        viewer,
    }
}

pub async fn create_post(
    db: &PgPool,
    author: &AuthUser,
    request: &CreatePostRequest,
) -> Result<PostResponse> {
    let min_odds = Decimal::new(101, 2); // 1.01
    let max_odds = Decimal::new(1000, 0);
    if request.odds < min_odds || request.odds > max_odds {
        return Err(AppError::Validation(
            "Odds must be between 1.01 and 1000".to_string(),
        ));
    }

    profile_service::ensure_subject(db, author).await?;

    let post_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO posts (
            id, user_id, match_name, pick, odds, confidence,
            analysis, image_url, video_url, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        "#,
    )
    .bind(post_id)
    .bind(author.user_id)
    .bind(request.match_name.trim())
    .bind(request.pick.trim())
    .bind(request.odds)
    .bind(request.confidence)
    .bind(&request.analysis)
    .bind(&request.image_url)
    .bind(&request.video_url)
    .bind(now)
    .execute(db)
    .await?;

    get_post(db, post_id, Some(author.user_id))
        .await?
        .ok_or_else(|| AppError::Internal("Failed to retrieve created post".to_string()))
}

pub async fn delete_post(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user.user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        if get_post_by_id_raw(db, post_id).await?.is_some() {
            return Err(AppError::Authorization(
                "You can only delete your own posts".to_string(),
            ));
        }
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    Ok(())
}

/// Same toggle discipline as comment likes: delete-then-insert in one
/// transaction, unique constraint as the concurrency backstop.
pub async fn toggle_post_like(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<LikeResponse> {
    profile_service::ensure_subject(db, user).await?;

    let mut tx = db.begin().await?;

    let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;

    let liked = if deleted.rows_affected() > 0 {
        false
    } else {
        let inserted = sqlx::query(
            r#"
            INSERT INTO post_likes (id, post_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (post_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(user.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::warn!(%post_id, user_id = %user.user_id, "duplicate post like absorbed");
        }
        true
    };

    let likes_count = sqlx::query_scalar::<_, i32>("SELECT likes_count FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(LikeResponse { liked, likes_count })
}

// Save and hide are idempotent marks: repeating an add or a remove is a
// no-op, not an error.

pub async fn save_post(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<()> {
    profile_service::ensure_subject(db, user).await?;

    sqlx::query(
        r#"
        INSERT INTO saved_posts (id, user_id, post_id, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, post_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(post_id)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(())
}

pub async fn unsave_post(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
        .bind(user.user_id)
        .bind(post_id)
        .execute(db)
        .await?;

    Ok(())
}

pub async fn hide_post(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<()> {
    profile_service::ensure_subject(db, user).await?;

    sqlx::query(
        r#"
        INSERT INTO hidden_posts (id, user_id, post_id, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, post_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(post_id)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(())
}

pub async fn unhide_post(db: &PgPool, user: &AuthUser, post_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM hidden_posts WHERE user_id = $1 AND post_id = $2")
        .bind(user.user_id)
        .bind(post_id)
        .execute(db)
        .await?;

    Ok(())
}

pub async fn report_post(
    db: &PgPool,
    user: &AuthUser,
    post_id: Uuid,
    reason: &str,
    description: Option<&str>,
) -> Result<()> {
    profile_service::ensure_subject(db, user).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO post_reports (id, post_id, reported_by, reason, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (post_id, reported_by) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(post_id)
    .bind(user.user_id)
    .bind(reason)
    .bind(description)
    .bind(Utc::now())
    .execute(db)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "You have already reported this post".to_string(),
        ));
    }

    Ok(())
}

pub async fn get_saved_posts(db: &PgPool, user: &AuthUser) -> Result<Vec<PostResponse>> {
    let query = format!(
        r#"
        {POST_SELECT}
        JOIN saved_posts mine ON mine.post_id = p.id AND mine.user_id = $1
        ORDER BY mine.created_at DESC
        "#
    );

    let rows = sqlx::query_as::<_, PostWithAuthor>(&query)
        .bind(user.user_id)
        .fetch_all(db)
        .await?;

    Ok(rows.into_iter().map(|row| to_response(row, true)).collect())
}
