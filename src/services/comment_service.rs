use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::{
        Comment, CommentAuthor, CommentResponse, CommentWithAuthor, CreateCommentRequest,
        LikeResponse,
    },
    services::profile_service,
};

const COMMENT_MAX_CHARS: usize = 1000;

const COMMENT_WITH_AUTHOR_COLUMNS: &str = r#"
    c.id, c.user_id, c.post_id, c.content, c.parent_id, c.likes_count,
    c.created_at, c.updated_at,
    pr.username, pr.display_name, pr.avatar_url, pr.badge
"#;

pub async fn get_comment_by_id_raw(db: &PgPool, comment_id: Uuid) -> Result<Option<Comment>> {
    let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(db)
        .await?;

    Ok(comment)
}

/// Fetch every comment on a post (with author profiles, oldest first),
/// mark the ones the viewer has liked, and fold the flat list into the
/// one-level thread shape.
pub async fn get_comment_tree(
    db: &PgPool,
    post_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Vec<CommentResponse>> {
    let query = format!(
        r#"
        SELECT {COMMENT_WITH_AUTHOR_COLUMNS}
        FROM comments c
        JOIN profiles pr ON pr.id = c.user_id
        WHERE c.post_id = $1
        ORDER BY c.created_at ASC
        "#
    );
    let rows = sqlx::query_as::<_, CommentWithAuthor>(&query)
        .bind(post_id)
        .fetch_all(db)
        .await?;

    let liked = match viewer_id {
        Some(viewer_id) => liked_comment_ids(db, viewer_id, &rows).await?,
        None => HashSet::new(),
    };

    Ok(build_comment_tree(rows, &liked))
}

async fn liked_comment_ids(
    db: &PgPool,
    viewer_id: Uuid,
    rows: &[CommentWithAuthor],
) -> Result<HashSet<Uuid>> {
    if rows.is_empty() {
        return Ok(HashSet::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let liked = sqlx::query_scalar::<_, Uuid>(
        "SELECT comment_id FROM comment_likes WHERE user_id = $1 AND comment_id = ANY($2)",
    )
    .bind(viewer_id)
    .bind(&ids)
    .fetch_all(db)
    .await?;

    Ok(liked.into_iter().collect())
}

/// Partition a flat, creation-ordered comment list into root comments
/// carrying one level of replies. Input order is preserved, so roots and
/// each root's replies both come out oldest first.
///
/// A reply whose parent is not a root of this list has no slot in the
/// one-level shape and is left out of the result entirely. That covers
/// replies to replies as well as replies whose parent was deleted
/// between the row's insert and this read.
pub fn build_comment_tree(
    rows: Vec<CommentWithAuthor>,
    liked: &HashSet<Uuid>,
) -> Vec<CommentResponse> {
    let mut roots: Vec<CommentResponse> = Vec::new();
    let mut root_index: HashMap<Uuid, usize> = HashMap::new();
    let mut replies: Vec<CommentResponse> = Vec::new();

    for row in rows {
        let node = to_node(row, liked);
        match node.parent_id {
            None => {
                root_index.insert(node.id, roots.len());
                roots.push(node);
            }
            Some(_) => replies.push(node),
        }
    }

    for reply in replies {
        let Some(parent_id) = reply.parent_id else {
            continue;
        };
        if let Some(&index) = root_index.get(&parent_id) {
            roots[index].replies.push(reply);
        }
    }

    roots
}

fn to_node(row: CommentWithAuthor, liked: &HashSet<Uuid>) -> CommentResponse {
    CommentResponse {
        id: row.id,
        post_id: row.post_id,
        parent_id: row.parent_id,
        content: row.content,
        likes_count: row.likes_count,
        is_liked: liked.contains(&row.id),
        author: CommentAuthor {
            id: row.user_id,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            badge: row.badge,
        },
        created_at: row.created_at,
        updated_at: row.updated_at,
        replies: Vec::new(),
    }
}

pub async fn get_comment_with_author(
    db: &PgPool,
    comment_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Option<CommentResponse>> {
    let query = format!(
        r#"
        SELECT {COMMENT_WITH_AUTHOR_COLUMNS}
        FROM comments c
        JOIN profiles pr ON pr.id = c.user_id
        WHERE c.id = $1
        "#
    );
    let row = sqlx::query_as::<_, CommentWithAuthor>(&query)
        .bind(comment_id)
        .fetch_optional(db)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut liked = HashSet::new();
    if let Some(viewer_id) = viewer_id {
        let is_liked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM comment_likes WHERE comment_id = $1 AND user_id = $2)",
        )
        .bind(comment_id)
        .bind(viewer_id)
        .fetch_one(db)
        .await?;
        if is_liked {
            liked.insert(row.id);
        }
    }

    Ok(Some(to_node(row, &liked)))
}

pub async fn create_comment(
    db: &PgPool,
    author: &AuthUser,
    request: &CreateCommentRequest,
) -> Result<CommentResponse> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation(
            "Comment content cannot be empty".to_string(),
        ));
    }
    if content.chars().count() > COMMENT_MAX_CHARS {
        return Err(AppError::Validation(
            "Comment content exceeds 1000 characters".to_string(),
        ));
    }

    profile_service::ensure_subject(db, author).await?;

    let comment_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO comments (id, user_id, post_id, content, parent_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(comment_id)
    .bind(author.user_id)
    .bind(request.post_id)
    .bind(content)
    .bind(request.parent_id)
    .bind(now)
    .execute(db)
    .await?;

    // Read the row back so the response carries the author profile
    get_comment_with_author(db, comment_id, Some(author.user_id))
        .await?
        .ok_or_else(|| AppError::Internal("Failed to retrieve created comment".to_string()))
}

/// Flip the (comment, user) like row inside one transaction: delete it if
/// present, otherwise insert it. The UNIQUE(comment_id, user_id)
/// constraint backstops concurrent toggles; a raced duplicate insert is
/// absorbed by ON CONFLICT and logged rather than surfaced.
pub async fn toggle_comment_like(
    db: &PgPool,
    user: &AuthUser,
    comment_id: Uuid,
) -> Result<LikeResponse> {
    profile_service::ensure_subject(db, user).await?;

    let mut tx = db.begin().await?;

    let deleted = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment_id)
        .bind(user.user_id)
        .execute(&mut *tx)
        .await?;

    let liked = if deleted.rows_affected() > 0 {
        false
    } else {
        let inserted = sqlx::query(
            r#"
            INSERT INTO comment_likes (id, comment_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (comment_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(comment_id)
        .bind(user.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::warn!(%comment_id, user_id = %user.user_id, "duplicate comment like absorbed");
        }
        true
    };

    // Counter is trigger-maintained; read it back inside the transaction
    let likes_count = sqlx::query_scalar::<_, i32>("SELECT likes_count FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(LikeResponse { liked, likes_count })
}

/// Owner-only hard delete. The store cascades into replies and like rows;
/// the recount trigger then lands the post counter on the right number.
pub async fn delete_comment(db: &PgPool, user: &AuthUser, comment_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND user_id = $2")
        .bind(comment_id)
        .bind(user.user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        // Distinguish "not yours" from "gone" for the caller
        if get_comment_by_id_raw(db, comment_id).await?.is_some() {
            return Err(AppError::Authorization(
                "You can only delete your own comments".to_string(),
            ));
        }
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    Ok(())
}
