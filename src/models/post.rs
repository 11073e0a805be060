use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_name: String,
    pub pick: String,
    pub odds: Decimal,
    pub confidence: i16,
    pub analysis: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub likes_count: i32,
    pub comments: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Flat fetch row: post joined with author profile and viewer annotations.
// The viewer columns come back false when no viewer id is bound.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithAuthor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub match_name: String,
    pub pick: String,
    pub odds: Decimal,
    pub confidence: i16,
    pub analysis: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub likes_count: i32,
    pub comments: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub badge: Option<String>,
    pub is_liked: bool,
    pub is_saved: bool,
    pub is_hidden: bool,
    pub is_following_author: bool,
    pub has_blocked_author: bool,
}

// Create post request
#[derive(Debug, Validate, Deserialize)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub match_name: String,
    #[validate(length(min = 1, max = 200))]
    pub pick: String,
    pub odds: Decimal,
    #[validate(range(min = 1, max = 5))]
    pub confidence: i16,
    #[validate(length(max = 2000))]
    pub analysis: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(url)]
    pub video_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostAuthor {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub badge: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub author: PostAuthor,
    pub match_name: String,
    pub pick: String,
    pub odds: Decimal,
    pub confidence: i16,
    pub analysis: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub likes_count: i32,
    pub comments: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present only when the request carried a verified token.
    pub viewer: Option<PostViewerState>,
}

#[derive(Debug, Serialize)]
pub struct PostViewerState {
    pub is_liked: bool,
    pub is_saved: bool,
    pub is_hidden: bool,
    pub is_following_author: bool,
    pub has_blocked_author: bool,
}
