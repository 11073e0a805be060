pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod redis;
pub mod services;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{delete, get, post, put},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, redis::RedisClient, services::realtime_service::RealtimeHub};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: Arc<RedisClient>,
    pub config: Arc<Config>,
    pub realtime: Arc<RealtimeHub>,
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .allowed_origins
                .iter()
                .map(|origin| origin.parse::<HeaderValue>().unwrap())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    // Public routes (read surface; viewer annotations appear when a
    // token is sent anyway)
    let public_routes = Router::new()
        .route("/api/posts", get(handlers::posts::get_feed))
        .route("/api/posts/{post_id}", get(handlers::posts::get_post))
        .route(
            "/api/posts/{post_id}/comments",
            get(handlers::comments::get_post_comments),
        )
        .route(
            "/api/profiles/{username}",
            get(handlers::profiles::get_profile),
        )
        .route(
            "/api/realtime/posts/{post_id}",
            get(handlers::realtime::subscribe_post),
        );

    // Protected routes (mutations; the bearer token is required)
    let protected_routes = Router::new()
        // Post routes
        .route("/api/posts", post(handlers::posts::create_post))
        .route("/api/posts/{post_id}", delete(handlers::posts::delete_post))
        .route("/api/posts/{post_id}/like", post(handlers::posts::like_post))
        .route("/api/posts/{post_id}/save", post(handlers::posts::save_post))
        .route(
            "/api/posts/{post_id}/save",
            delete(handlers::posts::unsave_post),
        )
        .route("/api/posts/{post_id}/hide", post(handlers::posts::hide_post))
        .route(
            "/api/posts/{post_id}/hide",
            delete(handlers::posts::unhide_post),
        )
        .route(
            "/api/posts/{post_id}/report",
            post(handlers::posts::report_post),
        )
        .route("/api/users/me/saved", get(handlers::posts::get_saved_posts))
        // Comment routes
        .route("/api/comments", post(handlers::comments::create_comment))
        .route(
            "/api/comments/{comment_id}",
            delete(handlers::comments::delete_comment),
        )
        .route(
            "/api/comments/{comment_id}/like",
            post(handlers::comments::like_comment),
        )
        // Profile routes
        .route(
            "/api/profiles/me",
            put(handlers::profiles::update_my_profile),
        )
        .route(
            "/api/users/me/follow/{user_id}",
            post(handlers::profiles::follow_user),
        )
        .route(
            "/api/users/me/unfollow/{user_id}",
            delete(handlers::profiles::unfollow_user),
        )
        .route(
            "/api/users/me/block/{user_id}",
            post(handlers::profiles::block_user),
        )
        .route(
            "/api/users/me/unblock/{user_id}",
            delete(handlers::profiles::unblock_user),
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
