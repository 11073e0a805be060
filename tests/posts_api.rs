// tests/posts_api.rs
//
// Feed and post lifecycle: creation, viewer annotations, like toggling,
// save/hide/report, and the feed exclusion rules. Needs a running
// Postgres and Redis; run with `cargo test -- --ignored`.

use pronofeed::{
    AppState, auth::Claims, config::Config, create_app, redis::RedisClient,
    services::realtime_service::RealtimeHub,
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

const TEST_JWT_SECRET: &str = "test_secret_for_integration_tests";

async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let redis = Arc::new(
        RedisClient::new(&redis_url)
            .await
            .expect("Failed to connect to Redis for testing"),
    );

    let config = Config {
        database_url,
        redis_url,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        allowed_origins: vec!["http://localhost:5173".to_string()],
    };

    let state = AppState {
        db: pool,
        redis,
        config: Arc::new(config),
        realtime: Arc::new(RealtimeHub::default()),
    };

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

struct TestUser {
    username: String,
    token: String,
}

fn test_user() -> TestUser {
    let id = Uuid::new_v4();
    let username = format!("u_{}", &id.to_string()[..8]);
    let token = Claims::issue(id, &username, TEST_JWT_SECRET).expect("failed to sign test token");
    TestUser { username, token }
}

async fn create_post(client: &reqwest::Client, address: &str, token: &str) -> Value {
    let response = client
        .post(format!("{}/api/posts", address))
        .bearer_auth(token)
        .json(&json!({
            "match_name": "Lyon vs Monaco",
            "pick": "Plus de 2.5 buts",
            "odds": 1.72,
            "confidence": 3,
            "analysis": "Deux attaques en forme, défenses fébriles."
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.expect("Failed to parse post json")
}

async fn feed_ids(client: &reqwest::Client, address: &str, token: Option<&str>) -> Vec<String> {
    let mut request = client.get(format!("{}/api/posts?limit=100", address));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let body: Value = request
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse feed json");

    body["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn creating_a_post_requires_authentication() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/posts", address))
        .json(&json!({
            "match_name": "Lyon vs Monaco",
            "pick": "Nul",
            "odds": 3.4,
            "confidence": 2
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn created_post_is_fetchable_with_author_and_fresh_counters() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user = test_user();

    let created = create_post(&client, &address, &user.token).await;
    let post_id = created["id"].as_str().unwrap();

    // Anonymous fetch: full post, author block, no viewer annotations
    let post: Value = client
        .get(format!("{}/api/posts/{}", address, post_id))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    assert_eq!(post["match_name"], "Lyon vs Monaco");
    assert_eq!(post["author"]["username"], user.username.as_str());
    assert_eq!(post["likes_count"], 0);
    assert_eq!(post["comments"], 0);
    assert!(post["viewer"].is_null());

    // And it lands in the feed
    let ids = feed_ids(&client, &address, None).await;
    assert!(ids.contains(&post_id.to_string()));
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn viewer_annotations_come_with_a_token() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user = test_user();
    let viewer = test_user();

    let created = create_post(&client, &address, &user.token).await;
    let post_id = created["id"].as_str().unwrap();

    let post: Value = client
        .get(format!("{}/api/posts/{}", address, post_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    assert_eq!(post["viewer"]["is_liked"], false);
    assert_eq!(post["viewer"]["is_saved"], false);
    assert_eq!(post["viewer"]["is_hidden"], false);
    assert_eq!(post["viewer"]["is_following_author"], false);
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn post_like_toggles_and_rereads_the_counter() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let liker = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap();

    let like: Value = client
        .post(format!("{}/api/posts/{}/like", address, post_id))
        .bearer_auth(&liker.token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert_eq!(like["liked"], true);
    assert_eq!(like["likes_count"], 1);

    let unlike: Value = client
        .post(format!("{}/api/posts/{}/like", address, post_id))
        .bearer_auth(&liker.token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert_eq!(unlike["liked"], false);
    assert_eq!(unlike["likes_count"], 0);
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn out_of_range_prediction_fields_are_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user = test_user();

    // Confidence outside 1..=5
    let response = client
        .post(format!("{}/api/posts", address))
        .bearer_auth(&user.token)
        .json(&json!({
            "match_name": "Lyon vs Monaco",
            "pick": "Nul",
            "odds": 3.4,
            "confidence": 6
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);

    // Odds below the bookmaker floor
    let response = client
        .post(format!("{}/api/posts", address))
        .bearer_auth(&user.token)
        .json(&json!({
            "match_name": "Lyon vs Monaco",
            "pick": "Nul",
            "odds": 1.0,
            "confidence": 2
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn saved_posts_round_trip() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let saver = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/api/posts/{}/save", address, post_id))
        .bearer_auth(&saver.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    // Saving again is a quiet no-op
    let response = client
        .post(format!("{}/api/posts/{}/save", address, post_id))
        .bearer_auth(&saver.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let saved: Value = client
        .get(format!("{}/api/users/me/saved", address))
        .bearer_auth(&saver.token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    let saved_ids: Vec<&str> = saved["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["id"].as_str().unwrap())
        .collect();
    assert!(saved_ids.contains(&post_id.as_str()));

    let response = client
        .delete(format!("{}/api/posts/{}/save", address, post_id))
        .bearer_auth(&saver.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let saved: Value = client
        .get(format!("{}/api/users/me/saved", address))
        .bearer_auth(&saver.token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();
    assert!(
        !saved["posts"]
            .as_array()
            .unwrap()
            .iter()
            .any(|post| post["id"].as_str() == Some(post_id.as_str()))
    );
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn hidden_posts_leave_the_viewers_feed_only() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let viewer = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/api/posts/{}/hide", address, post_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let viewer_feed = feed_ids(&client, &address, Some(&viewer.token)).await;
    assert!(!viewer_feed.contains(&post_id));

    // Everyone else still sees it
    let anonymous_feed = feed_ids(&client, &address, None).await;
    assert!(anonymous_feed.contains(&post_id));

    // And the single fetch is never filtered
    let response = client
        .get(format!("{}/api/posts/{}", address, post_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(format!("{}/api/posts/{}/hide", address, post_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let viewer_feed = feed_ids(&client, &address, Some(&viewer.token)).await;
    assert!(viewer_feed.contains(&post_id));
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn blocking_an_author_removes_their_posts_from_the_feed() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let viewer = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap().to_string();
    let author_id = created["author"]["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/users/me/block/{}", address, author_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let viewer_feed = feed_ids(&client, &address, Some(&viewer.token)).await;
    assert!(!viewer_feed.contains(&post_id));

    let response = client
        .delete(format!("{}/api/users/me/unblock/{}", address, author_id))
        .bearer_auth(&viewer.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let viewer_feed = feed_ids(&client, &address, Some(&viewer.token)).await;
    assert!(viewer_feed.contains(&post_id));
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn reporting_a_post_twice_conflicts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let reporter = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap();

    let report = json!({ "reason": "spam", "description": "Lien douteux dans l'analyse" });

    let response = client
        .post(format!("{}/api/posts/{}/report", address, post_id))
        .bearer_auth(&reporter.token)
        .json(&report)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/posts/{}/report", address, post_id))
        .bearer_auth(&reporter.token)
        .json(&report)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
#[ignore = "requires running Postgres and Redis"]
async fn only_the_author_can_delete_a_post() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = test_user();
    let intruder = test_user();

    let created = create_post(&client, &address, &author.token).await;
    let post_id = created["id"].as_str().unwrap();

    let response = client
        .delete(format!("{}/api/posts/{}", address, post_id))
        .bearer_auth(&intruder.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .delete(format!("{}/api/posts/{}", address, post_id))
        .bearer_auth(&author.token)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(format!("{}/api/posts/{}", address, post_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}
