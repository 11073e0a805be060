use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, postgres::PgListener};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// NOTIFY channels registered by the schema's broadcast triggers.
pub const COMMENTS_CHANNEL: &str = "comments_changed";
pub const COMMENT_LIKES_CHANNEL: &str = "comment_likes_changed";

const EVENT_BUFFER: usize = 64;

/// One store-side row change, exactly as announced by the notify
/// triggers. Subscribers receive it as a refetch cue; it never carries
/// row data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub op: ChangeOp,
    // Absent from like payloads, so parsing must tolerate a missing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Comments,
    CommentLikes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Fan-out point between the store's change feed and mounted comment
/// views. Comment events are scoped per post; like events go to every
/// subscriber regardless of post, matching the unfiltered trigger.
pub struct RealtimeHub {
    posts: Mutex<HashMap<Uuid, broadcast::Sender<ChangeEvent>>>,
    likes: broadcast::Sender<ChangeEvent>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        let (likes, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            posts: Mutex::new(HashMap::new()),
            likes,
        }
    }

    /// Open a subscription for one mounted view of `post_id`. The channel
    /// name is randomized per call, so two mounts of the same post never
    /// alias each other and remounts get a fresh identity.
    pub fn subscribe(self: Arc<Self>, post_id: Uuid) -> Subscription {
        let comment_rx = {
            let mut posts = self.posts.lock().unwrap();
            posts
                .entry(post_id)
                .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
                .subscribe()
        };
        let like_rx = self.likes.subscribe();

        let subscription = Subscription {
            channel: format!("comments:{post_id}:{}", Uuid::new_v4()),
            post_id,
            hub: self,
            comment_rx: Some(comment_rx),
            like_rx: Some(like_rx),
        };
        tracing::debug!(channel = %subscription.channel, "realtime subscription opened");
        subscription
    }

    /// Route one store event to the views it concerns.
    pub fn dispatch(&self, event: ChangeEvent) {
        match event.table {
            ChangeTable::Comments => {
                let Some(post_id) = event.post_id else {
                    tracing::warn!("comment change event without a post id, dropped");
                    return;
                };
                let posts = self.posts.lock().unwrap();
                if let Some(tx) = posts.get(&post_id) {
                    // send errs when no subscriber is live; nothing to do
                    let _ = tx.send(event);
                }
            }
            ChangeTable::CommentLikes => {
                let _ = self.likes.send(event);
            }
        }
    }

    pub fn subscriber_count(&self, post_id: Uuid) -> usize {
        let posts = self.posts.lock().unwrap();
        posts.get(&post_id).map_or(0, |tx| tx.receiver_count())
    }

    fn release(&self, post_id: Uuid) {
        let mut posts = self.posts.lock().unwrap();
        if posts
            .get(&post_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            posts.remove(&post_id);
        }
    }
}

/// A live subscription held by one mounted view. Tear it down with
/// [`Subscription::unsubscribe`] or just drop it; both paths are
/// idempotent and prune the hub entry once the last receiver is gone.
pub struct Subscription {
    channel: String,
    post_id: Uuid,
    hub: Arc<RealtimeHub>,
    comment_rx: Option<broadcast::Receiver<ChangeEvent>>,
    like_rx: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next change event relevant to this view, from either the
    /// post-scoped comment feed or the unfiltered like feed. None once
    /// the subscription is torn down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let (comment_rx, like_rx) = match (self.comment_rx.as_mut(), self.like_rx.as_mut()) {
                (Some(comment_rx), Some(like_rx)) => (comment_rx, like_rx),
                _ => return None,
            };

            tokio::select! {
                event = comment_rx.recv() => match event {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "comment event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                event = like_rx.recv() => match event {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "like event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Explicit teardown. Calling it again, or dropping afterwards, is a
    /// no-op.
    pub fn unsubscribe(&mut self) {
        let had_receiver = self.comment_rx.take().is_some();
        self.like_rx.take();
        if had_receiver {
            self.hub.release(self.post_id);
            tracing::debug!(channel = %self.channel, "realtime subscription torn down");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Background task owning the LISTEN connection. Feeds the hub until the
/// process exits; a lost connection is retried with jittered backoff and
/// never takes reads or writes down with it.
pub async fn run_change_listener(db: PgPool, hub: Arc<RealtimeHub>) {
    loop {
        match listen_once(&db, &hub).await {
            Ok(()) => tracing::warn!("change listener stream ended, reconnecting"),
            Err(e) => tracing::warn!(error = %e, "change listener failed, reconnecting"),
        }

        let jitter = rand::rng().random_range(0..500u64);
        tokio::time::sleep(Duration::from_millis(1_000 + jitter)).await;
    }
}

async fn listen_once(db: &PgPool, hub: &Arc<RealtimeHub>) -> Result<()> {
    let mut listener = PgListener::connect_with(db).await?;
    listener
        .listen_all([COMMENTS_CHANNEL, COMMENT_LIKES_CHANNEL])
        .await?;
    tracing::info!("listening for store change notifications");

    loop {
        let notification = listener.recv().await?;
        match serde_json::from_str::<ChangeEvent>(notification.payload()) {
            Ok(event) => hub.dispatch(event),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = notification.payload(),
                    "unparseable change notification dropped"
                );
            }
        }
    }
}
