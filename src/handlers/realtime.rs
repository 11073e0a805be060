use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, services::realtime_service::ChangeEvent};

/// Messages sent to a subscribed socket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Subscribed { channel: &'a str, post_id: Uuid },
    // Newtype around a struct: the tag is merged into the event fields
    Refetch(ChangeEvent),
}

/// Messages a socket may send back.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { post_id: Uuid },
}

pub async fn subscribe_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, post_id))
}

/// One socket, one live subscription. The client can retarget the
/// subscription with a `subscribe` message when its view moves to another
/// post; the old channel is torn down before the new one opens. The
/// socket only ever carries refetch cues, never comment data.
async fn handle_socket(socket: WebSocket, state: AppState, post_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.realtime.clone().subscribe(post_id);

    let hello = ServerMessage::Subscribed {
        channel: subscription.channel(),
        post_id,
    };
    if !send_json(&mut sender, &hello).await {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if !send_json(&mut sender, &ServerMessage::Refetch(event)).await {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { post_id: next }) => {
                                subscription.unsubscribe();
                                subscription = state.realtime.clone().subscribe(next);

                                let hello = ServerMessage::Subscribed {
                                    channel: subscription.channel(),
                                    post_id: next,
                                };
                                if !send_json(&mut sender, &hello).await {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring unrecognized socket message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }
    // The subscription drops here and tears itself down.
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage<'_>) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode realtime message");
            return false;
        }
    };

    sender.send(Message::Text(payload.into())).await.is_ok()
}
