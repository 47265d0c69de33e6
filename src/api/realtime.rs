//! Websocket endpoint for room subscriptions.
//!
//! Clients send `join-conversation` / `leave-conversation` frames and receive the
//! `ai-typing` and `new-message` events of the rooms they joined.

use crate::api::error::ApiError;
use crate::api::{ValidatedQuery, user_from_token};
use crate::core::realtime::ClientCommand;
use crate::core::traits::RealtimeNotifier;
use crate::infrastructure::config::AppConfig;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use di::Ref;
use di_axum::Inject;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
pub struct WsAuthQuery {
    token: Option<String>,
}

pub async fn ws_upgrade(
    Inject(notifier): Inject<dyn RealtimeNotifier>,
    Inject(config): Inject<AppConfig>,
    ValidatedQuery(query): ValidatedQuery<WsAuthQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("authentication token required".to_owned()))?;
    let user_id = user_from_token(&token, &config.jwt_secret)?;
    let ws = ws.ok_or_else(|| ApiError::BadRequest("websocket upgrade expected".to_owned()))?;

    info!("websocket upgrade accepted for {user_id}");
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, notifier)))
}

/// Applies a client frame to the hub. Returns the parsed command, `None` if the frame is not one.
pub fn apply_frame(
    notifier: &dyn RealtimeNotifier,
    subscriber_id: u64,
    frame: &str,
) -> Option<ClientCommand> {
    let command = match serde_json::from_str::<ClientCommand>(frame) {
        Ok(command) => command,
        Err(e) => {
            debug!("ignoring frame from subscriber {subscriber_id}: {e}");
            return None;
        }
    };

    match &command {
        ClientCommand::JoinConversation { conversation_id } => {
            notifier.join(subscriber_id, *conversation_id);
            debug!("subscriber {subscriber_id} joined {conversation_id}");
        }
        ClientCommand::LeaveConversation { conversation_id } => {
            notifier.leave(subscriber_id, *conversation_id);
            debug!("subscriber {subscriber_id} left {conversation_id}");
        }
    }
    Some(command)
}

async fn handle_ws(socket: WebSocket, notifier: Ref<dyn RealtimeNotifier>) {
    let subscription = notifier.connect();
    let subscriber_id = subscription.id;
    let (mut sink, mut stream) = socket.split();

    // forwards room events until the hub drops the subscriber
    let sender_handle = tokio::spawn(async move {
        let mut events = subscription.events;
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                apply_frame(&*notifier, subscriber_id, &text);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    notifier.disconnect(subscriber_id);
    let _ = sender_handle.await;
    info!("websocket subscriber {subscriber_id} disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::{RealtimeEvent, RoomHub};
    use uuid::Uuid;

    #[test]
    fn test_join_and_leave_frames() {
        let hub = RoomHub::create();
        let mut subscription = hub.connect();
        let room = Uuid::new_v4();

        let joined = apply_frame(
            &hub,
            subscription.id,
            &format!(r#"{{"event":"join-conversation","conversationId":"{room}"}}"#),
        );
        assert!(matches!(joined, Some(ClientCommand::JoinConversation { .. })));

        let event = RealtimeEvent::AiTyping {
            conversation_id: room,
            is_typing: true,
        };
        assert_eq!(hub.publish(room, event.clone()), 1);
        assert_eq!(subscription.events.try_recv().unwrap(), event);

        apply_frame(
            &hub,
            subscription.id,
            &format!(r#"{{"event":"leave-conversation","conversationId":"{room}"}}"#),
        );
        assert_eq!(hub.room_size(room), 0);
    }

    #[test]
    fn test_unknown_frames_are_ignored() {
        let hub = RoomHub::create();
        let subscription = hub.connect();
        assert!(apply_frame(&hub, subscription.id, "hello").is_none());
        assert!(apply_frame(&hub, subscription.id, r#"{"event":"join-conversation"}"#).is_none());
    }
}
