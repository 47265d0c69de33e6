//! Tests for the chat exchange: persistence, context window, fallbacks and room events

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{
    EchoGateway, OfflineGateway, QuotaGateway, call, cleanup_test_db, count_messages,
    create_test_app, create_test_app_with, insert_conversation, insert_message, insert_prompt,
    last_request, setup_test_db,
};
use conversation_analytics_api::core::assistant::TurnRole;
use conversation_analytics_api::core::exchange::ConversationLocks;
use conversation_analytics_api::core::realtime::RealtimeEvent;
use conversation_analytics_api::core::traits::{MessageService, RealtimeNotifier};
use conversation_analytics_api::infrastructure::entities::{ConversationStatus, MessageRole};
use di::Injectable;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn test_send_message_persists_both_sides() {
    let pool = setup_test_db().await;
    let app = create_test_app();
    let user = Uuid::new_v4();
    let prompt_id = insert_prompt(&pool, "soporte", true, false).await;
    let conversation_id = insert_conversation(
        &pool,
        user,
        ConversationStatus::Open,
        None,
        Utc::now(),
        Some(prompt_id),
    )
    .await;

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({
            "conversationId": conversation_id,
            "message": "¿Cómo reseteo mi contraseña?",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["userMessage"]["role"], "USER");
    assert_eq!(
        json["userMessage"]["content"],
        "¿Cómo reseteo mi contraseña?"
    );
    assert!(json["userMessage"]["responseTime"].is_null());
    assert_eq!(json["aiMessage"]["role"], "AI");
    assert_eq!(
        json["aiMessage"]["content"],
        "echo: ¿Cómo reseteo mi contraseña?"
    );
    assert!(json["aiMessage"]["responseTime"].as_i64().unwrap() >= 0);
    assert_eq!(json["aiMessage"]["promptId"], prompt_id.to_string());

    let (_, messages) = call(
        &app,
        Method::GET,
        &format!("/api/messages/conversation/{conversation_id}"),
        Some(user),
        None,
    )
    .await;
    let roles: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["USER", "AI"]);
    assert_eq!(messages[1]["prompt"]["name"], "soporte");

    let request = last_request().unwrap();
    assert_eq!(request.instruction, "You are the soporte assistant.");
    assert!(request.history.is_empty());

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_send_message_to_closed_conversation() {
    let pool = setup_test_db().await;
    let app = create_test_app();
    let user = Uuid::new_v4();
    let conversation_id = insert_conversation(
        &pool,
        user,
        ConversationStatus::Closed,
        None,
        Utc::now(),
        None,
    )
    .await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "hola" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(count_messages(&pool, conversation_id).await, 0);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_send_message_to_foreign_conversation() {
    let pool = setup_test_db().await;
    let app = create_test_app();
    let conversation_id = insert_conversation(
        &pool,
        Uuid::new_v4(),
        ConversationStatus::Open,
        None,
        Utc::now(),
        None,
    )
    .await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(Uuid::new_v4()),
        Some(json!({ "conversationId": conversation_id, "message": "hola" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(count_messages(&pool, conversation_id).await, 0);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_send_message_validation() {
    let pool = setup_test_db().await;
    let app = create_test_app();
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "message": "hola" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": Uuid::new_v4(), "message": "hola" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(count_messages(&pool, conversation_id).await, 0);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_context_window_is_last_ten_messages() {
    let pool = setup_test_db().await;
    let app = create_test_app();
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let base = Utc::now() - Duration::hours(1);
    for i in 0..14 {
        let role = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Ai
        };
        insert_message(
            &pool,
            conversation_id,
            role,
            &format!("turn {i}"),
            base + Duration::seconds(i),
        )
        .await;
    }

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "nuevo" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = last_request().unwrap();
    assert_eq!(request.message, "nuevo");
    let texts: Vec<&str> = request.history.iter().map(|t| t.text.as_str()).collect();
    let expected: Vec<String> = (4..14).map(|i| format!("turn {i}")).collect();
    assert_eq!(texts, expected);
    assert_eq!(request.history[0].role, TurnRole::User);
    assert_eq!(request.history[1].role, TurnRole::Model);

    // no prompt on the conversation, so the built-in instruction is used
    assert!(!request.instruction.is_empty());

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_gateway_failure_becomes_reply() {
    let pool = setup_test_db().await;
    let (app, _provider) = create_test_app_with(QuotaGateway::singleton());
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "hola" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["aiMessage"]["content"],
        "Lo siento, se ha excedido el límite de uso de la API. Por favor, intenta más tarde."
    );
    assert_eq!(count_messages(&pool, conversation_id).await, 2);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_unconfigured_gateway_simulates_reply() {
    let pool = setup_test_db().await;
    let (app, _provider) = create_test_app_with(OfflineGateway::singleton());
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "hola" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let content = json["aiMessage"]["content"].as_str().unwrap();
    assert!(content.starts_with("[Gemini AI no configurado]"));
    assert!(content.contains("\"hola\""));

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_direct_message_waits_for_conversation_lock() {
    let pool = setup_test_db().await;
    let (_app, provider) = create_test_app_with(EchoGateway::singleton());
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let locks = provider.get_required::<ConversationLocks>();
    let messages = provider.get_required::<dyn MessageService>();

    let guard = locks.acquire(conversation_id).await;
    let pending = tokio::spawn(async move {
        messages
            .create_message(user, conversation_id, MessageRole::User, "hola".to_owned())
            .await
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!pending.is_finished());
    assert_eq!(count_messages(&pool, conversation_id).await, 0);

    drop(guard);
    let message = pending.await.unwrap().unwrap();
    assert_eq!(message.conversation_id, conversation_id);
    assert_eq!(count_messages(&pool, conversation_id).await, 1);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_room_receives_typing_then_message() {
    let pool = setup_test_db().await;
    let (app, provider) = create_test_app_with(EchoGateway::singleton());
    let user = Uuid::new_v4();
    let conversation_id =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;
    let other_room =
        insert_conversation(&pool, user, ConversationStatus::Open, None, Utc::now(), None).await;

    let notifier = provider.get_required::<dyn RealtimeNotifier>();
    let mut watcher = notifier.connect();
    notifier.join(watcher.id, conversation_id);
    let mut bystander = notifier.connect();
    notifier.join(bystander.id, other_room);

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(user),
        Some(json!({ "conversationId": conversation_id, "message": "hola" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        watcher.events.try_recv().unwrap(),
        RealtimeEvent::AiTyping {
            conversation_id,
            is_typing: true,
        }
    );
    assert_eq!(
        watcher.events.try_recv().unwrap(),
        RealtimeEvent::AiTyping {
            conversation_id,
            is_typing: false,
        }
    );
    match watcher.events.try_recv().unwrap() {
        RealtimeEvent::NewMessage { message } => {
            assert_eq!(message.role, MessageRole::Ai);
            assert_eq!(message.id.to_string(), json["aiMessage"]["id"]);
        }
        other => panic!("expected new-message, got {other:?}"),
    }
    assert!(watcher.events.try_recv().is_err());
    assert!(bystander.events.try_recv().is_err());

    notifier.disconnect(watcher.id);
    notifier.disconnect(bystander.id);

    cleanup_test_db();
}

#[tokio::test]
#[serial]
async fn test_event_wire_format() {
    let message_id = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();

    let typing = serde_json::to_value(RealtimeEvent::AiTyping {
        conversation_id,
        is_typing: true,
    })
    .unwrap();
    assert_eq!(
        typing,
        json!({
            "event": "ai-typing",
            "data": { "conversationId": conversation_id, "isTyping": true },
        })
    );

    let message = serde_json::to_value(RealtimeEvent::NewMessage {
        message: conversation_analytics_api::infrastructure::entities::Message {
            id: message_id,
            conversation_id,
            role: MessageRole::Ai,
            content: "hola".to_owned(),
            timestamp: Utc::now(),
            response_time: Some(1),
            prompt_id: None,
        },
    })
    .unwrap();
    assert_eq!(message["event"], "new-message");
    assert_eq!(message["data"]["message"]["id"], message_id.to_string());
    assert_eq!(message["data"]["message"]["responseTime"], 1);
}
