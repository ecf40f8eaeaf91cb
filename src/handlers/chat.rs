// src/handlers/chat.rs
use crate::agent::dispatcher::{DispatchError, Submission};
use crate::agent::projection::ui_state_from_chat;
use crate::agent::render::{Renderable, UiSink, UiUpdate};
use crate::error::AppError;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Claims;
use crate::models::chat::AiState;
use crate::persistence::ChatStore;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query,
    },
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// UI updates buffered per connection before the dispatcher waits on the socket.
const UI_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Submit {
        content: String,
    },
    ConfirmPurchase {
        symbol: String,
        price: f64,
        amount: f64,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Ui(UiUpdate),
    Message { id: String, display: Renderable },
    Error { message: String },
}

#[derive(Deserialize)]
struct WebSocketQuery {
    chat: Option<String>,
}

pub fn chat_routes() -> Router {
    let protected_routes = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/:id", get(get_chat))
        .layer(axum::middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_chats(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chats = state.store.list_chats(&claims.sub).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "chats": chats
    })))
}

async fn get_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let chat = state
        .store
        .get_chat(&chat_id, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("Chat"))?;

    let ui_state = ui_state_from_chat(&chat);
    Ok(Json(serde_json::json!({
        "success": true,
        "chat": chat,
        "uiState": ui_state
    })))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketQuery>,
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let chat_id = params.chat.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = ChatSession::open(state.store.clone(), claims.sub, chat_id).await?;
    Ok(ws.on_upgrade(move |socket| websocket(socket, state, session)))
}

/// Resumes the caller's stored chat, or starts an empty one under an unused id.
async fn load_state(
    store: &dyn ChatStore,
    user_id: &str,
    chat_id: &str,
) -> Result<AiState, AppError> {
    if let Some(chat) = store.get_chat(chat_id, user_id).await? {
        return Ok(chat.into());
    }
    if store.chat_owner(chat_id).await?.is_some() {
        tracing::warn!("User {} asked for chat {} owned by someone else", user_id, chat_id);
        return Err(AppError::NotFound("Chat"));
    }
    Ok(AiState::new(chat_id))
}

/// Request state of one connection. The state is held while idle and handed
/// to the in-flight request otherwise.
struct ChatSession {
    store: Arc<dyn ChatStore>,
    user_id: String,
    chat_id: String,
    idle: Option<AiState>,
}

impl ChatSession {
    async fn open(
        store: Arc<dyn ChatStore>,
        user_id: String,
        chat_id: String,
    ) -> Result<Self, AppError> {
        let state = load_state(store.as_ref(), &user_id, &chat_id).await?;
        Ok(Self {
            store,
            user_id,
            chat_id,
            idle: Some(state),
        })
    }

    /// `None` while a request is already in flight.
    fn begin(&mut self) -> Option<AiState> {
        self.idle.take()
    }

    /// Takes back the state after a request. A failed request reloads the
    /// stored log; if that also fails the session stays busy.
    async fn finish(
        &mut self,
        result: Result<Submission, DispatchError>,
    ) -> Result<ServerFrame, AppError> {
        match result {
            Ok(submission) => {
                self.idle = Some(submission.state);
                Ok(ServerFrame::Message {
                    id: submission.id,
                    display: submission.display,
                })
            }
            Err(e) => {
                tracing::error!("❌ Request failed in chat {}: {}", self.chat_id, e);
                let state = load_state(self.store.as_ref(), &self.user_id, &self.chat_id).await?;
                self.idle = Some(state);
                Ok(ServerFrame::Error {
                    message: "Something went wrong, please try again.".to_string(),
                })
            }
        }
    }
}

async fn send_frame<S>(sender: &mut S, frame: &ServerFrame) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json_str) => sender.send(Message::Text(json_str)).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            true
        }
    }
}

async fn websocket(stream: WebSocket, state: Arc<AppState>, mut session: ChatSession) {
    let (mut sender, mut receiver) = stream.split();
    tracing::info!("🔌 Chat connection opened: {}", session.chat_id);

    let (ui_tx, mut ui_rx) = mpsc::channel::<UiUpdate>(UI_BUFFER);
    let (done_tx, mut done_rx) = mpsc::channel::<Result<Submission, DispatchError>>(1);

    loop {
        tokio::select! {
            biased;

            Some(update) = ui_rx.recv() => {
                if !send_frame(&mut sender, &ServerFrame::Ui(update)).await {
                    tracing::warn!("Failed to send UI update, closing connection");
                    break;
                }
            }

            Some(result) = done_rx.recv() => {
                match session.finish(result).await {
                    Ok(frame) => {
                        if !send_frame(&mut sender, &frame).await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to reload chat {}: {}", session.chat_id, e);
                        let error = ServerFrame::Error {
                            message: "Chat could not be reloaded".to_string(),
                        };
                        send_frame(&mut sender, &error).await;
                        break;
                    }
                }
            }

            incoming = receiver.next() => {
                let Some(Ok(message)) = incoming else {
                    break;
                };
                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!("Rejected client frame: {}", e);
                        let error = ServerFrame::Error {
                            message: format!("Invalid message: {}", e),
                        };
                        if !send_frame(&mut sender, &error).await {
                            break;
                        }
                        continue;
                    }
                };

                let Some(current) = session.begin() else {
                    let error = ServerFrame::Error {
                        message: "A request is already in progress".to_string(),
                    };
                    if !send_frame(&mut sender, &error).await {
                        break;
                    }
                    continue;
                };

                let dispatcher = state.dispatcher.clone();
                let ui = UiSink::new(ui_tx.clone());
                let done = done_tx.clone();
                let user_id = session.user_id.clone();

                tokio::spawn(async move {
                    let result = match frame {
                        ClientFrame::Submit { content } => {
                            dispatcher.submit_user_message(&user_id, current, &content, &ui).await
                        }
                        ClientFrame::ConfirmPurchase { symbol, price, amount } => {
                            dispatcher
                                .confirm_purchase(&user_id, current, &symbol, price, amount, &ui)
                                .await
                        }
                    };
                    if done.send(result).await.is_err() {
                        tracing::debug!("Connection closed before the request finished");
                    }
                });
            }
        }
    }

    tracing::info!("🔌 Chat connection closed: {}", session.chat_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::model::ModelError;
    use crate::models::chat::{Chat, ChatSummary, Turn};
    use crate::persistence::{MemoryChatStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose reads can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryChatStore,
        fail_reads: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChatStore for FlakyStore {
        async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError> {
            self.inner.save_chat(chat).await
        }

        async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, StoreError> {
            self.check()?;
            self.inner.get_chat(id, user_id).await
        }

        async fn chat_owner(&self, id: &str) -> Result<Option<String>, StoreError> {
            self.check()?;
            self.inner.chat_owner(id).await
        }

        async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, StoreError> {
            self.check()?;
            self.inner.list_chats(user_id).await
        }
    }

    async fn stored_chat(store: &dyn ChatStore, id: &str, user: &str, turns: usize) -> AiState {
        let mut state = AiState::new(id);
        for i in 0..turns {
            state.append(Turn::user(format!("message {}", i)));
        }
        store.save_chat(&Chat::from_state(&state, user, Utc::now())).await.unwrap();
        state
    }

    fn failed_request() -> Result<Submission, DispatchError> {
        Err(DispatchError::Model(ModelError::Stream("connection reset".into())))
    }

    #[tokio::test]
    async fn test_load_state_resumes_or_starts_new() {
        let store = MemoryChatStore::new();
        stored_chat(&store, "c1", "alice", 3).await;

        let resumed = load_state(&store, "alice", "c1").await.unwrap();
        assert_eq!(resumed.chat_id(), "c1");
        assert_eq!(resumed.messages().len(), 3);

        let fresh = load_state(&store, "alice", "c2").await.unwrap();
        assert_eq!(fresh.chat_id(), "c2");
        assert!(fresh.messages().is_empty());
    }

    #[tokio::test]
    async fn test_load_state_refuses_other_users_chat() {
        let store = MemoryChatStore::new();
        stored_chat(&store, "c1", "alice", 2).await;

        let err = load_state(&store, "bob", "c1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Chat")));
        assert_eq!(store.get_chat("c1", "alice").await.unwrap().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_load_state_propagates_store_errors() {
        let store = FlakyStore::default();
        stored_chat(&store, "c1", "alice", 6).await;
        store.fail_reads.store(true, Ordering::SeqCst);

        let err = load_state(&store, "alice", "c1").await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn test_session_rejects_second_request_while_busy() {
        let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
        let mut session = ChatSession::open(store, "alice".into(), "c1".into()).await.unwrap();

        let mut state = session.begin().expect("idle session hands out its state");
        assert!(session.begin().is_none());

        state.append(Turn::user("hello"));
        state.append(Turn::assistant("hi"));
        let frame = session
            .finish(Ok(Submission {
                state,
                id: "m1".into(),
                display: Renderable::BotMessage("hi".into()),
            }))
            .await
            .unwrap();
        assert!(matches!(frame, ServerFrame::Message { ref id, .. } if id == "m1"));

        let next = session.begin().unwrap();
        assert_eq!(next.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_session_reloads_stored_log_after_failure() {
        let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
        stored_chat(store.as_ref(), "c1", "alice", 4).await;
        let mut session = ChatSession::open(store, "alice".into(), "c1".into()).await.unwrap();

        let mut in_flight = session.begin().unwrap();
        in_flight.append(Turn::user("never committed"));

        let frame = session.finish(failed_request()).await.unwrap();
        assert!(matches!(frame, ServerFrame::Error { .. }));
        assert_eq!(session.begin().unwrap().messages().len(), 4);
    }

    #[tokio::test]
    async fn test_session_stays_busy_when_reload_fails() {
        let store = Arc::new(FlakyStore::default());
        stored_chat(store.as_ref(), "c1", "alice", 6).await;
        let mut session =
            ChatSession::open(store.clone(), "alice".into(), "c1".into()).await.unwrap();

        session.begin().unwrap();
        store.fail_reads.store(true, Ordering::SeqCst);

        assert!(session.finish(failed_request()).await.is_err());
        assert!(session.begin().is_none());
        assert_eq!(store.inner.get_chat("c1", "alice").await.unwrap().unwrap().messages.len(), 6);
    }

    #[test]
    fn test_client_frames_parse() {
        let raw = r#"{"type":"submit","content":"list projects"}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(frame, ClientFrame::Submit { content } if content == "list projects"));

        let raw = r#"{"type":"confirm_purchase","symbol":"DOGE","price":0.1,"amount":5}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(frame, ClientFrame::ConfirmPurchase { amount, .. } if amount == 5.0));

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"delete"}"#).is_err());
    }

    #[test]
    fn test_server_frames_wire_shape() {
        let frame = ServerFrame::Ui(UiUpdate {
            id: "s1".into(),
            display: Renderable::Spinner,
            done: false,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "ui");
        assert_eq!(value["id"], "s1");
        assert_eq!(value["display"]["kind"], "spinner");
        assert_eq!(value["done"], false);

        let value = serde_json::to_value(ServerFrame::Error { message: "nope".into() }).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "error", "message": "nope" }));
    }
}
