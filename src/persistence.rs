// src/persistence.rs
//
// Chat storage. Every commit is an upsert keyed by chat id: the last writer
// wins and there is no locking, so two concurrent submissions on one chat can
// lose each other's turns.
use crate::models::chat::{Chat, ChatSummary, Turn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("chat {0} belongs to another user")]
    NotOwner(String),
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Fails with `NotOwner` when the id is already taken by another user.
    async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError>;
    /// Returns `None` when the chat does not exist or belongs to someone else.
    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, StoreError>;
    async fn chat_owner(&self, id: &str) -> Result<Option<String>, StoreError>;
    /// Newest first.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, StoreError>;
}

pub async fn create_pool(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations completed successfully");

    Ok(pool)
}

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type ChatRow = (String, String, String, String, Json<Vec<Turn>>, DateTime<Utc>);

#[async_trait]
impl ChatStore for PgChatStore {
    async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        // created_at is kept from the first commit
        let result = sqlx::query(
            "INSERT INTO chats (id, user_id, title, path, messages, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (id) DO UPDATE
             SET title = EXCLUDED.title,
                 path = EXCLUDED.path,
                 messages = EXCLUDED.messages,
                 updated_at = NOW()
             WHERE chats.user_id = EXCLUDED.user_id",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(&chat.path)
        .bind(Json(&chat.messages))
        .bind(chat.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                chat_id = %chat.id,
                user_id = %chat.user_id,
                "Chat id owned by another user"
            );
            return Err(StoreError::NotOwner(chat.id.clone()));
        }

        tracing::debug!(chat_id = %chat.id, turns = chat.messages.len(), "Saved chat");
        Ok(())
    }

    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, StoreError> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT id, user_id, title, path, messages, created_at
             FROM chats
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, user_id, title, path, messages, created_at)| Chat {
            id,
            user_id,
            created_at,
            title,
            path,
            messages: messages.0,
        }))
    }

    async fn chat_owner(&self, id: &str) -> Result<Option<String>, StoreError> {
        let owner = sqlx::query_scalar::<_, String>("SELECT user_id FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT id, title, path, created_at
             FROM chats
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, path, created_at)| ChatSummary {
                id,
                title,
                path,
                created_at,
            })
            .collect())
    }
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryChatStore {
    chats: RwLock<HashMap<String, Chat>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let mut chats = self.chats.write().await;
        let mut saved = chat.clone();
        if let Some(existing) = chats.get(&chat.id) {
            if existing.user_id != chat.user_id {
                return Err(StoreError::NotOwner(chat.id.clone()));
            }
            saved.created_at = existing.created_at;
        }
        chats.insert(saved.id.clone(), saved);
        Ok(())
    }

    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, StoreError> {
        let chats = self.chats.read().await;
        Ok(chats.get(id).filter(|chat| chat.user_id == user_id).cloned())
    }

    async fn chat_owner(&self, id: &str) -> Result<Option<String>, StoreError> {
        let chats = self.chats.read().await;
        Ok(chats.get(id).map(|chat| chat.user_id.clone()))
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, StoreError> {
        let chats = self.chats.read().await;
        let mut summaries: Vec<ChatSummary> = chats
            .values()
            .filter(|chat| chat.user_id == user_id)
            .map(ChatSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::AiState;
    use chrono::Duration as ChronoDuration;

    fn chat(id: &str, user: &str, first: &str, created_at: DateTime<Utc>) -> Chat {
        let mut state = AiState::new(id);
        state.append(Turn::user(first));
        Chat::from_state(&state, user, created_at)
    }

    #[tokio::test]
    async fn test_memory_store_is_scoped_to_owner() {
        let store = MemoryChatStore::new();
        store.save_chat(&chat("c1", "alice", "hello", Utc::now())).await.unwrap();

        assert!(store.get_chat("c1", "alice").await.unwrap().is_some());
        assert!(store.get_chat("c1", "bob").await.unwrap().is_none());
        assert!(store.get_chat("missing", "alice").await.unwrap().is_none());
        assert!(store.list_chats("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_upsert_keeps_created_at() {
        let store = MemoryChatStore::new();
        let first = Utc::now() - ChronoDuration::minutes(5);
        store.save_chat(&chat("c1", "alice", "hello", first)).await.unwrap();

        let mut state: AiState = store.get_chat("c1", "alice").await.unwrap().unwrap().into();
        state.append(Turn::assistant("hi"));
        store.save_chat(&Chat::from_state(&state, "alice", Utc::now())).await.unwrap();

        let saved = store.get_chat("c1", "alice").await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.created_at, first);
        assert_eq!(saved.title, "hello");
    }

    #[tokio::test]
    async fn test_memory_store_refuses_other_users_chat_id() {
        let store = MemoryChatStore::new();
        store.save_chat(&chat("c1", "alice", "hello", Utc::now())).await.unwrap();

        let err = store.save_chat(&chat("c1", "bob", "mine now", Utc::now())).await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner(id) if id == "c1"));

        let kept = store.get_chat("c1", "alice").await.unwrap().unwrap();
        assert_eq!(kept.title, "hello");
        assert_eq!(store.chat_owner("c1").await.unwrap().as_deref(), Some("alice"));
        assert!(store.chat_owner("missing").await.unwrap().is_none());
        assert!(store.list_chats("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_lists_newest_first() {
        let store = MemoryChatStore::new();
        let now = Utc::now();
        let hour_ago = now - ChronoDuration::hours(1);
        store.save_chat(&chat("old", "alice", "first", hour_ago)).await.unwrap();
        store.save_chat(&chat("new", "alice", "second", now)).await.unwrap();

        let chats = store.list_chats("alice").await.unwrap();
        let ids: Vec<String> = chats.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
