// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of characters kept from the first turn when deriving a chat title.
pub const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// A structured part of an assistant tool-call turn or a tool-result turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolPart {
    #[serde(rename = "tool-call", rename_all = "camelCase")]
    ToolCall {
        tool_name: String,
        tool_call_id: String,
        args: Value,
    },
    #[serde(rename = "tool-result", rename_all = "camelCase")]
    ToolResult {
        tool_name: String,
        tool_call_id: String,
        result: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ToolPart>),
}

/// One entry of the append-only chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    fn new(role: Role, content: TurnContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnContent::Text(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, TurnContent::Text(text.into()))
    }

    pub fn tool_call(tool_name: &str, tool_call_id: &str, args: Value) -> Self {
        Self::new(
            Role::Assistant,
            TurnContent::Parts(vec![ToolPart::ToolCall {
                tool_name: tool_name.to_string(),
                tool_call_id: tool_call_id.to_string(),
                args,
            }]),
        )
    }

    pub fn tool_result(tool_name: &str, tool_call_id: &str, result: Value) -> Self {
        Self::new(
            Role::Tool,
            TurnContent::Parts(vec![ToolPart::ToolResult {
                tool_name: tool_name.to_string(),
                tool_call_id: tool_call_id.to_string(),
                result,
            }]),
        )
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text(text) => Some(text),
            TurnContent::Parts(_) => None,
        }
    }
}

/// The in-flight conversation state: a chat id and its turn log.
///
/// Turns can only be appended. The dispatcher takes this by value and hands
/// back the extended state, so no call site ever shares a mutable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiState {
    chat_id: String,
    messages: Vec<Turn>,
}

impl AiState {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }

    pub fn append(&mut self, turn: Turn) {
        self.messages.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.messages.extend(turns);
    }
}

impl From<Chat> for AiState {
    fn from(chat: Chat) -> Self {
        Self {
            chat_id: chat.id,
            messages: chat.messages,
        }
    }
}

/// A persisted chat owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub path: String,
    pub messages: Vec<Turn>,
}

impl Chat {
    /// Builds the record committed for `state`. The title comes from the first
    /// turn's text.
    pub fn from_state(state: &AiState, user_id: &str, created_at: DateTime<Utc>) -> Self {
        let title = state
            .messages()
            .first()
            .and_then(Turn::text)
            .map(derive_title)
            .unwrap_or_default();

        Self {
            id: state.chat_id().to_string(),
            user_id: user_id.to_string(),
            created_at,
            title,
            path: format!("/chat/{}", state.chat_id()),
            messages: state.messages().to_vec(),
        }
    }
}

pub fn derive_title(first_message: &str) -> String {
    first_message.chars().take(TITLE_MAX_CHARS).collect()
}

/// Listing entry for a user's chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            path: chat.path.clone(),
            created_at: chat.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_title_truncated_to_100_chars() {
        let mut state = AiState::new("c1");
        state.append(Turn::user("x".repeat(250)));
        state.append(Turn::assistant("reply"));

        let chat = Chat::from_state(&state, "u1", Utc::now());
        assert_eq!(chat.title.chars().count(), 100);
        assert_eq!(chat.path, "/chat/c1");
        assert_eq!(chat.messages.len(), 2);
    }

    #[test]
    fn test_short_title_kept_whole_and_multibyte_safe() {
        assert_eq!(derive_title("list my projects"), "list my projects");
        let accented = "é".repeat(150);
        assert_eq!(derive_title(&accented), "é".repeat(100));
    }

    #[test]
    fn test_append_keeps_prior_turns() {
        let mut state = AiState::new("c1");
        state.append(Turn::user("hello"));
        let before = state.messages().to_vec();

        state.append(Turn::assistant("hi"));
        state.extend(vec![Turn::system("[note]")]);

        assert_eq!(&state.messages()[..1], before.as_slice());
        assert_eq!(state.messages().len(), 3);
    }

    #[test]
    fn test_tool_parts_wire_shape() {
        let turn = Turn::tool_result("listStocks", "call-1", json!([{ "symbol": "DOGE" }]));
        let value = serde_json::to_value(&turn).unwrap();

        assert_eq!(value["role"], "tool");
        assert_eq!(value["content"][0]["type"], "tool-result");
        assert_eq!(value["content"][0]["toolName"], "listStocks");
        assert_eq!(value["content"][0]["toolCallId"], "call-1");

        let back: Turn = serde_json::from_value(value).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn test_text_content_is_plain_string() {
        let value = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(value["content"], "hi");
    }
}
