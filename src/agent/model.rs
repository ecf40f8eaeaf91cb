// src/agent/model.rs
use crate::claude_client::ClaudeTool;
use crate::models::chat::{Role, ToolPart, Turn, TurnContent};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("model stream error: {0}")]
    Stream(String),
    #[error("malformed model output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One message in the model's wire conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: Vec<ModelBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ClaudeTool>,
}

/// What the model decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCall { id: String, name: String, input: Value },
}

/// A hosted language model with function calling.
///
/// Text deltas are pushed into `deltas` while the reply streams; the returned
/// reply carries the complete text or the single selected tool call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn stream_reply(
        &self,
        request: &ModelRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<ModelReply, ModelError>;
}

/// Maps the turn log into the model conversation. System turns are left out;
/// adjacent turns that land on the same wire role are merged.
pub fn to_model_messages(turns: &[Turn]) -> Vec<ModelMessage> {
    let mut messages: Vec<ModelMessage> = Vec::new();

    for turn in turns {
        let (role, blocks) = match (&turn.role, &turn.content) {
            (Role::System, _) => continue,
            (Role::User, TurnContent::Text(text)) => {
                ("user", vec![ModelBlock::Text { text: text.clone() }])
            }
            (Role::Assistant, TurnContent::Text(text)) => {
                if text.is_empty() {
                    continue;
                }
                ("assistant", vec![ModelBlock::Text { text: text.clone() }])
            }
            (_, TurnContent::Parts(parts)) => {
                let blocks: Vec<ModelBlock> = parts.iter().map(part_block).collect();
                let role = if turn.role == Role::Assistant { "assistant" } else { "user" };
                (role, blocks)
            }
            (Role::Tool, TurnContent::Text(text)) => {
                ("user", vec![ModelBlock::Text { text: text.clone() }])
            }
        };

        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(ModelMessage {
                role: role.to_string(),
                content: blocks,
            }),
        }
    }

    messages
}

fn part_block(part: &ToolPart) -> ModelBlock {
    match part {
        ToolPart::ToolCall { tool_name, tool_call_id, args } => ModelBlock::ToolUse {
            id: tool_call_id.clone(),
            name: tool_name.clone(),
            input: args.clone(),
        },
        ToolPart::ToolResult { tool_call_id, result, .. } => ModelBlock::ToolResult {
            tool_use_id: tool_call_id.clone(),
            content: result.to_string(),
        },
    }
}
