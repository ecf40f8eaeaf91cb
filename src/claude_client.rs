use crate::agent::model::{LanguageModel, ModelError, ModelMessage, ModelReply, ModelRequest};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
pub struct ClaudeRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub messages: &'a [ModelMessage],
    pub system: &'a str,
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ClaudeTool],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    pub temperature: f32,
    pub stream: bool,
}

fn no_tools(tools: &&[ClaudeTool]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum ToolChoice {
    #[serde(rename = "auto")]
    Auto,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClaudeTool {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertyDefinition>,
    pub required: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub prop_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertyDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, PropertyDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl PropertyDefinition {
    pub fn scalar(prop_type: &str, description: &str) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.to_string(),
            items: None,
            properties: None,
            required: None,
        }
    }

    pub fn array_of(description: &str, items: PropertyDefinition) -> Self {
        Self {
            prop_type: "array".to_string(),
            description: description.to_string(),
            items: Some(Box::new(items)),
            properties: None,
            required: None,
        }
    }

    pub fn object(
        description: &str,
        properties: HashMap<String, PropertyDefinition>,
        required: &[&str],
    ) -> Self {
        Self {
            prop_type: "object".to_string(),
            description: description.to_string(),
            items: None,
            properties: Some(properties),
            required: Some(required.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Server-sent events of the streaming Messages API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize, content_block: StreamBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: StreamDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: StreamErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct StreamErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[derive(Debug)]
struct PendingToolUse {
    index: usize,
    id: String,
    name: String,
    input_json: String,
}

/// Folds stream events into a single reply.
///
/// The first `tool_use` block wins; text streamed before it is dropped from
/// the reply (it has already been shown as deltas).
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_use: Option<PendingToolUse>,
    extra_tool_uses: usize,
    stopped: bool,
}

impl StreamAccumulator {
    /// Applies one event, returning a text delta to forward, if any.
    pub fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, ModelError> {
        match event {
            StreamEvent::ContentBlockStart { index, content_block } => match content_block {
                StreamBlock::Text { text } if !text.is_empty() => {
                    self.text.push_str(&text);
                    return Ok(Some(text));
                }
                StreamBlock::ToolUse { id, name } => {
                    if self.tool_use.is_some() {
                        self.extra_tool_uses += 1;
                    } else {
                        self.tool_use = Some(PendingToolUse {
                            index,
                            id,
                            name,
                            input_json: String::new(),
                        });
                    }
                }
                _ => {}
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                StreamDelta::Text { text } => {
                    if self.tool_use.is_none() {
                        self.text.push_str(&text);
                        return Ok(Some(text));
                    }
                }
                StreamDelta::InputJson { partial_json } => {
                    if let Some(pending) = self.tool_use.as_mut().filter(|p| p.index == index) {
                        pending.input_json.push_str(&partial_json);
                    }
                }
                StreamDelta::Other => {}
            },
            StreamEvent::MessageStop => self.stopped = true,
            StreamEvent::Error { error } => {
                return Err(ModelError::Stream(format!("{}: {}", error.error_type, error.message)));
            }
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Other => {}
        }
        Ok(None)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn finish(self) -> Result<ModelReply, ModelError> {
        if !self.stopped {
            return Err(ModelError::Stream("stream ended before message_stop".to_string()));
        }
        if self.extra_tool_uses > 0 {
            tracing::warn!(
                "Model selected {} extra tool(s); only the first is run",
                self.extra_tool_uses
            );
        }

        match self.tool_use {
            Some(pending) => {
                let input = if pending.input_json.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&pending.input_json)?
                };
                Ok(ModelReply::ToolCall {
                    id: pending.id,
                    name: pending.name,
                    input,
                })
            }
            None => Ok(ModelReply::Text(self.text)),
        }
    }
}

/// Splits the response body into lines. Bytes of an unfinished line wait for
/// its newline, so a character split across chunks decodes intact.
#[derive(Debug, Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ModelError> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8(raw)
                .map_err(|e| ModelError::Stream(format!("invalid UTF-8 in stream: {}", e)))?;
            lines.push(line.trim().to_string());
        }
        Ok(lines)
    }
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for ClaudeClient {
    async fn stream_reply(
        &self,
        request: &ModelRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<ModelReply, ModelError> {
        // Let Claude decide between answering in text and calling a tool
        let tool_choice = if request.tools.is_empty() { None } else { Some(ToolChoice::Auto) };

        let body = ClaudeRequest {
            model: &self.model,
            max_tokens: 4096,
            messages: &request.messages,
            system: &request.system,
            tools: &request.tools,
            tool_choice,
            temperature: 0.3,
            stream: true,
        };

        tracing::debug!(
            "Claude API Request: {} messages, {} tools",
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Claude API error ({}): {}", status, body);
            return Err(ModelError::Status { status, body });
        }

        let mut accumulator = StreamAccumulator::default();
        let mut stream = response.bytes_stream();
        let mut lines = SseLines::default();

        'read: while let Some(chunk) = stream.next().await {
            for line in lines.push(&chunk?)? {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let event: StreamEvent = serde_json::from_str(data.trim())?;
                if let Some(text) = accumulator.apply(event)? {
                    // A dropped receiver only means nobody is watching the partial text
                    let _ = deltas.send(text).await;
                }
                if accumulator.is_stopped() {
                    break 'read;
                }
            }
        }

        accumulator.finish()
    }
}
