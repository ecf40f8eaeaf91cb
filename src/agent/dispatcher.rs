// src/agent/dispatcher.rs
//
// Drives one user submission: append the user turn, ask the model, run the
// selected capability, append the resulting turns and commit the chat.
use crate::agent::capabilities::{self, CapabilityError, SYSTEM_PROMPT};
use crate::agent::handlers::{self, HandlerContext};
use crate::agent::model::{to_model_messages, LanguageModel, ModelError, ModelReply, ModelRequest};
use crate::agent::render::{Renderable, UiSink, UiSlot};
use crate::deploy_client::DeploymentApi;
use crate::models::chat::{AiState, Chat, Turn};
use crate::persistence::{ChatStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Text deltas buffered between the model stream and the UI.
const DELTA_BUFFER: usize = 64;

/// Final value of a slot whose request failed.
const REQUEST_FAILED: &str = "Something went wrong";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("failed to save chat: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub hidden_project_substring: String,
    pub step_delay: Duration,
}

/// The outcome of one request: the extended state plus the final renderable
/// of the slot that answered it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub state: AiState,
    pub id: String,
    pub display: Renderable,
}

pub struct Dispatcher {
    model: Arc<dyn LanguageModel>,
    platform: Arc<dyn DeploymentApi>,
    store: Arc<dyn ChatStore>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        platform: Arc<dyn DeploymentApi>,
        store: Arc<dyn ChatStore>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            model,
            platform,
            store,
            settings,
        }
    }

    pub async fn submit_user_message(
        &self,
        user_id: &str,
        mut state: AiState,
        content: &str,
        ui: &UiSink,
    ) -> Result<Submission, DispatchError> {
        state.append(Turn::user(content));
        info!(
            chat_id = %state.chat_id(),
            turns = state.messages().len(),
            "📨 User message received"
        );

        let slot = ui.slot();
        slot.update(Renderable::Spinner).await;

        match self.respond(user_id, &mut state, &slot).await {
            Ok(display) => {
                let id = slot.done(display.clone()).await;
                Ok(Submission { state, id, display })
            }
            Err(e) => {
                slot.done(Renderable::Error(REQUEST_FAILED.to_string())).await;
                Err(e)
            }
        }
    }

    /// Asks the model, runs the selected capability and commits the extended state.
    async fn respond(
        &self,
        user_id: &str,
        state: &mut AiState,
        slot: &UiSlot,
    ) -> Result<Renderable, DispatchError> {
        let request = ModelRequest {
            system: SYSTEM_PROMPT.to_string(),
            messages: to_model_messages(state.messages()),
            tools: capabilities::declarations(),
        };

        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(DELTA_BUFFER);
        let forward = async {
            let mut text = String::new();
            while let Some(delta) = delta_rx.recv().await {
                text.push_str(&delta);
                slot.update(Renderable::BotMessage(text.clone())).await;
            }
        };
        let (reply, ()) = tokio::join!(self.model.stream_reply(&request, delta_tx), forward);

        let display = match reply? {
            ModelReply::Text(text) => {
                debug!(chars = text.len(), "Model answered in text");
                state.append(Turn::assistant(text.clone()));
                Renderable::BotMessage(text)
            }
            ModelReply::ToolCall { id, name, input } => {
                let capability = capabilities::parse(&name, input)?;
                let ctx = HandlerContext {
                    platform: self.platform.as_ref(),
                    hidden_project_substring: &self.settings.hidden_project_substring,
                    step_delay: self.settings.step_delay,
                };
                let output = handlers::run(&capability, &ctx, slot).await;

                state.append(Turn::tool_call(capability.name(), &id, capability.args()));
                state.append(Turn::tool_result(capability.name(), &id, output.result));
                state.extend(output.trailing);
                output.display
            }
        };

        self.commit(user_id, state).await?;
        Ok(display)
    }

    /// Completes a purchase the user confirmed from a purchase card.
    pub async fn confirm_purchase(
        &self,
        user_id: &str,
        mut state: AiState,
        symbol: &str,
        price: f64,
        amount: f64,
        ui: &UiSink,
    ) -> Result<Submission, DispatchError> {
        let slot = ui.slot();
        let step_delay = self.settings.step_delay;
        let outcome = handlers::confirm_purchase(symbol, price, amount, step_delay, &slot).await;

        state.append(outcome.note);
        if let Err(e) = self.commit(user_id, &state).await {
            slot.done(Renderable::Error(REQUEST_FAILED.to_string())).await;
            return Err(e);
        }

        let progress_id = slot.done(outcome.progress.clone()).await;
        let (id, display) = match outcome.message {
            Some(message) => (ui.slot().done(message.clone()).await, message),
            None => (progress_id, outcome.progress),
        };

        Ok(Submission { state, id, display })
    }

    async fn commit(&self, user_id: &str, state: &AiState) -> Result<(), DispatchError> {
        let chat = Chat::from_state(state, user_id, Utc::now());
        self.store.save_chat(&chat).await?;
        info!(chat_id = %chat.id, turns = chat.messages.len(), "💾 Chat committed");
        Ok(())
    }
}
