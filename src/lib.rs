// lib.rs - Chat-driven deployment dashboard service
pub mod agent;
pub mod claude_client;
pub mod config;
pub mod deploy_client;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod persistence;

use agent::dispatcher::Dispatcher;
use persistence::ChatStore;
use std::sync::Arc;

/// Shared state handed to every route through an `Extension` layer.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn ChatStore>,
    pub jwt_secret: String,
}
