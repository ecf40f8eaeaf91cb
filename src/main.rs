use axum::{Extension, Router};
use deploy_chat::agent::dispatcher::{DispatchSettings, Dispatcher};
use deploy_chat::claude_client::ClaudeClient;
use deploy_chat::config::Config;
use deploy_chat::deploy_client::DeployClient;
use deploy_chat::persistence::{self, ChatStore, MemoryChatStore, PgChatStore};
use deploy_chat::{handlers, middleware, AppState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = Config::from_env()?;

    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL chat store...");
            let pool = persistence::create_pool(database_url).await?;
            Arc::new(PgChatStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Chats are kept in memory and lost on restart.");
            Arc::new(MemoryChatStore::new())
        }
    };

    let claude_client =
        ClaudeClient::new(config.anthropic_api_key.clone(), config.chat_model.clone());
    tracing::info!("Initializing Claude AI client ({})...", claude_client.model());

    let deploy_client = DeployClient::new(
        config.deploy_api_token.clone(),
        config.deploy_api_base_url.clone(),
        config.deploy_team_id.clone(),
    );
    tracing::info!("Deployment API: {}", config.deploy_api_base_url);

    let dispatcher = Dispatcher::new(
        Arc::new(claude_client),
        Arc::new(deploy_client),
        store.clone(),
        DispatchSettings {
            hidden_project_substring: config.hidden_project_substring.clone(),
            step_delay: config.demo_step_delay,
        },
    );

    let shared_state = Arc::new(AppState {
        dispatcher: Arc::new(dispatcher),
        store,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = Router::new()
        .merge(handlers::chat::chat_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,deploy_chat=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,deploy_chat=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();

    tracing::info!("🚀 deploy_chat starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
