// src/agent/render.rs
//
// Renderables are the typed UI fragments the service streams to the client.
// They are pushed through a bounded channel; the consumer keeps only the most
// recent update per slot.
use crate::models::deployment::{DeploymentSummary, DomainSummary, ProjectDetail, ProjectSummary};
use crate::models::stocks::{PurchaseOffer, Stock, StockEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonKind {
    Projects,
    Project,
    Deployments,
    Domains,
    Stocks,
    Stock,
    Events,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "props", rename_all = "snake_case")]
pub enum Renderable {
    Spinner,
    UserMessage(String),
    BotMessage(String),
    SystemMessage(String),
    Skeleton(SkeletonKind),
    Projects(Vec<ProjectSummary>),
    Project(ProjectDetail),
    Deployments(Vec<DeploymentSummary>),
    Domains(Vec<DomainSummary>),
    Stocks(Vec<Stock>),
    Stock(Stock),
    Purchase(PurchaseOffer),
    Events(Vec<StockEvent>),
    Purchasing { message: String, pending: bool },
    Error(String),
}

/// One update of a renderable slot. `done` marks the final value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiUpdate {
    pub id: String,
    pub display: Renderable,
    pub done: bool,
}

/// Producer side of the UI channel for one request.
#[derive(Debug, Clone)]
pub struct UiSink {
    tx: Option<mpsc::Sender<UiUpdate>>,
}

impl UiSink {
    pub fn new(tx: mpsc::Sender<UiUpdate>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink nobody listens to, for callers that only want the final result.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn slot(&self) -> UiSlot {
        UiSlot {
            id: uuid::Uuid::new_v4().to_string(),
            sink: self.clone(),
        }
    }

    async fn push(&self, update: UiUpdate) {
        if let Some(tx) = &self.tx {
            if tx.send(update).await.is_err() {
                tracing::debug!("UI consumer went away, dropping update");
            }
        }
    }
}

/// A single renderable that can be updated until it is finished.
#[derive(Debug)]
pub struct UiSlot {
    id: String,
    sink: UiSink,
}

impl UiSlot {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn update(&self, display: Renderable) {
        self.sink
            .push(UiUpdate {
                id: self.id.clone(),
                display,
                done: false,
            })
            .await;
    }

    /// Sends the final value; the slot cannot be updated afterwards.
    pub async fn done(self, display: Renderable) -> String {
        self.sink
            .push(UiUpdate {
                id: self.id.clone(),
                display,
                done: true,
            })
            .await;
        self.id
    }
}
