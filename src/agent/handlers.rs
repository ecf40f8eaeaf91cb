// src/agent/handlers.rs
//
// One handler per capability. A handler may push intermediate renderables to
// its slot, then returns the final renderable together with the structured
// result recorded in the turn log.
use crate::agent::capabilities::{Capability, ListDeploymentsArgs, PurchaseArgs};
use crate::agent::render::{Renderable, SkeletonKind, UiSlot};
use crate::deploy_client::{DeploymentApi, PlatformError};
use crate::models::chat::Turn;
use crate::models::deployment::{
    summarize_projects, DeploymentSummary, DomainSummary, ProjectDetail,
};
use crate::models::stocks::{format_usd, is_valid_share_count, PurchaseOffer, PurchaseStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

pub struct HandlerContext<'a> {
    pub platform: &'a dyn DeploymentApi,
    pub hidden_project_substring: &'a str,
    pub step_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub display: Renderable,
    pub result: Value,
    /// Turns appended after the tool-call/tool-result pair.
    pub trailing: Vec<Turn>,
}

impl HandlerOutput {
    fn new<T: Serialize>(display: Renderable, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                display,
                result,
                trailing: Vec::new(),
            },
            Err(e) => Self::failed(format!("could not encode result: {}", e)),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            result: json!({ "error": message }),
            display: Renderable::Error(message),
            trailing: Vec::new(),
        }
    }
}

impl From<PlatformError> for HandlerOutput {
    fn from(e: PlatformError) -> Self {
        warn!("Deployment API call failed: {}", e);
        HandlerOutput::failed(e.to_string())
    }
}

pub async fn run(
    capability: &Capability,
    ctx: &HandlerContext<'_>,
    slot: &UiSlot,
) -> HandlerOutput {
    info!(capability = %capability.name(), "Running capability");

    match capability {
        Capability::ListProjects => list_projects(ctx, slot).await,
        Capability::ViewProject(args) => view_project(ctx, slot, &args.project_name).await,
        Capability::ListDeployments(args) => list_deployments(ctx, slot, args).await,
        Capability::ListDomains => list_domains(ctx, slot).await,
        Capability::ListStocks(args) => {
            show_after_delay(ctx, slot, SkeletonKind::Stocks).await;
            HandlerOutput::new(Renderable::Stocks(args.stocks.clone()), &args.stocks)
        }
        Capability::ShowStockPrice(stock) => {
            show_after_delay(ctx, slot, SkeletonKind::Stock).await;
            HandlerOutput::new(Renderable::Stock(stock.clone()), stock)
        }
        Capability::GetEvents(args) => {
            show_after_delay(ctx, slot, SkeletonKind::Events).await;
            HandlerOutput::new(Renderable::Events(args.events.clone()), &args.events)
        }
        Capability::ShowStockPurchase(args) => show_stock_purchase(args),
    }
}

async fn show_after_delay(ctx: &HandlerContext<'_>, slot: &UiSlot, kind: SkeletonKind) {
    slot.update(Renderable::Skeleton(kind)).await;
    tokio::time::sleep(ctx.step_delay).await;
}

async fn list_projects(ctx: &HandlerContext<'_>, slot: &UiSlot) -> HandlerOutput {
    slot.update(Renderable::Skeleton(SkeletonKind::Projects)).await;

    match ctx.platform.list_projects().await {
        Ok(projects) => {
            let summaries = summarize_projects(projects, ctx.hidden_project_substring);
            HandlerOutput::new(Renderable::Projects(summaries.clone()), &summaries)
        }
        Err(e) => e.into(),
    }
}

async fn view_project(
    ctx: &HandlerContext<'_>,
    slot: &UiSlot,
    project_name: &str,
) -> HandlerOutput {
    slot.update(Renderable::Skeleton(SkeletonKind::Project)).await;

    match ctx.platform.get_project(project_name).await {
        Ok(project) => {
            let detail = ProjectDetail::from(project);
            HandlerOutput::new(Renderable::Project(detail.for_display()), &detail)
        }
        Err(e) => e.into(),
    }
}

async fn list_deployments(
    ctx: &HandlerContext<'_>,
    slot: &UiSlot,
    args: &ListDeploymentsArgs,
) -> HandlerOutput {
    slot.update(Renderable::Skeleton(SkeletonKind::Deployments)).await;

    match ctx.platform.list_deployments(args.project_name.as_deref(), args.limit).await {
        Ok(deployments) => {
            let summaries: Vec<DeploymentSummary> =
                deployments.into_iter().map(Into::into).collect();
            HandlerOutput::new(Renderable::Deployments(summaries.clone()), &summaries)
        }
        Err(e) => e.into(),
    }
}

async fn list_domains(ctx: &HandlerContext<'_>, slot: &UiSlot) -> HandlerOutput {
    slot.update(Renderable::Skeleton(SkeletonKind::Domains)).await;

    match ctx.platform.list_domains().await {
        Ok(domains) => {
            let summaries: Vec<DomainSummary> = domains.into_iter().map(Into::into).collect();
            HandlerOutput::new(Renderable::Domains(summaries.clone()), &summaries)
        }
        Err(e) => e.into(),
    }
}

pub const INVALID_AMOUNT_NOTE: &str = "[User has selected an invalid amount]";

fn show_stock_purchase(args: &PurchaseArgs) -> HandlerOutput {
    let shares = args.number_of_shares;

    if !is_valid_share_count(shares) {
        info!(symbol = %args.symbol, shares, "Rejected purchase amount");
        let offer = PurchaseOffer {
            symbol: args.symbol.clone(),
            price: args.price,
            number_of_shares: shares,
            status: Some(PurchaseStatus::Expired),
        };
        let display = Renderable::BotMessage("Invalid amount".to_string());
        let mut output = HandlerOutput::new(display, &offer);
        output.trailing.push(Turn::system(INVALID_AMOUNT_NOTE));
        return output;
    }

    let recorded = PurchaseOffer {
        symbol: args.symbol.clone(),
        price: args.price,
        number_of_shares: shares,
        status: None,
    };
    let shown = PurchaseOffer {
        status: Some(PurchaseStatus::RequiresAction),
        ..recorded.clone()
    };
    HandlerOutput::new(Renderable::Purchase(shown), &recorded)
}

/// Result of a confirmed purchase: the final value of the progress slot, an
/// optional follow-up message and the system turn that records the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOutcome {
    pub progress: Renderable,
    pub message: Option<Renderable>,
    pub note: Turn,
}

pub async fn confirm_purchase(
    symbol: &str,
    price: f64,
    amount: f64,
    step_delay: Duration,
    slot: &UiSlot,
) -> PurchaseOutcome {
    if !is_valid_share_count(amount) {
        return PurchaseOutcome {
            progress: Renderable::BotMessage("Invalid amount".to_string()),
            message: None,
            note: Turn::system(INVALID_AMOUNT_NOTE),
        };
    }

    slot.update(Renderable::Purchasing {
        message: format!("Purchasing {} ${}...", amount, symbol),
        pending: true,
    })
    .await;
    tokio::time::sleep(step_delay).await;

    slot.update(Renderable::Purchasing {
        message: format!("Purchasing {} ${}... working on it...", amount, symbol),
        pending: true,
    })
    .await;
    tokio::time::sleep(step_delay).await;

    let total = amount * price;
    info!(symbol = %symbol, amount, total, "Purchase confirmed");

    PurchaseOutcome {
        progress: Renderable::Purchasing {
            message: format!(
                "You have successfully purchased {} ${}. Total cost: {}",
                amount,
                symbol,
                format_usd(total)
            ),
            pending: false,
        },
        message: Some(Renderable::SystemMessage(format!(
            "You have purchased {} shares of {} at {}. Total cost = {}",
            amount,
            symbol,
            format_usd(price),
            format_usd(total)
        ))),
        note: Turn::system(format!(
            "[User has purchased {} shares of {} at {}. Total cost = {}]",
            amount, symbol, price, total
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::capabilities::parse;
    use crate::agent::render::UiSink;
    use crate::models::chat::Role;
    use crate::models::deployment::{ApiDeployment, ApiDomain, ApiProject};
    use async_trait::async_trait;
    use reqwest::StatusCode;

    struct FakePlatform {
        fail: bool,
    }

    #[async_trait]
    impl DeploymentApi for FakePlatform {
        async fn list_projects(&self) -> Result<Vec<ApiProject>, PlatformError> {
            if self.fail {
                return Err(PlatformError::Status {
                    status: StatusCode::FORBIDDEN,
                    body: "forbidden".into(),
                });
            }
            Ok(vec![
                serde_json::from_value(json!({ "name": "backend-api" })).unwrap(),
                serde_json::from_value(json!({ "name": "frontend" })).unwrap(),
            ])
        }

        async fn get_project(&self, name: &str) -> Result<ApiProject, PlatformError> {
            Ok(serde_json::from_value(json!({
                "name": name,
                "targets": {
                    "production": {
                        "alias": ["frontend.vercel.app"],
                        "meta": { "githubCommitSha": "abcdef0123456789" }
                    }
                }
            }))
            .unwrap())
        }

        async fn list_deployments(
            &self,
            _project: Option<&str>,
            _limit: Option<u32>,
        ) -> Result<Vec<ApiDeployment>, PlatformError> {
            let deployment = json!({ "uid": "dpl_1", "name": "frontend", "state": "READY" });
            Ok(vec![serde_json::from_value(deployment).unwrap()])
        }

        async fn list_domains(&self) -> Result<Vec<ApiDomain>, PlatformError> {
            let domain = json!({ "name": "example.com", "verified": true });
            Ok(vec![serde_json::from_value(domain).unwrap()])
        }
    }

    fn ctx(platform: &FakePlatform) -> HandlerContext<'_> {
        HandlerContext {
            platform,
            hidden_project_substring: "backend",
            step_delay: Duration::ZERO,
        }
    }

    async fn run_parsed(platform: &FakePlatform, name: &str, input: Value) -> HandlerOutput {
        let capability = parse(name, input).unwrap();
        let slot = UiSink::detached().slot();
        let output = run(&capability, &ctx(platform), &slot).await;
        output
    }

    #[tokio::test]
    async fn test_list_projects_hides_backend() {
        let output = run_parsed(&FakePlatform { fail: false }, "listProjects", json!({})).await;
        match output.display {
            Renderable::Projects(projects) => {
                assert_eq!(projects.len(), 1);
                assert_eq!(projects[0].project_name, "frontend");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(output.result[0]["projectName"], "frontend");
    }

    #[tokio::test]
    async fn test_platform_failure_degrades_to_error() {
        let output = run_parsed(&FakePlatform { fail: true }, "listProjects", json!({})).await;
        assert!(matches!(output.display, Renderable::Error(_)));
        assert!(output.result["error"].as_str().unwrap().contains("403"));
        assert!(output.trailing.is_empty());
    }

    #[tokio::test]
    async fn test_view_project_keeps_full_sha_in_result() {
        let platform = FakePlatform { fail: false };
        let input = json!({ "projectName": "frontend" });
        let output = run_parsed(&platform, "viewProject", input).await;

        assert_eq!(output.result["target"]["production"]["git"]["sha"], "abcdef0123456789");
        assert_eq!(output.result["target"]["preview"], json!({}));
        match output.display {
            Renderable::Project(detail) => {
                let production = detail.target.production.detail().unwrap();
                assert_eq!(production.git.sha.as_deref(), Some("abcdef0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deployments_and_domains_reshaped() {
        let platform = FakePlatform { fail: false };
        let output = run_parsed(&platform, "listDeployments", json!({ "limit": 5 })).await;
        assert_eq!(output.result[0]["uid"], "dpl_1");

        let output = run_parsed(&platform, "listDomains", json!({})).await;
        assert_eq!(output.result[0]["verified"], true);
    }

    #[tokio::test]
    async fn test_purchase_quantity_bounds() {
        let platform = FakePlatform { fail: false };

        for shares in [0.0, 1001.0] {
            let output = run_parsed(
                &platform,
                "showStockPurchase",
                json!({ "symbol": "DOGE", "price": 0.1, "numberOfShares": shares }),
            )
            .await;
            assert_eq!(output.display, Renderable::BotMessage("Invalid amount".into()));
            assert_eq!(output.result["status"], "expired");
            assert_eq!(output.trailing.len(), 1);
            assert_eq!(output.trailing[0].role, Role::System);
            assert_eq!(output.trailing[0].text(), Some(INVALID_AMOUNT_NOTE));
        }

        for shares in [1.0, 250.0, 1000.0] {
            let output = run_parsed(
                &platform,
                "showStockPurchase",
                json!({ "symbol": "DOGE", "price": 0.1, "numberOfShares": shares }),
            )
            .await;
            match output.display {
                Renderable::Purchase(offer) => {
                    assert_eq!(offer.number_of_shares, shares);
                    assert_eq!(offer.status, Some(PurchaseStatus::RequiresAction));
                }
                other => panic!("unexpected {:?}", other),
            }
            assert!(output.result.get("status").is_none());
            assert!(output.trailing.is_empty());
        }
    }

    #[tokio::test]
    async fn test_synthetic_stocks_echoed() {
        let output = run_parsed(
            &FakePlatform { fail: false },
            "listStocks",
            json!({ "stocks": [{ "symbol": "DOGE", "price": 0.1, "delta": 0.01 }] }),
        )
        .await;
        assert_eq!(output.result[0]["symbol"], "DOGE");
        assert!(matches!(output.display, Renderable::Stocks(ref s) if s.len() == 1));
    }

    #[tokio::test]
    async fn test_confirm_purchase_steps() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let sink = UiSink::new(tx);
        let slot = sink.slot();

        let outcome = confirm_purchase("AAPL", 10.0, 3.0, Duration::ZERO, &slot).await;
        drop(slot);
        drop(sink);

        let mut pending = Vec::new();
        while let Some(update) = rx.recv().await {
            pending.push(update.display);
        }
        assert_eq!(pending.len(), 2);
        assert!(matches!(
            &pending[0],
            Renderable::Purchasing { message, pending: true } if message == "Purchasing 3 $AAPL..."
        ));

        assert_eq!(
            outcome.progress,
            Renderable::Purchasing {
                message: "You have successfully purchased 3 $AAPL. Total cost: $30.00".into(),
                pending: false,
            }
        );
        assert_eq!(
            outcome.message,
            Some(Renderable::SystemMessage(
                "You have purchased 3 shares of AAPL at $10.00. Total cost = $30.00".into()
            ))
        );
        assert_eq!(
            outcome.note.text(),
            Some("[User has purchased 3 shares of AAPL at 10. Total cost = 30]")
        );
    }

    #[tokio::test]
    async fn test_confirm_purchase_rejects_invalid_amount() {
        let slot = UiSink::detached().slot();
        let outcome = confirm_purchase("AAPL", 10.0, 0.0, Duration::ZERO, &slot).await;
        assert_eq!(outcome.progress, Renderable::BotMessage("Invalid amount".into()));
        assert!(outcome.message.is_none());
        assert_eq!(outcome.note.text(), Some(INVALID_AMOUNT_NOTE));
    }
}
