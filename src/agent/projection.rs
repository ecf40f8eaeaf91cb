// src/agent/projection.rs
//
// Rebuilds the visible transcript of a stored chat from its turn log.
use crate::agent::render::Renderable;
use crate::models::chat::{Chat, Role, ToolPart, Turn, TurnContent};
use crate::models::deployment::{DeploymentSummary, DomainSummary, ProjectDetail, ProjectSummary};
use crate::models::stocks::{PurchaseOffer, PurchaseStatus, Stock, StockEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiMessage {
    pub id: String,
    pub display: Vec<Renderable>,
}

/// System turns are never shown; ids count the remaining turns.
pub fn ui_state_from_chat(chat: &Chat) -> Vec<UiMessage> {
    chat.messages
        .iter()
        .filter(|turn| turn.role != Role::System)
        .enumerate()
        .map(|(index, turn)| UiMessage {
            id: format!("{}-{}", chat.id, index),
            display: render_turn(turn),
        })
        .collect()
}

fn render_turn(turn: &Turn) -> Vec<Renderable> {
    match (&turn.role, &turn.content) {
        (Role::User, TurnContent::Text(text)) => vec![Renderable::UserMessage(text.clone())],
        (Role::Assistant, TurnContent::Text(text)) => vec![Renderable::BotMessage(text.clone())],
        (_, TurnContent::Parts(parts)) => parts.iter().filter_map(render_result).collect(),
        (_, TurnContent::Text(_)) => Vec::new(),
    }
}

fn render_result(part: &ToolPart) -> Option<Renderable> {
    let ToolPart::ToolResult { tool_name, result, .. } = part else {
        return None;
    };

    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return Some(Renderable::Error(error.to_string()));
    }

    let shown = match tool_name.as_str() {
        "listProjects" => decode::<Vec<ProjectSummary>>(result).map(Renderable::Projects),
        "viewProject" => {
            decode::<ProjectDetail>(result).map(|detail| Renderable::Project(detail.for_display()))
        }
        "listDeployments" => decode::<Vec<DeploymentSummary>>(result).map(Renderable::Deployments),
        "listDomains" => decode::<Vec<DomainSummary>>(result).map(Renderable::Domains),
        "listStocks" => decode::<Vec<Stock>>(result).map(Renderable::Stocks),
        "showStockPrice" => decode::<Stock>(result).map(Renderable::Stock),
        "getEvents" => decode::<Vec<StockEvent>>(result).map(Renderable::Events),
        "showStockPurchase" => decode::<PurchaseOffer>(result).map(|offer| match offer.status {
            Some(PurchaseStatus::Expired) => Renderable::BotMessage("Invalid amount".to_string()),
            _ => Renderable::Purchase(PurchaseOffer {
                status: Some(PurchaseStatus::RequiresAction),
                ..offer
            }),
        }),
        other => {
            tracing::debug!(tool = %other, "No renderer for stored tool result");
            None
        }
    };

    if shown.is_none() {
        tracing::warn!(tool = %tool_name, "Stored tool result did not match its shape");
    }
    shown
}

fn decode<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::AiState;
    use chrono::Utc;
    use serde_json::json;

    fn stored_chat() -> Chat {
        let mut state = AiState::new("c1");
        state.append(Turn::user("buy 0 DOGE"));
        state.append(Turn::tool_call(
            "showStockPurchase",
            "t1",
            json!({ "symbol": "DOGE", "price": 0.1, "numberOfShares": 0.0 }),
        ));
        state.append(Turn::tool_result(
            "showStockPurchase",
            "t1",
            json!({ "symbol": "DOGE", "price": 0.1, "numberOfShares": 0.0, "status": "expired" }),
        ));
        state.append(Turn::system("[User has selected an invalid amount]"));
        state.append(Turn::user("list projects"));
        state.append(Turn::tool_call("listProjects", "t2", json!({})));
        let failure = json!({ "error": "deployment API returned 500" });
        state.append(Turn::tool_result("listProjects", "t2", failure));
        state.append(Turn::assistant("Sorry about that."));
        Chat::from_state(&state, "alice", Utc::now())
    }

    #[test]
    fn test_projection_excludes_system_turns() {
        let messages = ui_state_from_chat(&stored_chat());

        assert_eq!(messages.len(), 7);
        for message in &messages {
            assert!(!message
                .display
                .iter()
                .any(|r| matches!(r, Renderable::SystemMessage(_))));
        }
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids[0], "c1-0");
        assert_eq!(ids[6], "c1-6");
    }

    #[test]
    fn test_projection_maps_results_by_tool() {
        let messages = ui_state_from_chat(&stored_chat());

        assert_eq!(messages[0].display, vec![Renderable::UserMessage("buy 0 DOGE".into())]);
        // the tool call itself has nothing to show
        assert!(messages[1].display.is_empty());
        assert_eq!(messages[2].display, vec![Renderable::BotMessage("Invalid amount".into())]);
        assert_eq!(
            messages[5].display,
            vec![Renderable::Error("deployment API returned 500".into())]
        );
        assert_eq!(messages[6].display, vec![Renderable::BotMessage("Sorry about that.".into())]);
    }

    #[test]
    fn test_projection_restores_purchase_card() {
        let mut state = AiState::new("c2");
        state.append(Turn::tool_result(
            "showStockPurchase",
            "t1",
            json!({ "symbol": "AAPL", "price": 180.0, "numberOfShares": 5.0 }),
        ));
        let chat = Chat::from_state(&state, "alice", Utc::now());

        match &ui_state_from_chat(&chat)[0].display[0] {
            Renderable::Purchase(offer) => {
                assert_eq!(offer.number_of_shares, 5.0);
                assert_eq!(offer.status, Some(PurchaseStatus::RequiresAction));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
