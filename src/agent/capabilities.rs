// src/agent/capabilities.rs
//
// The declared actions the model may invoke. Each capability is one variant of
// `Capability` with its own typed arguments; `parse` looks the capability up
// by name and validates the model's JSON input against it.
use crate::claude_client::{ClaudeTool, InputSchema, PropertyDefinition};
use crate::models::stocks::{Stock, StockEvent, DEFAULT_PURCHASE_SHARES};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("model selected undeclared capability '{0}'")]
    Unknown(String),
    #[error("invalid arguments for '{name}': {source}")]
    InvalidArguments {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid arguments for '{name}': {reason}")]
    Rejected { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewProjectArgs {
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDeploymentsArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListStocksArgs {
    pub stocks: Vec<Stock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseArgs {
    pub symbol: String,
    pub price: f64,
    #[serde(default = "default_shares")]
    pub number_of_shares: f64,
}

fn default_shares() -> f64 {
    DEFAULT_PURCHASE_SHARES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsArgs {
    pub events: Vec<StockEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    ListProjects,
    ViewProject(ViewProjectArgs),
    ListDeployments(ListDeploymentsArgs),
    ListDomains,
    ListStocks(ListStocksArgs),
    ShowStockPrice(Stock),
    ShowStockPurchase(PurchaseArgs),
    GetEvents(EventsArgs),
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::ListProjects => "listProjects",
            Capability::ViewProject(_) => "viewProject",
            Capability::ListDeployments(_) => "listDeployments",
            Capability::ListDomains => "listDomains",
            Capability::ListStocks(_) => "listStocks",
            Capability::ShowStockPrice(_) => "showStockPrice",
            Capability::ShowStockPurchase(_) => "showStockPurchase",
            Capability::GetEvents(_) => "getEvents",
        }
    }

    /// The normalized arguments, as recorded in the tool-call turn.
    pub fn args(&self) -> Value {
        let encoded = match self {
            Capability::ListProjects | Capability::ListDomains => {
                Ok(Value::Object(Default::default()))
            }
            Capability::ViewProject(args) => serde_json::to_value(args),
            Capability::ListDeployments(args) => serde_json::to_value(args),
            Capability::ListStocks(args) => serde_json::to_value(args),
            Capability::ShowStockPrice(args) => serde_json::to_value(args),
            Capability::ShowStockPurchase(args) => serde_json::to_value(args),
            Capability::GetEvents(args) => serde_json::to_value(args),
        };
        // Plain data structs always encode
        encoded.unwrap_or(Value::Null)
    }
}

struct CapabilitySpec {
    name: &'static str,
    description: &'static str,
    schema: fn() -> InputSchema,
    parse: fn(&'static str, Value) -> Result<Capability, CapabilityError>,
}

const SYMBOL_DESCRIPTION: &str = "The name or symbol of the stock or currency. e.g. DOGE/AAPL/USD.";

static CAPABILITIES: [CapabilitySpec; 8] = [
    CapabilitySpec {
        name: "listProjects",
        description: "List all the projects of the deployment dashboard.",
        schema: no_arguments,
        parse: parse_list_projects,
    },
    CapabilitySpec {
        name: "viewProject",
        description: "View a project using the project name.",
        schema: view_project_schema,
        parse: parse_view_project,
    },
    CapabilitySpec {
        name: "listDeployments",
        description: "List the most recent deployments, optionally for a single project.",
        schema: list_deployments_schema,
        parse: parse_list_deployments,
    },
    CapabilitySpec {
        name: "listDomains",
        description: "List the domains registered on the account.",
        schema: no_arguments,
        parse: parse_list_domains,
    },
    CapabilitySpec {
        name: "listStocks",
        description: "List three imaginary stocks that are trending.",
        schema: list_stocks_schema,
        parse: |name, input| decode(name, input).map(Capability::ListStocks),
    },
    CapabilitySpec {
        name: "showStockPrice",
        description: concat!(
            "Get the current stock price of a given stock or currency. ",
            "Use this to show the price to the user."
        ),
        schema: stock_price_schema,
        parse: |name, input| decode(name, input).map(Capability::ShowStockPrice),
    },
    CapabilitySpec {
        name: "showStockPurchase",
        description: concat!(
            "Show price and the UI to purchase a stock or currency. ",
            "Use this if the user wants to purchase a stock or currency."
        ),
        schema: stock_purchase_schema,
        parse: |name, input| decode(name, input).map(Capability::ShowStockPurchase),
    },
    CapabilitySpec {
        name: "getEvents",
        description: concat!(
            "List funny imaginary events between user highlighted dates ",
            "that describe stock activity."
        ),
        schema: events_schema,
        parse: |name, input| decode(name, input).map(Capability::GetEvents),
    },
];

fn parse_list_projects(_: &'static str, _: Value) -> Result<Capability, CapabilityError> {
    Ok(Capability::ListProjects)
}

fn parse_list_domains(_: &'static str, _: Value) -> Result<Capability, CapabilityError> {
    Ok(Capability::ListDomains)
}

fn parse_view_project(name: &'static str, input: Value) -> Result<Capability, CapabilityError> {
    let args: ViewProjectArgs = decode(name, input)?;
    let project_name = args.project_name.trim();
    if project_name.is_empty() {
        return Err(CapabilityError::Rejected {
            name,
            reason: "projectName must not be empty".to_string(),
        });
    }
    Ok(Capability::ViewProject(ViewProjectArgs {
        project_name: project_name.to_string(),
    }))
}

fn parse_list_deployments(name: &'static str, input: Value) -> Result<Capability, CapabilityError> {
    let args: ListDeploymentsArgs = decode(name, input)?;
    if args.limit == Some(0) {
        return Err(CapabilityError::Rejected {
            name,
            reason: "limit must be positive".to_string(),
        });
    }
    Ok(Capability::ListDeployments(args))
}

fn decode<T: DeserializeOwned>(name: &'static str, input: Value) -> Result<T, CapabilityError> {
    serde_json::from_value(input)
        .map_err(|source| CapabilityError::InvalidArguments { name, source })
}

/// Validates the model's selection and returns the typed capability.
pub fn parse(name: &str, input: Value) -> Result<Capability, CapabilityError> {
    let spec = CAPABILITIES
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| CapabilityError::Unknown(name.to_string()))?;
    (spec.parse)(spec.name, input)
}

/// Tool declarations sent with every model request.
pub fn declarations() -> Vec<ClaudeTool> {
    CAPABILITIES
        .iter()
        .map(|spec| ClaudeTool {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            input_schema: (spec.schema)(),
        })
        .collect()
}

pub const SYSTEM_PROMPT: &str = "\
You are a deployment platform API conversation bot and you can help users interact with the platform's REST API, step by step.
You and the user can discuss various API functionalities and the user can adjust parameters or make requests through the UI.

Messages inside [] mean that it's a UI element or a user event. For example:
- \"[User has set project ID to xyz123]\" means that the user has set the project ID to xyz123 in the UI.
- \"[User has changed deployment URL to https://example.com]\" means that the user has changed the deployment URL in the UI.

If the user wants to list projects, call `listProjects`.
If the user wants to view a project's details using a project name, call `viewProject`.
If the user wants to list deployments, call `listDeployments`.
If the user wants to list domains, call `listDomains`.
If the user wants trending stocks, call `listStocks`; for a single stock price call `showStockPrice`.
If the user wants to buy a stock, call `showStockPurchase`.
If the user wants stock events between dates, call `getEvents`.

If the user requests a functionality not supported by these actions (creating or deleting projects, deployments or domains, usage statistics), respond that you are a demo and cannot perform that action.

Besides that, you can also chat with users and do some calculations if needed.";

fn schema(properties: HashMap<String, PropertyDefinition>, required: &[&str]) -> InputSchema {
    InputSchema {
        schema_type: "object".to_string(),
        properties,
        required: required.iter().map(|s| s.to_string()).collect(),
    }
}

fn no_arguments() -> InputSchema {
    schema(HashMap::new(), &[])
}

fn view_project_schema() -> InputSchema {
    schema(
        HashMap::from([(
            "projectName".to_string(),
            PropertyDefinition::scalar("string", "The name of the project to view."),
        )]),
        &["projectName"],
    )
}

fn list_deployments_schema() -> InputSchema {
    schema(
        HashMap::from([
            (
                "projectName".to_string(),
                PropertyDefinition::scalar(
                    "string",
                    "Only list deployments of this project (name or id).",
                ),
            ),
            (
                "limit".to_string(),
                PropertyDefinition::scalar("integer", "Maximum number of deployments to return."),
            ),
        ]),
        &[],
    )
}

fn stock_properties(price_description: &str) -> HashMap<String, PropertyDefinition> {
    HashMap::from([
        (
            "symbol".to_string(),
            PropertyDefinition::scalar("string", SYMBOL_DESCRIPTION),
        ),
        ("price".to_string(), PropertyDefinition::scalar("number", price_description)),
        (
            "delta".to_string(),
            PropertyDefinition::scalar("number", "The change in price of the stock"),
        ),
    ])
}

fn list_stocks_schema() -> InputSchema {
    schema(
        HashMap::from([(
            "stocks".to_string(),
            PropertyDefinition::array_of(
                "The trending stocks",
                PropertyDefinition::object(
                    "A stock",
                    stock_properties("The price of the stock"),
                    &["symbol", "price", "delta"],
                ),
            ),
        )]),
        &["stocks"],
    )
}

fn stock_price_schema() -> InputSchema {
    schema(stock_properties("The price of the stock."), &["symbol", "price", "delta"])
}

fn stock_purchase_schema() -> InputSchema {
    schema(
        HashMap::from([
            (
                "symbol".to_string(),
                PropertyDefinition::scalar("string", SYMBOL_DESCRIPTION),
            ),
            (
                "price".to_string(),
                PropertyDefinition::scalar(
                    "number",
                    "The price of the stock mentioned by the user in the prompt.",
                ),
            ),
            (
                "numberOfShares".to_string(),
                PropertyDefinition::scalar(
                    "number",
                    concat!(
                        "The **number of shares** for a stock or currency to purchase. ",
                        "Can be optional if the user did not specify it."
                    ),
                ),
            ),
        ]),
        &["symbol", "price"],
    )
}

fn events_schema() -> InputSchema {
    schema(
        HashMap::from([(
            "events".to_string(),
            PropertyDefinition::array_of(
                "The imaginary events",
                PropertyDefinition::object(
                    "An event",
                    HashMap::from([
                        (
                            "date".to_string(),
                            PropertyDefinition::scalar(
                                "string",
                                "The date of the event, in ISO-8601 format",
                            ),
                        ),
                        (
                            "headline".to_string(),
                            PropertyDefinition::scalar("string", "The headline of the event"),
                        ),
                        (
                            "description".to_string(),
                            PropertyDefinition::scalar("string", "The description of the event"),
                        ),
                    ]),
                    &["date", "headline", "description"],
                ),
            ),
        )]),
        &["events"],
    )
}
