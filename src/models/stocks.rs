// src/models/stocks.rs
//
// Synthetic demo data for the toy trading capabilities. Nothing here talks to
// a real market.
use serde::{Deserialize, Serialize};

pub const MIN_PURCHASE_SHARES: f64 = 1.0;
pub const MAX_PURCHASE_SHARES: f64 = 1000.0;
pub const DEFAULT_PURCHASE_SHARES: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub price: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEvent {
    pub date: String,
    pub headline: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    RequiresAction,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOffer {
    pub symbol: String,
    pub price: f64,
    pub number_of_shares: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PurchaseStatus>,
}

/// Whole share counts from 1 to 1000 inclusive can be bought.
pub fn is_valid_share_count(shares: f64) -> bool {
    shares.fract() == 0.0 && (MIN_PURCHASE_SHARES..=MAX_PURCHASE_SHARES).contains(&shares)
}

/// Formats an amount the way the demo shows money, e.g. `$1,234.50`.
pub fn format_usd(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{:02}", if negative { "-" } else { "" }, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_bounds() {
        assert!(!is_valid_share_count(0.0));
        assert!(is_valid_share_count(1.0));
        assert!(is_valid_share_count(1000.0));
        assert!(!is_valid_share_count(1001.0));
        assert!(!is_valid_share_count(2.5));
        assert!(!is_valid_share_count(0.5));
        assert!(!is_valid_share_count(-3.0));
        assert!(!is_valid_share_count(f64::NAN));
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(12.5), "$12.50");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
        assert_eq!(format_usd(-42.0), "-$42.00");
    }
}
