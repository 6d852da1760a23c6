//! Domain types shared across parsing, charge computation and billing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary value, kept as `Decimal` for exact arithmetic.
pub type Money = Decimal;

/// Client account identifier from an export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stock exchange a trade was executed on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Exchange {
    /// National Stock Exchange.
    #[serde(rename = "NSE")]
    Nse,
    /// Bombay Stock Exchange.
    #[serde(rename = "BSE")]
    Bse,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
        })
    }
}

/// Market segment within an exchange.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Segment {
    /// Futures and options.
    #[serde(rename = "FO")]
    Fo,
    /// Cash equity.
    #[serde(rename = "EQ")]
    Equity,
    /// Currency derivatives.
    #[serde(rename = "CD")]
    Currency,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fo => "FO",
            Self::Equity => "EQ",
            Self::Currency => "CD",
        })
    }
}

/// Instrument kind inferred from the trading symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Futures contract.
    Future,
    /// Options contract.
    Option,
    /// Cash equity scrip.
    Equity,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy trade.
    Buy,
    /// Sell trade.
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        })
    }
}

/// Which of the two uploaded exports a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Per-trade detail export.
    Daywise,
    /// Per-instrument aggregated export.
    Netwise,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daywise => "Daywise",
            Self::Netwise => "Netwise",
        })
    }
}

/// One trade row parsed from an export.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    /// 1-based data row number in the source file, header excluded.
    pub row: usize,
    /// Trade date.
    pub trade_date: NaiveDate,
    /// Raw venue code, e.g. `NSE_FNO` or `BFO`.
    pub venue: String,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Traded quantity, always positive.
    pub quantity: Money,
    /// Execution price.
    pub price: Money,
    /// Gross traded value; price times quantity when the cell was blank.
    pub value: Money,
    /// Account identifier, present in multi-account admin exports.
    pub account: Option<AccountId>,
    /// Export the row came from.
    pub source: FileRole,
}

/// Charge category; variant order is the display order within a section,
/// with GST always last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChargeCategory {
    /// Broker commission.
    Brokerage,
    /// Exchange transaction (turnover) charges.
    ExchangeTransaction,
    /// SEBI regulatory fee.
    SebiFee,
    /// Securities transaction tax.
    Stt,
    /// Stamp duty.
    StampDuty,
    /// Any additional named charge from the rate card, keyed by its
    /// normalized code (e.g. `clearing`, `ipft`).
    Other(String),
    /// Goods and services tax on applicable charges.
    Gst,
}

impl ChargeCategory {
    fn canonical(value: &str) -> String {
        value
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<String> for ChargeCategory {
    fn from(value: String) -> Self {
        let key = Self::canonical(&value);
        match key.as_str() {
            "brokerage" => Self::Brokerage,
            "exchange_transaction" | "toc" | "turnover" => Self::ExchangeTransaction,
            "sebi_fee" | "sebi" => Self::SebiFee,
            "stt" => Self::Stt,
            "stamp_duty" | "stamp" => Self::StampDuty,
            "gst" => Self::Gst,
            _ => Self::Other(key),
        }
    }
}

impl From<ChargeCategory> for String {
    fn from(value: ChargeCategory) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ChargeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Brokerage => "brokerage",
            Self::ExchangeTransaction => "exchange_transaction",
            Self::SebiFee => "sebi_fee",
            Self::Stt => "stt",
            Self::StampDuty => "stamp_duty",
            Self::Other(name) => name,
            Self::Gst => "gst",
        })
    }
}

/// One computed charge for a (section, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeLine {
    /// Charge category.
    pub category: ChargeCategory,
    /// Display label from the rate card.
    pub label: String,
    /// Basis amount the rate was applied to (turnover, trade count, or
    /// derived GST base).
    pub basis: Money,
    /// Human-readable applied rate.
    pub rate: String,
    /// Charge amount, rounded per the rate-card entry.
    pub amount: Money,
    /// Whether this line feeds the GST base.
    pub gst_applicable: bool,
}

/// Charge lines for one (exchange, segment) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSection {
    /// Exchange of this section.
    pub exchange: Exchange,
    /// Segment of this section.
    pub segment: Segment,
    /// Charge lines in display order.
    pub lines: Vec<ChargeLine>,
    /// Exact sum of line amounts.
    pub subtotal: Money,
}

/// Aggregated per-symbol trading activity from the Daywise export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    /// Trading symbol.
    pub symbol: String,
    /// Raw venue code the symbol traded on.
    pub venue: String,
    /// Total bought quantity.
    pub buy_qty: Money,
    /// Total buy value.
    pub buy_value: Money,
    /// Total sold quantity.
    pub sell_qty: Money,
    /// Total sell value.
    pub sell_value: Money,
    /// Bought minus sold quantity.
    pub net_qty: Money,
    /// Sell value minus buy value.
    pub net_value: Money,
}

/// Totals over all position rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionTotals {
    /// Total bought quantity.
    pub buy_qty: Money,
    /// Total buy value.
    pub buy_value: Money,
    /// Total sold quantity.
    pub sell_qty: Money,
    /// Total sell value.
    pub sell_value: Money,
    /// Sell value minus buy value.
    pub net_value: Money,
}

/// Divergence between Daywise- and Netwise-derived totals for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationWarning {
    /// Exchange of the diverging section.
    pub exchange: Exchange,
    /// Segment of the diverging section.
    pub segment: Segment,
    /// Netwise subtotal minus Daywise subtotal, signed.
    pub difference: Money,
    /// Tolerance the difference exceeded.
    pub tolerance: Money,
}
