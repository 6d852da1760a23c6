//! Extraction of typed trade records from tokenized exports.
//!
//! Brokers rename columns between platform versions, so every field is
//! resolved through a synonym table over canonicalized header names.
//! Earlier synonyms win when several columns match.

use crate::classify;
use crate::error::{BillError, RowError};
use crate::raw::TableExport;
use crate::types::{AccountId, FileRole, Side, TradeRecord};
use crate::utils::{canonical_header, parse_date, parse_money};
use rust_decimal::Decimal;
use tracing::debug;

const DATE_SYNONYMS: &[&str] = &["tradedate", "date", "trddate"];
const VENUE_SYNONYMS: &[&str] = &["exchgseg", "exchseg", "exchangesegment", "exchange", "exch"];
const SEGMENT_SYNONYMS: &[&str] = &["segment", "seg"];
const SYMBOL_SYNONYMS: &[&str] = &[
    "tradingsymbol",
    "symbol",
    "scripname",
    "instrument",
    "security",
];
const SIDE_SYNONYMS: &[&str] = &["side", "buysell", "bs", "transactiontype", "trantype"];
const QUANTITY_SYNONYMS: &[&str] = &["qty", "quantity", "tradedqty", "fillqty"];
const PRICE_SYNONYMS: &[&str] = &["price", "rate", "avgprice", "tradeprice"];
const VALUE_SYNONYMS: &[&str] = &["value", "amount", "tradevalue", "netvalue", "turnover"];
const ACCOUNT_SYNONYMS: &[&str] = &["accountid", "account", "clientcode", "clientid"];
const USER_SYNONYMS: &[&str] = &["userid", "user", "usercode"];

/// Resolved positions of the canonical fields within a header row.
struct ColumnMap {
    date: usize,
    venue: usize,
    segment: Option<usize>,
    symbol: usize,
    side: usize,
    quantity: usize,
    price: usize,
    value: Option<usize>,
    account: Option<usize>,
    user: Option<usize>,
}

fn find_column(canon: &[String], synonyms: &[&str]) -> Option<usize> {
    synonyms
        .iter()
        .find_map(|syn| canon.iter().position(|header| header == syn))
}

fn resolve_columns(headers: &[String], role: FileRole) -> Result<ColumnMap, BillError> {
    let canon: Vec<String> = headers.iter().map(|h| canonical_header(h)).collect();

    let date = find_column(&canon, DATE_SYNONYMS);
    let venue = find_column(&canon, VENUE_SYNONYMS);
    let symbol = find_column(&canon, SYMBOL_SYNONYMS);
    let side = find_column(&canon, SIDE_SYNONYMS);
    let quantity = find_column(&canon, QUANTITY_SYNONYMS);
    let price = find_column(&canon, PRICE_SYNONYMS);

    if let (Some(date), Some(venue), Some(symbol), Some(side), Some(quantity), Some(price)) =
        (date, venue, symbol, side, quantity, price)
    {
        return Ok(ColumnMap {
            date,
            venue,
            segment: find_column(&canon, SEGMENT_SYNONYMS),
            symbol,
            side,
            quantity,
            price,
            value: find_column(&canon, VALUE_SYNONYMS),
            account: find_column(&canon, ACCOUNT_SYNONYMS),
            user: find_column(&canon, USER_SYNONYMS),
        });
    }

    let mut missing = Vec::new();
    if date.is_none() {
        missing.push("date");
    }
    if venue.is_none() {
        missing.push("exchange/segment");
    }
    if symbol.is_none() {
        missing.push("symbol");
    }
    if side.is_none() {
        missing.push("side");
    }
    if quantity.is_none() {
        missing.push("quantity");
    }
    if price.is_none() {
        missing.push("price");
    }
    Err(BillError::Schema {
        role,
        missing: missing.join(", "),
        detected: if headers.is_empty() {
            "(none)".to_string()
        } else {
            headers.join(", ")
        },
    })
}

impl TableExport {
    /// Extracts typed trade records.
    ///
    /// Header resolution fails fast; row validation runs over the whole
    /// file and reports every offending row at once. Rows without a
    /// trading symbol are dropped.
    pub fn records(&self) -> Result<Vec<TradeRecord>, BillError> {
        let columns = resolve_columns(&self.headers, self.role)?;

        let mut records = Vec::with_capacity(self.records.len());
        let mut rejected = Vec::new();
        let mut skipped = 0_usize;

        for (index, record) in self.records.iter().enumerate() {
            match parse_row(record, &columns, self.role, index + 1) {
                Ok(Some(trade)) => records.push(trade),
                Ok(None) => skipped += 1,
                Err(err) => rejected.push(err),
            }
        }

        if skipped > 0 {
            debug!(role = %self.role, skipped, "dropped rows without a trading symbol");
        }
        if !rejected.is_empty() {
            return Err(BillError::InvalidRows {
                role: self.role,
                rows: rejected,
            });
        }
        if records.is_empty() {
            return Err(BillError::EmptyInput { role: self.role });
        }
        Ok(records)
    }
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &ColumnMap,
    source: FileRole,
    row: usize,
) -> Result<Option<TradeRecord>, RowError> {
    let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

    let symbol = cell(columns.symbol);
    if symbol.is_empty() {
        return Ok(None);
    }

    let venue_cell = cell(columns.venue);
    if venue_cell.is_empty() {
        return Err(reject(row, "missing venue"));
    }
    // A combined code like NSE_FNO stands alone; a bare exchange column is
    // joined with the separate segment column when one exists.
    let venue = if classify::venue(venue_cell).is_some() {
        venue_cell.to_string()
    } else if let Some(seg) = columns
        .segment
        .map(|idx| cell(idx))
        .filter(|s| !s.is_empty())
    {
        format!("{venue_cell}_{seg}")
    } else {
        venue_cell.to_string()
    };

    let trade_date =
        parse_date(cell(columns.date)).map_err(|err| reject(row, &err.to_string()))?;

    let side_cell = cell(columns.side);
    let side = parse_side(side_cell)
        .ok_or_else(|| reject(row, &format!("unrecognized side '{side_cell}'")))?;

    let quantity = parse_money(cell(columns.quantity), "quantity")
        .map_err(|err| reject(row, &err.to_string()))?;
    if quantity <= Decimal::ZERO {
        return Err(reject(
            row,
            &format!("quantity must be positive, got {quantity}"),
        ));
    }

    let price =
        parse_money(cell(columns.price), "price").map_err(|err| reject(row, &err.to_string()))?;
    if price < Decimal::ZERO {
        return Err(reject(
            row,
            &format!("price must be non-negative, got {price}"),
        ));
    }

    let value = match columns.value.map(|idx| cell(idx)).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let value = parse_money(raw, "value").map_err(|err| reject(row, &err.to_string()))?;
            if value < Decimal::ZERO {
                return Err(reject(
                    row,
                    &format!("value must be non-negative, got {value}"),
                ));
            }
            value
        }
        None => price * quantity,
    };

    // A blank account cell falls back to the user id column, so admin
    // exports keyed either way split the same.
    let account = columns
        .account
        .map(|idx| cell(idx))
        .filter(|s| !s.is_empty())
        .or_else(|| columns.user.map(|idx| cell(idx)).filter(|s| !s.is_empty()))
        .map(|s| AccountId(s.to_string()));

    Ok(Some(TradeRecord {
        row,
        trade_date,
        venue,
        symbol: symbol.to_string(),
        side,
        quantity,
        price,
        value,
        account,
        source,
    }))
}

fn reject(row: usize, reason: &str) -> RowError {
    RowError {
        row,
        reason: reason.to_string(),
    }
}

/// Maps a side cell to a trade direction.
fn parse_side(value: &str) -> Option<Side> {
    match value.to_uppercase().as_str() {
        "B" | "BUY" | "BOUGHT" => Some(Side::Buy),
        "S" | "SELL" | "SOLD" => Some(Side::Sell),
        _ => None,
    }
}
