//! Helper parsers for numbers, dates and header names.

use crate::error::BillError;
use crate::types::Money;
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::LazyLock;

/// Canonicalizes a header name: lowercase, ASCII alphanumerics only.
pub fn canonical_header(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Normalizes a numeric string, stripping separators and the plus sign and
/// rewriting parenthesized values as negative.
fn normalize_number(input: &str) -> String {
    let trimmed = input.trim();
    let (body, negative) = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .map_or((trimmed, false), |inner| (inner, true));
    let cleaned: String = body
        .chars()
        .filter(|ch| !matches!(*ch, ' ' | ',' | '\u{a0}' | '\u{202f}' | '+'))
        .collect();
    if negative {
        format!("-{}", cleaned.trim())
    } else {
        cleaned.trim().to_string()
    }
}

/// Parses a monetary cell; an empty cell is an error.
pub fn parse_money(value: &str, column: &'static str) -> Result<Money, BillError> {
    let normalized = normalize_number(value);
    Decimal::from_str(&normalized).map_err(|_| BillError::Number {
        value: value.trim().to_string(),
        column,
    })
}

const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d-%b-%Y", "%d-%b-%y",
    "%d%b%Y", "%d%b%y",
];

/// Parses a date cell, accepting the formats brokers are known to emit.
pub fn parse_date(value: &str) -> Result<NaiveDate, BillError> {
    let trimmed = value.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(BillError::Date {
        value: trimmed.to_string(),
    })
}

/// Rounds half-up (midpoint away from zero) to the given decimals.
pub fn round_half_up(value: Money, decimals: u32) -> Money {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

static PR_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^A-Za-z0-9])PR\s*0*([0-9]+)(?:$|[^A-Za-z0-9])")
        .expect("valid account number regex")
});

/// Extracts the numeric part of a `PR`-prefixed account identifier.
pub fn extract_pr_number(value: &str) -> Option<u64> {
    PR_NUMBER_RE
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sort key placing `PR` accounts in numeric order (`PR7` before `PR0012`)
/// and everything else after them, lexicographically.
pub fn natural_account_key(value: &str) -> (u64, String) {
    let lower = value.trim().to_lowercase();
    (extract_pr_number(value).unwrap_or(u64::MAX), lower)
}
