//! Venue and instrument classification of trade records.

use crate::error::BillError;
use crate::types::{Exchange, InstrumentKind, Segment, TradeRecord};
use regex::Regex;
use std::sync::LazyLock;

static OPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(CE|PE)\b").expect("valid option suffix regex"));

/// Resolved placement of one trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Exchange the trade executed on.
    pub exchange: Exchange,
    /// Market segment.
    pub segment: Segment,
    /// Instrument kind inferred from the symbol.
    pub instrument: InstrumentKind,
}

/// Maps a record's venue code and symbol to its classification.
///
/// Unknown venue codes are an error; nothing is silently defaulted.
pub fn classify(record: &TradeRecord) -> Result<Classification, BillError> {
    let (exchange, segment) =
        venue(&record.venue).ok_or_else(|| BillError::Classification {
            venue: record.venue.clone(),
            row: record.row,
        })?;
    Ok(Classification {
        exchange,
        segment,
        instrument: instrument_kind(&record.symbol, segment),
    })
}

/// Resolves a raw venue code such as `NFO`, `NSE_FNO` or `BSEFO`.
pub fn venue(raw: &str) -> Option<(Exchange, Segment)> {
    let canon: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_uppercase();
    match canon.as_str() {
        "NFO" | "NSEFO" | "NSEFNO" => Some((Exchange::Nse, Segment::Fo)),
        "BFO" | "BSEFO" | "BSEFNO" => Some((Exchange::Bse, Segment::Fo)),
        "NSEEQ" | "NSECM" | "NSECASH" => Some((Exchange::Nse, Segment::Equity)),
        "BSEEQ" | "BSECM" | "BSECASH" => Some((Exchange::Bse, Segment::Equity)),
        "NSECD" | "NSECDS" => Some((Exchange::Nse, Segment::Currency)),
        "BSECD" | "BSECDS" => Some((Exchange::Bse, Segment::Currency)),
        _ => None,
    }
}

/// Infers the instrument kind from a trading symbol.
///
/// A standalone `CE` or `PE` token marks an option; everything else in a
/// derivative segment is a future.
pub fn instrument_kind(symbol: &str, segment: Segment) -> InstrumentKind {
    if OPTION_RE.is_match(&symbol.to_uppercase()) {
        return InstrumentKind::Option;
    }
    if segment == Segment::Equity {
        return InstrumentKind::Equity;
    }
    InstrumentKind::Future
}
