#![warn(missing_docs)]
//! Charge computation and bill aggregation for NSE/BSE F&O trade exports.
//!
//! The pipeline takes a per-trade Daywise CSV and a per-instrument
//! Netwise CSV, classifies each trade by exchange and segment, applies a
//! TOML rate card to compute every charge category, and reconciles the
//! two sources into one [`Bill`] ready for JSON output or rendering.

mod batch;
mod bill;
mod charges;
mod classify;
mod edits;
mod error;
mod parser;
mod rate_card;
mod raw;
mod types;
mod utils;

pub use crate::batch::{BatchFailure, BillBatch};
pub use crate::bill::{Bill, BillBuilder};
pub use crate::edits::{LineAddition, LineOverride};
pub use crate::error::{BillError, RowError};
pub use crate::rate_card::{
    BasisSide, EffectiveWindow, Rate, RateCard, RateCardEntry, SlabStep, RATE_CARD_ENV,
};
pub use crate::raw::{RawExport, TableExport};
pub use crate::types::*;
