//! Charge computation over classified trade groups.

use crate::classify;
use crate::error::BillError;
use crate::rate_card::{BasisSide, Rate, RateCard, RateCardEntry, SlabStep};
use crate::types::{
    BillSection, ChargeCategory, ChargeLine, Exchange, InstrumentKind, Money, Segment, Side,
    TradeRecord,
};
use crate::utils::round_half_up;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const KINDS: [InstrumentKind; 3] = [
    InstrumentKind::Future,
    InstrumentKind::Option,
    InstrumentKind::Equity,
];

/// Categories every group must have a rate for. GST is also mandatory but
/// computed last from the other lines.
const REQUIRED: [ChargeCategory; 5] = [
    ChargeCategory::Brokerage,
    ChargeCategory::ExchangeTransaction,
    ChargeCategory::SebiFee,
    ChargeCategory::Stt,
    ChargeCategory::StampDuty,
];

/// Side- and instrument-split turnover sums for one (exchange, segment).
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupBases {
    future_buy: Money,
    future_sell: Money,
    option_buy: Money,
    option_sell: Money,
    equity_buy: Money,
    equity_sell: Money,
    trades: u64,
}

impl GroupBases {
    fn add(&mut self, instrument: InstrumentKind, side: Side, value: Money) {
        let slot = match (instrument, side) {
            (InstrumentKind::Future, Side::Buy) => &mut self.future_buy,
            (InstrumentKind::Future, Side::Sell) => &mut self.future_sell,
            (InstrumentKind::Option, Side::Buy) => &mut self.option_buy,
            (InstrumentKind::Option, Side::Sell) => &mut self.option_sell,
            (InstrumentKind::Equity, Side::Buy) => &mut self.equity_buy,
            (InstrumentKind::Equity, Side::Sell) => &mut self.equity_sell,
        };
        *slot += value;
        self.trades += 1;
    }

    /// Side-filtered turnover of one instrument kind.
    fn value(&self, kind: InstrumentKind, side: BasisSide) -> Money {
        let (buy, sell) = match kind {
            InstrumentKind::Future => (self.future_buy, self.future_sell),
            InstrumentKind::Option => (self.option_buy, self.option_sell),
            InstrumentKind::Equity => (self.equity_buy, self.equity_sell),
        };
        match side {
            BasisSide::Buy => buy,
            BasisSide::Sell => sell,
            BasisSide::Both => buy + sell,
        }
    }

    /// Side-filtered turnover across all instrument kinds.
    fn total(&self, side: BasisSide) -> Money {
        KINDS.iter().map(|kind| self.value(*kind, side)).sum()
    }
}

/// Classifies records and accumulates per-group turnover bases.
pub(crate) fn group_records(
    records: &[TradeRecord],
) -> Result<BTreeMap<(Exchange, Segment), GroupBases>, BillError> {
    let mut groups: BTreeMap<(Exchange, Segment), GroupBases> = BTreeMap::new();
    for record in records {
        let class = classify::classify(record)?;
        groups
            .entry((class.exchange, class.segment))
            .or_default()
            .add(class.instrument, record.side, record.value);
    }
    Ok(groups)
}

/// Computes every charge line for one (exchange, segment) group.
///
/// A missing rate for a required category aborts the computation instead
/// of contributing a zero line. GST is derived last: its basis is the sum
/// of the already rounded GST-applicable amounts of this group.
pub(crate) fn compute_section(
    exchange: Exchange,
    segment: Segment,
    bases: &GroupBases,
    card: &RateCard,
    date: NaiveDate,
) -> Result<BillSection, BillError> {
    let mut lines = Vec::new();

    for category in &REQUIRED {
        let entry = card.resolve(exchange, segment, category, date)?;
        lines.push(line_for(entry, bases));
    }

    let mut extra_names: Vec<String> = card
        .entries_for(exchange, segment, date)
        .filter_map(|entry| match &entry.category {
            ChargeCategory::Other(name) => Some(name.clone()),
            _ => None,
        })
        .collect();
    extra_names.sort();
    extra_names.dedup();
    for name in extra_names {
        let category = ChargeCategory::Other(name);
        let entry = card.resolve(exchange, segment, &category, date)?;
        lines.push(line_for(entry, bases));
    }

    let gst_entry = card.resolve(exchange, segment, &ChargeCategory::Gst, date)?;
    // The contributing amounts are already rounded per their entries, so
    // their sum is the base as-is.
    let gst_base: Money = lines
        .iter()
        .filter(|line| line.gst_applicable)
        .map(|line| line.amount)
        .sum();
    let gst_rate = gst_entry.rate.percent_all().unwrap_or_default();
    lines.push(ChargeLine {
        category: ChargeCategory::Gst,
        label: gst_entry.label.clone(),
        basis: gst_base,
        rate: rate_display(&gst_entry.rate),
        amount: round_half_up(gst_base * gst_rate / Decimal::ONE_HUNDRED, gst_entry.round),
        gst_applicable: false,
    });

    lines.sort_by(|a, b| a.category.cmp(&b.category));
    let subtotal = lines.iter().map(|line| line.amount).sum();
    Ok(BillSection {
        exchange,
        segment,
        lines,
        subtotal,
    })
}

fn line_for(entry: &RateCardEntry, bases: &GroupBases) -> ChargeLine {
    let (basis, raw_amount) = match &entry.rate {
        Rate::Percent { .. } => {
            let mut amount = Decimal::ZERO;
            for kind in KINDS {
                let rate = entry.rate.percent_for(kind).unwrap_or_default();
                amount += bases.value(kind, entry.side) * rate / Decimal::ONE_HUNDRED;
            }
            (bases.total(entry.side), amount)
        }
        Rate::Flat { per_trade } => {
            let count = Decimal::from(bases.trades);
            (count, *per_trade * count)
        }
        Rate::Slab { slab } => {
            let turnover = bases.total(entry.side);
            (turnover, slab_amount(slab, turnover))
        }
    };
    ChargeLine {
        category: entry.category.clone(),
        label: entry.label.clone(),
        basis,
        rate: rate_display(&entry.rate),
        amount: round_half_up(raw_amount, entry.round),
        gst_applicable: entry.gst,
    }
}

/// Progressive slab amount: each step's rate applies only to the portion
/// of the turnover falling inside that step.
fn slab_amount(slab: &[SlabStep], turnover: Money) -> Money {
    let mut amount = Decimal::ZERO;
    let mut floor = Decimal::ZERO;
    for step in slab {
        let ceiling = step.upto.unwrap_or(turnover).min(turnover);
        if ceiling > floor {
            amount += (ceiling - floor) * step.percent / Decimal::ONE_HUNDRED;
        }
        match step.upto {
            Some(bound) if bound < turnover => floor = bound,
            _ => break,
        }
    }
    amount
}

/// Human-readable form of an applied rate.
fn rate_display(rate: &Rate) -> String {
    match rate {
        Rate::Percent {
            future,
            option,
            equity,
            all,
        } => {
            let mut parts = Vec::new();
            if let Some(rate) = future {
                parts.push(format!("fut {rate}%"));
            }
            if let Some(rate) = option {
                parts.push(format!("opt {rate}%"));
            }
            if let Some(rate) = equity {
                parts.push(format!("eq {rate}%"));
            }
            if let Some(rate) = all {
                if parts.is_empty() {
                    return format!("{rate}%");
                }
                parts.push(format!("other {rate}%"));
            }
            parts.join(" / ")
        }
        Rate::Flat { per_trade } => format!("{per_trade} per trade"),
        Rate::Slab { slab } => format!("slab ({} steps)", slab.len()),
    }
}

/// Sell value minus buy value across the records.
pub(crate) fn net_traded_amount(records: &[TradeRecord]) -> Money {
    let mut buy = Decimal::ZERO;
    let mut sell = Decimal::ZERO;
    for record in records {
        match record.side {
            Side::Buy => buy += record.value,
            Side::Sell => sell += record.value,
        }
    }
    sell - buy
}
