//! Bill assembly from the two exports.
//!
//! Netwise figures are the source of truth for the billed sections; the
//! Daywise file feeds audit detail (per-symbol positions, its own section
//! breakdown) and the reconciliation check between the two.

use crate::charges;
use crate::error::BillError;
use crate::rate_card::RateCard;
use crate::raw::{RawExport, TableExport};
use crate::types::{
    AccountId, BillSection, Exchange, Money, PositionRow, PositionTotals, ReconciliationWarning,
    Segment, Side, TradeRecord,
};
use crate::utils::round_half_up;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Knobs for bill generation (internal type).
#[derive(Debug, Clone, Copy)]
pub(crate) struct GenerateOptions {
    pub tolerance: Option<Money>,
    pub audit_detail: bool,
}

impl GenerateOptions {
    /// Per-section default tolerance, full audit detail.
    pub const fn standard() -> Self {
        Self {
            tolerance: None,
            audit_detail: true,
        }
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::standard()
    }
}

/// Final bill for one account and trade date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Account the bill belongs to.
    pub account: AccountId,
    /// Trade date the bill covers.
    pub trade_date: NaiveDate,
    /// Netwise-derived sections in display order.
    pub sections: Vec<BillSection>,
    /// Sum of section subtotals, rounded to the currency minor unit.
    pub charges_total: Money,
    /// Daywise-derived sections kept for audit display.
    pub daywise_sections: Vec<BillSection>,
    /// Per-symbol positions aggregated from the Daywise records.
    pub positions: Vec<PositionRow>,
    /// Totals over all position rows.
    pub position_totals: PositionTotals,
    /// Daywise sell value minus buy value.
    pub net_amount: Money,
    /// Net traded amount minus total charges.
    pub total_payable: Money,
    /// Sections whose Daywise and Netwise subtotals diverge.
    pub warnings: Vec<ReconciliationWarning>,
}

impl Bill {
    /// Generates a bill from the two decoded exports, with full audit
    /// detail and the default reconciliation tolerance.
    #[inline]
    pub fn generate(
        account: &str,
        trade_date: NaiveDate,
        daywise: &RawExport,
        netwise: &RawExport,
        card: &RateCard,
    ) -> Result<Self, BillError> {
        Self::generate_with_options(
            account,
            trade_date,
            daywise,
            netwise,
            card,
            GenerateOptions::standard(),
        )
    }

    /// Generates a bill with explicit options (used by the builder).
    pub(crate) fn generate_with_options(
        account: &str,
        trade_date: NaiveDate,
        daywise: &RawExport,
        netwise: &RawExport,
        card: &RateCard,
        options: GenerateOptions,
    ) -> Result<Self, BillError> {
        let day_records = TableExport::parse(daywise)?.records()?;
        let net_records = TableExport::parse(netwise)?.records()?;
        Self::from_records_with_options(
            AccountId(account.to_string()),
            trade_date,
            &day_records,
            &net_records,
            card,
            options,
        )
    }

    /// Builds a bill from already-parsed records.
    ///
    /// Unlike the file-level entry points, empty record slices are
    /// accepted here; an export missing one account's rows yields a bill
    /// with zero charges on that side and reconciliation warnings.
    #[inline]
    pub fn from_records(
        account: AccountId,
        trade_date: NaiveDate,
        day_records: &[TradeRecord],
        net_records: &[TradeRecord],
        card: &RateCard,
    ) -> Result<Self, BillError> {
        Self::from_records_with_options(
            account,
            trade_date,
            day_records,
            net_records,
            card,
            GenerateOptions::standard(),
        )
    }

    pub(crate) fn from_records_with_options(
        account: AccountId,
        trade_date: NaiveDate,
        day_records: &[TradeRecord],
        net_records: &[TradeRecord],
        card: &RateCard,
        options: GenerateOptions,
    ) -> Result<Self, BillError> {
        let day_groups = charges::group_records(day_records)?;
        let net_groups = charges::group_records(net_records)?;

        let mut sections = Vec::with_capacity(net_groups.len());
        for (&(exchange, segment), bases) in &net_groups {
            sections.push(charges::compute_section(
                exchange, segment, bases, card, trade_date,
            )?);
        }
        let mut daywise_sections = Vec::with_capacity(day_groups.len());
        for (&(exchange, segment), bases) in &day_groups {
            daywise_sections.push(charges::compute_section(
                exchange, segment, bases, card, trade_date,
            )?);
        }

        let warnings = reconcile(&sections, &daywise_sections, options.tolerance);
        let charges_total = round_half_up(sections.iter().map(|s| s.subtotal).sum(), 2);
        let net_amount = round_half_up(charges::net_traded_amount(day_records), 2);
        let total_payable = net_amount - charges_total;

        let (positions, position_totals) = if options.audit_detail {
            aggregate_positions(day_records)
        } else {
            (Vec::new(), PositionTotals::default())
        };
        if !options.audit_detail {
            daywise_sections.clear();
        }

        info!(
            account = %account,
            sections = sections.len(),
            warnings = warnings.len(),
            %charges_total,
            "bill assembled"
        );
        Ok(Self {
            account,
            trade_date,
            sections,
            charges_total,
            daywise_sections,
            positions,
            position_totals,
            net_amount,
            total_payable,
            warnings,
        })
    }
}

/// Compares per-section subtotals between the two sources.
///
/// A section present in only one source is compared against zero. The
/// default tolerance grants one minor currency unit per charge line of
/// the section, so per-line rounding alone never triggers a warning.
fn reconcile(
    netwise: &[BillSection],
    daywise: &[BillSection],
    tolerance: Option<Money>,
) -> Vec<ReconciliationWarning> {
    let net: BTreeMap<(Exchange, Segment), &BillSection> = netwise
        .iter()
        .map(|section| ((section.exchange, section.segment), section))
        .collect();
    let day: BTreeMap<(Exchange, Segment), &BillSection> = daywise
        .iter()
        .map(|section| ((section.exchange, section.segment), section))
        .collect();
    let keys: BTreeSet<(Exchange, Segment)> = net.keys().chain(day.keys()).copied().collect();

    let mut warnings = Vec::new();
    for (exchange, segment) in keys {
        let net_section = net.get(&(exchange, segment)).copied();
        let day_section = day.get(&(exchange, segment)).copied();
        let net_subtotal = net_section.map_or(Decimal::ZERO, |section| section.subtotal);
        let day_subtotal = day_section.map_or(Decimal::ZERO, |section| section.subtotal);
        let difference = net_subtotal - day_subtotal;
        let lines = net_section
            .or(day_section)
            .map_or(0, |section| section.lines.len());
        let allowed = tolerance.unwrap_or_else(|| Decimal::new(1, 2) * Decimal::from(lines));
        if difference.abs() > allowed {
            warn!(
                %exchange,
                %segment,
                %difference,
                tolerance = %allowed,
                "daywise and netwise charges diverge"
            );
            warnings.push(ReconciliationWarning {
                exchange,
                segment,
                difference,
                tolerance: allowed,
            });
        }
    }
    warnings
}

/// Folds Daywise records into per-symbol position rows plus totals.
fn aggregate_positions(records: &[TradeRecord]) -> (Vec<PositionRow>, PositionTotals) {
    let mut map: BTreeMap<(String, String), PositionRow> = BTreeMap::new();
    for record in records {
        let row = map
            .entry((record.symbol.clone(), record.venue.clone()))
            .or_insert_with(|| PositionRow {
                symbol: record.symbol.clone(),
                venue: record.venue.clone(),
                buy_qty: Decimal::ZERO,
                buy_value: Decimal::ZERO,
                sell_qty: Decimal::ZERO,
                sell_value: Decimal::ZERO,
                net_qty: Decimal::ZERO,
                net_value: Decimal::ZERO,
            });
        match record.side {
            Side::Buy => {
                row.buy_qty += record.quantity;
                row.buy_value += record.value;
            }
            Side::Sell => {
                row.sell_qty += record.quantity;
                row.sell_value += record.value;
            }
        }
    }

    let mut totals = PositionTotals::default();
    let mut rows: Vec<PositionRow> = map.into_values().collect();
    for row in &mut rows {
        row.net_qty = row.buy_qty - row.sell_qty;
        row.net_value = row.sell_value - row.buy_value;
        totals.buy_qty += row.buy_qty;
        totals.buy_value += row.buy_value;
        totals.sell_qty += row.sell_qty;
        totals.sell_value += row.sell_value;
    }
    totals.net_value = totals.sell_value - totals.buy_value;
    (rows, totals)
}

/// Builder for generating a [`Bill`] with adjusted settings.
pub struct BillBuilder<'a> {
    account: &'a str,
    trade_date: NaiveDate,
    daywise: &'a RawExport,
    netwise: &'a RawExport,
    card: &'a RateCard,
    options: GenerateOptions,
}

impl<'a> BillBuilder<'a> {
    /// Creates a builder over the two decoded exports.
    ///
    /// # Example
    ///
    /// ```
    /// # use chrono::NaiveDate;
    /// # use fno_billing::{BillBuilder, FileRole, RateCard, RawExport};
    /// # let day = RawExport::from_text(
    /// #     "TradeDate,ExchgSeg,Symbol,Side,Qty,Price\n01-04-2025,NSE_FNO,NIFTY 24APR25 FUT,B,50,101.50\n",
    /// #     FileRole::Daywise,
    /// # ).unwrap();
    /// # let net = RawExport::from_text(
    /// #     "TradeDate,ExchgSeg,Symbol,Side,Qty,Price\n01-04-2025,NSE_FNO,NIFTY 24APR25 FUT,B,50,101.50\n",
    /// #     FileRole::Netwise,
    /// # ).unwrap();
    /// # let card = RateCard::from_toml_str(
    /// #     r#"entry = [{ exchange = "NSE", segment = "FO", category = "brokerage", label = "Brokerage", rate = { kind = "flat", per_trade = 20 } }]"#,
    /// #     "inline",
    /// # ).unwrap();
    /// let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
    /// let bill = BillBuilder::new("PR001", date, &day, &net, &card)
    ///     .audit_detail(false)
    ///     .generate();
    /// ```
    #[inline]
    pub fn new(
        account: &'a str,
        trade_date: NaiveDate,
        daywise: &'a RawExport,
        netwise: &'a RawExport,
        card: &'a RateCard,
    ) -> Self {
        Self {
            account,
            trade_date,
            daywise,
            netwise,
            card,
            options: GenerateOptions::standard(),
        }
    }

    /// Replaces the per-section tolerance with an absolute value.
    #[inline]
    pub const fn tolerance(mut self, value: Money) -> Self {
        self.options.tolerance = Some(value);
        self
    }

    /// Enables or disables Daywise audit detail on the bill.
    #[inline]
    pub const fn audit_detail(mut self, enabled: bool) -> Self {
        self.options.audit_detail = enabled;
        self
    }

    /// Generates the bill with the current settings.
    #[inline]
    pub fn generate(self) -> Result<Bill, BillError> {
        Bill::generate_with_options(
            self.account,
            self.trade_date,
            self.daywise,
            self.netwise,
            self.card,
            self.options,
        )
    }
}
