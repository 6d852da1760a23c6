//! Operator edits over a computed bill.
//!
//! Edits never recompute from source data: overrides replace single line
//! amounts, additions append custom lines, and only the per-section GST
//! line is re-derived from the edited base. The input bill is untouched;
//! editing yields a new one.

use crate::bill::Bill;
use crate::error::BillError;
use crate::rate_card::RateCard;
use crate::types::{ChargeCategory, ChargeLine, Exchange, Money, Segment};
use crate::utils::round_half_up;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Operator override of one computed charge line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineOverride {
    /// Exchange of the targeted section.
    pub exchange: Exchange,
    /// Segment of the targeted section.
    pub segment: Segment,
    /// Category of the line to replace.
    pub category: ChargeCategory,
    /// Replacement amount; the sign is ignored.
    pub amount: Money,
}

/// Operator-added custom charge line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAddition {
    /// Exchange of the section the line is added to.
    pub exchange: Exchange,
    /// Segment of the section the line is added to.
    pub segment: Segment,
    /// Display name; surrounding and repeated whitespace is collapsed.
    pub label: String,
    /// Charge amount; the sign is ignored.
    pub amount: Money,
    /// Whether the amount feeds the section's GST base.
    #[serde(default)]
    pub gst_applicable: bool,
}

impl Bill {
    /// Applies operator edits and returns the adjusted bill.
    ///
    /// Overrides must name an existing line; additions must name a new
    /// charge (matching an existing name, case-insensitively, is
    /// rejected) and target an existing section. GST is recomputed per
    /// section from the edited GST base unless the GST line itself was
    /// overridden. Subtotals and totals are recomputed; audit detail and
    /// reconciliation warnings are carried over unchanged.
    pub fn apply_edits(
        &self,
        card: &RateCard,
        overrides: &[LineOverride],
        additions: &[LineAddition],
    ) -> Result<Self, BillError> {
        let mut bill = self.clone();
        let mut gst_overridden: BTreeSet<(Exchange, Segment)> = BTreeSet::new();

        for over in overrides {
            let section = bill
                .sections
                .iter_mut()
                .find(|s| s.exchange == over.exchange && s.segment == over.segment)
                .ok_or_else(|| {
                    BillError::Edit(format!(
                        "no {} {} section to override",
                        over.exchange, over.segment
                    ))
                })?;
            let line = section
                .lines
                .iter_mut()
                .find(|line| line.category == over.category)
                .ok_or_else(|| {
                    BillError::Edit(format!(
                        "no '{}' line in {} {}",
                        over.category, over.exchange, over.segment
                    ))
                })?;
            line.amount = over.amount.abs();
            if over.category == ChargeCategory::Gst {
                gst_overridden.insert((over.exchange, over.segment));
            }
        }

        let mut seen: BTreeSet<String> = bill
            .sections
            .iter()
            .flat_map(|section| section.lines.iter())
            .map(|line| name_key(&line.label))
            .collect();
        for addition in additions {
            let display = display_name(&addition.label);
            if display.is_empty() {
                return Err(BillError::Edit("custom charge name is required".to_string()));
            }
            let category = ChargeCategory::from(display.clone());
            if !matches!(category, ChargeCategory::Other(_)) || !seen.insert(name_key(&display)) {
                return Err(BillError::Edit(
                    "Charge already exists; edit it instead.".to_string(),
                ));
            }
            let section = bill
                .sections
                .iter_mut()
                .find(|s| s.exchange == addition.exchange && s.segment == addition.segment)
                .ok_or_else(|| {
                    BillError::Edit(format!(
                        "no {} {} section for custom charge '{display}'",
                        addition.exchange, addition.segment
                    ))
                })?;
            section.lines.push(ChargeLine {
                category,
                label: display,
                basis: Decimal::ZERO,
                rate: "manual".to_string(),
                amount: addition.amount.abs(),
                gst_applicable: addition.gst_applicable,
            });
        }

        for section in &mut bill.sections {
            let base: Money = section
                .lines
                .iter()
                .filter(|line| line.gst_applicable)
                .map(|line| line.amount)
                .sum();
            let entry = card.resolve(
                section.exchange,
                section.segment,
                &ChargeCategory::Gst,
                bill.trade_date,
            )?;
            if let Some(line) = section
                .lines
                .iter_mut()
                .find(|line| line.category == ChargeCategory::Gst)
            {
                line.basis = base;
                if !gst_overridden.contains(&(section.exchange, section.segment)) {
                    let rate = entry.rate.percent_all().unwrap_or_default();
                    line.amount =
                        round_half_up(base * rate / Decimal::ONE_HUNDRED, entry.round);
                }
            }
            section.lines.sort_by(|a, b| a.category.cmp(&b.category));
            section.subtotal = section.lines.iter().map(|line| line.amount).sum();
        }

        bill.charges_total = round_half_up(
            bill.sections.iter().map(|section| section.subtotal).sum(),
            2,
        );
        bill.total_payable = bill.net_amount - bill.charges_total;
        Ok(bill)
    }
}

/// Collapses surrounding and repeated whitespace, preserving case.
fn display_name(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive identity of a charge name.
fn name_key(value: &str) -> String {
    display_name(value).to_lowercase()
}
