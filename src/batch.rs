//! Bill generation over multi-account admin exports.
//!
//! Admin exports carry every client's trades in one file, keyed by an
//! account column. The batch splits both files per account, runs the
//! standard pipeline for each one and collects per-account failures
//! instead of aborting the remaining accounts.

use crate::bill::Bill;
use crate::error::BillError;
use crate::rate_card::RateCard;
use crate::raw::{RawExport, TableExport};
use crate::types::{AccountId, FileRole, TradeRecord};
use crate::utils::natural_account_key;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// One account (or set of rows) whose bill could not be generated.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Account the failure concerns; absent for rows with an empty
    /// account cell, which cannot be attributed to anyone.
    pub account: Option<AccountId>,
    /// Why the bill was not generated.
    pub reason: String,
}

/// Bills generated from one pair of admin exports.
#[derive(Debug, Clone)]
pub struct BillBatch {
    /// Trade date the batch covers.
    pub trade_date: NaiveDate,
    /// Generated bills in natural account order (`PR7` before `PR0012`).
    pub bills: Vec<Bill>,
    /// Accounts that failed, in the same order; unattributable rows first.
    pub failures: Vec<BatchFailure>,
}

impl BillBatch {
    /// Parses both admin exports and generates one bill per account.
    pub fn from_exports(
        trade_date: NaiveDate,
        daywise: &RawExport,
        netwise: &RawExport,
        card: &RateCard,
    ) -> Result<Self, BillError> {
        let day_records = TableExport::parse(daywise)?.records()?;
        let net_records = TableExport::parse(netwise)?.records()?;
        Self::from_records(trade_date, &day_records, &net_records, card)
    }

    /// Generates one bill per account from already-parsed records.
    ///
    /// An export where no row carries an account identifier is not an
    /// admin export; that aborts the batch. Individual rows with an empty
    /// account cell, and accounts whose bill generation fails, become
    /// [`BatchFailure`] entries without stopping the other accounts.
    pub fn from_records(
        trade_date: NaiveDate,
        day_records: &[TradeRecord],
        net_records: &[TradeRecord],
        card: &RateCard,
    ) -> Result<Self, BillError> {
        let (day_split, day_orphans) = split_by_account(day_records);
        let (net_split, net_orphans) = split_by_account(net_records);
        if day_split.is_empty() {
            return Err(BillError::Batch(
                "daywise export carries no account identifiers".to_string(),
            ));
        }
        if net_split.is_empty() {
            return Err(BillError::Batch(
                "netwise export carries no account identifiers".to_string(),
            ));
        }

        let mut failures = Vec::new();
        for (role, orphans) in [
            (FileRole::Daywise, day_orphans),
            (FileRole::Netwise, net_orphans),
        ] {
            if !orphans.is_empty() {
                warn!(%role, rows = orphans.len(), "rows without an account cell skipped");
                failures.push(BatchFailure {
                    account: None,
                    reason: format!(
                        "{role} rows without an account cell: {}",
                        join_rows(&orphans)
                    ),
                });
            }
        }

        let mut accounts: Vec<AccountId> = day_split
            .keys()
            .chain(net_split.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        accounts.sort_by_key(|id| natural_account_key(&id.0));

        let mut bills = Vec::with_capacity(accounts.len());
        for account in accounts {
            let day = day_split.get(&account).map_or(&[][..], Vec::as_slice);
            let net = net_split.get(&account).map_or(&[][..], Vec::as_slice);
            match Bill::from_records(account.clone(), trade_date, day, net, card) {
                Ok(bill) => bills.push(bill),
                Err(err) => {
                    warn!(%account, error = %err, "bill generation failed for account");
                    failures.push(BatchFailure {
                        account: Some(account),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            bills = bills.len(),
            failures = failures.len(),
            "batch generated"
        );
        Ok(Self {
            trade_date,
            bills,
            failures,
        })
    }

    /// Looks up the generated bill of one account.
    #[inline]
    pub fn by_account(&self, id: &AccountId) -> Option<&Bill> {
        self.bills.iter().find(|bill| bill.account == *id)
    }
}

/// Splits records per account; rows without an account cell are returned
/// separately as their source row numbers.
fn split_by_account(
    records: &[TradeRecord],
) -> (BTreeMap<AccountId, Vec<TradeRecord>>, Vec<usize>) {
    let mut split: BTreeMap<AccountId, Vec<TradeRecord>> = BTreeMap::new();
    let mut orphans = Vec::new();
    for record in records {
        match &record.account {
            Some(account) => split
                .entry(account.clone())
                .or_default()
                .push(record.clone()),
            None => orphans.push(record.row),
        }
    }
    (split, orphans)
}

fn join_rows(rows: &[usize]) -> String {
    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
