//! Rate card loading, validation and lookup.
//!
//! The card is a TOML array of `[[entry]]` tables, each keyed by
//! (exchange, segment, category). Lookup returns exactly one active entry
//! or fails; ambiguity is never resolved by picking the first match.

use crate::error::BillError;
use crate::types::{ChargeCategory, Exchange, InstrumentKind, Money, Segment};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the rate-card location.
pub const RATE_CARD_ENV: &str = "RATE_CARD_PATH";

const DEFAULT_PATH: &str = "config/rate_card.toml";
const FALLBACK_PATH: &str = "config/fo_charges_formula.toml";

/// Which side of the turnover a charge is levied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasisSide {
    /// Buy-side value only.
    Buy,
    /// Sell-side value only.
    Sell,
    /// Buy plus sell value.
    #[default]
    Both,
}

/// Rate expression of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Rate {
    /// Percentage of turnover, split per instrument kind.
    Percent {
        /// Rate for futures turnover, per cent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        future: Option<Money>,
        /// Rate for options turnover, per cent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        option: Option<Money>,
        /// Rate for equity turnover, per cent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equity: Option<Money>,
        /// Rate for any kind without a specific rate, per cent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        all: Option<Money>,
    },
    /// Fixed amount per executed trade.
    Flat {
        /// Charge per trade.
        per_trade: Money,
    },
    /// Progressive slabs over side-filtered turnover.
    Slab {
        /// Ascending steps; the last one is open-ended.
        slab: Vec<SlabStep>,
    },
}

impl Rate {
    /// Percent rate applying to the given instrument kind, if this is a
    /// percent rate; the `all` rate covers kinds without a specific one.
    pub fn percent_for(&self, kind: InstrumentKind) -> Option<Money> {
        match self {
            Self::Percent {
                future,
                option,
                equity,
                all,
            } => {
                let specific = match kind {
                    InstrumentKind::Future => *future,
                    InstrumentKind::Option => *option,
                    InstrumentKind::Equity => *equity,
                };
                specific.or(*all)
            }
            Self::Flat { .. } | Self::Slab { .. } => None,
        }
    }

    /// The kind-independent `all` rate of a percent entry. GST entries
    /// are validated to define it.
    pub const fn percent_all(&self) -> Option<Money> {
        match self {
            Self::Percent { all, .. } => *all,
            Self::Flat { .. } | Self::Slab { .. } => None,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Self::Percent {
                future,
                option,
                equity,
                all,
            } => [future, option, equity, all]
                .iter()
                .all(|rate| rate.unwrap_or_default().is_zero()),
            Self::Flat { per_trade } => per_trade.is_zero(),
            Self::Slab { slab } => slab.iter().all(|step| step.percent.is_zero()),
        }
    }
}

/// One step of a progressive slab ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabStep {
    /// Upper turnover bound of this step; absent on the open-ended tail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upto: Option<Money>,
    /// Rate for the portion falling in this step, per cent.
    pub percent: Money,
}

/// Optional validity window of an entry, both bounds inclusive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectiveWindow {
    /// First day the entry applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Last day the entry applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl EffectiveWindow {
    /// Whether the window covers the given date.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| from <= date) && self.to.is_none_or(|to| date <= to)
    }
}

/// One charge rule from the rate card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCardEntry {
    /// Exchange the rule applies to.
    pub exchange: Exchange,
    /// Segment the rule applies to.
    pub segment: Segment,
    /// Charge category this rule prices.
    pub category: ChargeCategory,
    /// Display label for the bill line.
    pub label: String,
    /// Side of the turnover the charge is levied on.
    #[serde(default)]
    pub side: BasisSide,
    /// Whether the computed amount feeds the GST base.
    #[serde(default)]
    pub gst: bool,
    /// Decimal places the computed amount is rounded to.
    #[serde(default = "default_round")]
    pub round: u32,
    /// Rate expression.
    pub rate: Rate,
    /// Validity window; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective: Option<EffectiveWindow>,
}

const fn default_round() -> u32 {
    2
}

impl RateCardEntry {
    /// Whether the entry is active on the given date.
    pub fn active_on(&self, date: NaiveDate) -> bool {
        self.effective
            .as_ref()
            .is_none_or(|window| window.contains(date))
    }
}

#[derive(Debug, Deserialize)]
struct CardFile {
    #[serde(default, rename = "entry")]
    entries: Vec<RateCardEntry>,
}

/// Loaded and validated charge-rate schedule.
#[derive(Debug, Clone)]
pub struct RateCard {
    source: String,
    entries: Vec<RateCardEntry>,
}

impl RateCard {
    /// Loads and validates the card at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BillError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Locates the card (environment override, then the default and the
    /// documented fallback location) and loads it.
    pub fn load_default() -> Result<Self, BillError> {
        Self::load(Self::locate()?)
    }

    /// Resolves the rate-card path without loading it.
    pub fn locate() -> Result<PathBuf, BillError> {
        if let Ok(env_path) = env::var(RATE_CARD_ENV) {
            let path = PathBuf::from(env_path);
            if !path.exists() {
                return Err(BillError::RateCard(format!(
                    "rate card not found at {}",
                    path.display()
                )));
            }
            return Ok(path);
        }
        for candidate in [DEFAULT_PATH, FALLBACK_PATH] {
            let path = Path::new(candidate);
            if path.exists() {
                return Ok(path.to_path_buf());
            }
        }
        Err(BillError::RateCard(format!(
            "rate card not found; set {RATE_CARD_ENV} or place the file at {DEFAULT_PATH}"
        )))
    }

    /// Parses and validates a card from TOML text. `source` names the
    /// origin in error messages.
    pub fn from_toml_str(text: &str, source: &str) -> Result<Self, BillError> {
        let file: CardFile =
            toml::from_str(text).map_err(|err| BillError::RateCard(format!("{source}: {err}")))?;
        let card = Self {
            source: source.to_string(),
            entries: file.entries,
        };
        card.validate()?;
        Ok(card)
    }

    /// Where this card was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All entries in the card.
    pub fn entries(&self) -> &[RateCardEntry] {
        &self.entries
    }

    /// Returns the single entry active for the key on `date`.
    pub fn resolve(
        &self,
        exchange: Exchange,
        segment: Segment,
        category: &ChargeCategory,
        date: NaiveDate,
    ) -> Result<&RateCardEntry, BillError> {
        let mut matches = self.entries.iter().filter(|entry| {
            entry.exchange == exchange
                && entry.segment == segment
                && entry.category == *category
                && entry.active_on(date)
        });
        let Some(first) = matches.next() else {
            return Err(BillError::RateNotFound {
                exchange,
                segment,
                category: category.clone(),
            });
        };
        let extra = matches.count();
        if extra > 0 {
            return Err(BillError::AmbiguousRate {
                exchange,
                segment,
                category: category.clone(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// All entries active for the (exchange, segment) pair on `date`.
    pub fn entries_for(
        &self,
        exchange: Exchange,
        segment: Segment,
        date: NaiveDate,
    ) -> impl Iterator<Item = &RateCardEntry> {
        self.entries.iter().filter(move |entry| {
            entry.exchange == exchange && entry.segment == segment && entry.active_on(date)
        })
    }

    /// Merges entries for exchanges entirely absent from this card from
    /// `fallback`. The fallback is never consulted per missing key, so two
    /// schedules are not mixed within one exchange.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Self) -> Self {
        let Self {
            source: fallback_source,
            entries: fallback_entries,
        } = fallback;
        let covered: BTreeSet<Exchange> = self.entries.iter().map(|e| e.exchange).collect();
        let before = self.entries.len();
        self.entries.extend(
            fallback_entries
                .into_iter()
                .filter(|entry| !covered.contains(&entry.exchange)),
        );
        let merged = self.entries.len() - before;
        if merged > 0 {
            info!(
                source = %fallback_source,
                merged,
                "merged fallback rate entries for uncovered exchanges"
            );
        }
        self
    }

    fn validate(&self) -> Result<(), BillError> {
        if self.entries.is_empty() {
            return Err(BillError::RateCard(format!(
                "{}: card defines no entries",
                self.source
            )));
        }
        for entry in &self.entries {
            let ctx = format!("{} {} '{}'", entry.exchange, entry.segment, entry.category);
            let label = entry.label.trim();
            if label.is_empty() {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} has an empty label",
                    self.source
                )));
            }
            if label.parse::<Decimal>().is_ok() {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} label is numeric-like: '{label}'",
                    self.source
                )));
            }
            self.validate_rate(&ctx, entry)?;
            if entry.category == ChargeCategory::Gst
                && !matches!(entry.rate, Rate::Percent { all: Some(_), .. })
            {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} must define a percent rate with 'all'",
                    self.source
                )));
            }
            if let Some(window) = &entry.effective {
                if let (Some(from), Some(to)) = (window.from, window.to) {
                    if from > to {
                        return Err(BillError::RateCard(format!(
                            "{}: {ctx} effective window is empty ({from} > {to})",
                            self.source
                        )));
                    }
                }
            }
            if entry.category == ChargeCategory::ExchangeTransaction && entry.rate.is_zero() {
                warn!(
                    exchange = %entry.exchange,
                    segment = %entry.segment,
                    "exchange transaction rate is zero; check the card against the broker schedule"
                );
            }
        }
        Ok(())
    }

    fn validate_rate(&self, ctx: &str, entry: &RateCardEntry) -> Result<(), BillError> {
        match &entry.rate {
            Rate::Percent {
                future,
                option,
                equity,
                all,
            } => {
                let rates = [future, option, equity, all];
                if rates.iter().all(|rate| rate.is_none()) {
                    return Err(BillError::RateCard(format!(
                        "{}: {ctx} defines no percent rates",
                        self.source
                    )));
                }
                if rates
                    .iter()
                    .filter_map(|rate| **rate)
                    .any(|rate| rate < Decimal::ZERO)
                {
                    return Err(BillError::RateCard(format!(
                        "{}: {ctx} has a negative rate",
                        self.source
                    )));
                }
            }
            Rate::Flat { per_trade } => {
                if *per_trade < Decimal::ZERO {
                    return Err(BillError::RateCard(format!(
                        "{}: {ctx} has a negative per-trade charge",
                        self.source
                    )));
                }
            }
            Rate::Slab { slab } => self.validate_slab(ctx, slab)?,
        }
        Ok(())
    }

    fn validate_slab(&self, ctx: &str, slab: &[SlabStep]) -> Result<(), BillError> {
        let Some((tail, body)) = slab.split_last() else {
            return Err(BillError::RateCard(format!(
                "{}: {ctx} slab ladder is empty",
                self.source
            )));
        };
        if tail.upto.is_some() {
            return Err(BillError::RateCard(format!(
                "{}: {ctx} slab ladder must end with an open-ended step",
                self.source
            )));
        }
        let mut previous: Option<Money> = None;
        for step in body {
            let Some(bound) = step.upto else {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} slab ladder has an open-ended step before the tail",
                    self.source
                )));
            };
            if bound <= Decimal::ZERO {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} slab bound must be positive",
                    self.source
                )));
            }
            if previous.is_some_and(|prev| bound <= prev) {
                return Err(BillError::RateCard(format!(
                    "{}: {ctx} slab bounds must ascend",
                    self.source
                )));
            }
            previous = Some(bound);
        }
        if slab.iter().any(|step| step.percent < Decimal::ZERO) {
            return Err(BillError::RateCard(format!(
                "{}: {ctx} has a negative slab rate",
                self.source
            )));
        }
        Ok(())
    }
}
