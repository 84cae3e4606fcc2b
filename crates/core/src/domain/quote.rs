use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Actives,
    Gainers,
}

impl SnapshotKind {
    /// Path segment used by the quote provider's market-movers endpoints.
    pub fn endpoint(self) -> &'static str {
        match self {
            SnapshotKind::Actives => "actives",
            SnapshotKind::Gainers => "gainers",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
}

/// One fetch cycle's ranked listing. Order is the provider's ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub records: Vec<QuoteRecord>,
}

impl Snapshot {
    pub fn new(kind: SnapshotKind, records: Vec<QuoteRecord>) -> Self {
        Self { kind, records }
    }

    pub fn empty(kind: SnapshotKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.symbol.as_str()).collect()
    }

    /// Keeps records matching `keep`, preserving order.
    pub fn retain_by(self, keep: impl Fn(&QuoteRecord) -> bool) -> Self {
        let records = self.records.into_iter().filter(|r| keep(r)).collect();
        Self::new(self.kind, records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub min_price: Decimal,
    pub max_price: Decimal,
}

impl FilterCriteria {
    pub fn new(min_price: Decimal, max_price: Decimal) -> Self {
        Self {
            min_price,
            max_price,
        }
    }

    // An inverted band matches nothing.
    pub fn contains(&self, price: Decimal) -> bool {
        self.min_price <= price && price <= self.max_price
    }
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${:.2} - ${:.2}",
            round_2dp(self.min_price),
            round_2dp(self.max_price)
        )
    }
}

/// Half-up rounding to cents. `{:.2}` on a `Decimal` truncates.
pub fn round_2dp(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Single-symbol quote lookup result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDetail {
    #[serde(flatten)]
    pub quote: QuoteRecord,
    pub volume: Option<u64>,
}
