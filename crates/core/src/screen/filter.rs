use crate::domain::quote::{FilterCriteria, Snapshot};
use rust_decimal::Decimal;

/// Keeps records priced inside `criteria` (both bounds inclusive).
pub fn filter_by_price(snapshot: Snapshot, criteria: &FilterCriteria) -> Snapshot {
    snapshot.retain_by(|r| criteria.contains(r.price))
}

/// Gain-validity predicate: raw change and percent change must both be strictly positive.
///
/// Gainer listings occasionally carry zero-change rows or rows where the sign of the raw
/// change disagrees with the percentage; neither is a genuine gain.
pub fn retain_genuine_gainers(snapshot: Snapshot) -> Snapshot {
    snapshot.retain_by(|r| r.change > Decimal::ZERO && r.change_percent > Decimal::ZERO)
}
