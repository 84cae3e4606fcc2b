use crate::domain::quote::Snapshot;

// Lowercase. "reverse split" is implied by "split" but is listed so the marker set reads
// the same as the corporate actions it targets.
const CORPORATE_ACTION_MARKERS: [&str; 3] = ["split", "merge", "reverse split"];

/// Name-based heuristic for reverse splits and mergers.
///
/// Their nominal gains look like real moves numerically, so the issuer name is the only
/// signal available. Untagged corporate actions pass through.
pub fn is_corporate_action_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    CORPORATE_ACTION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

pub fn exclude_corporate_actions(snapshot: Snapshot) -> Snapshot {
    snapshot.retain_by(|r| !is_corporate_action_name(&r.name))
}
