use crate::domain::digest::{AlertDigest, MAX_DIGEST_ENTRIES};
use crate::domain::quote::{round_2dp, FilterCriteria, Snapshot};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt::Write;

/// Builds the alert digest from an already screened snapshot.
///
/// Returns `None` for an empty snapshot; no alert is ever produced for an empty result.
/// Takes the first `MAX_DIGEST_ENTRIES` records as ranked upstream.
pub fn format_digest(
    snapshot: &Snapshot,
    criteria: FilterCriteria,
    generated_at: NaiveDateTime,
) -> Option<AlertDigest> {
    if snapshot.is_empty() {
        return None;
    }

    let entries = snapshot
        .records
        .iter()
        .take(MAX_DIGEST_ENTRIES)
        .cloned()
        .collect();

    Some(AlertDigest {
        generated_at,
        price_range: criteria,
        entries,
    })
}

impl AlertDigest {
    /// Telegram legacy Markdown body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("*📈 Top gainers*\n");
        let _ = writeln!(
            out,
            "Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M")
        );
        let _ = writeln!(out, "Price range: {}", self.price_range);

        for (idx, q) in self.entries.iter().enumerate() {
            let _ = write!(
                out,
                "\n{}. *{}* {}\n   Price: ${:.2} | Change: {} ({}%)",
                idx + 1,
                escape_markdown(&q.symbol),
                escape_markdown(&q.name),
                round_2dp(q.price),
                signed(q.change),
                signed(q.change_percent),
            );
        }

        out
    }
}

fn signed(v: Decimal) -> String {
    let v = round_2dp(v);
    if v.is_sign_negative() && !v.is_zero() {
        format!("{v:.2}")
    } else {
        format!("+{:.2}", v.abs())
    }
}

// Legacy Markdown only treats these as entities.
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::{QuoteRecord, SnapshotKind};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(i: usize) -> QuoteRecord {
        QuoteRecord {
            symbol: format!("S{i}"),
            name: format!("Stock {i}"),
            price: dec!(10),
            change: dec!(1),
            change_percent: dec!(10),
        }
    }

    fn band() -> FilterCriteria {
        FilterCriteria::new(dec!(1), dec!(55))
    }

    #[test]
    fn empty_snapshot_yields_no_digest() {
        let s = Snapshot::empty(SnapshotKind::Gainers);
        assert!(format_digest(&s, band(), at(17, 0)).is_none());
    }

    #[test]
    fn digest_is_capped_and_keeps_upstream_order() {
        let s = Snapshot::new(SnapshotKind::Gainers, (0..12).map(record).collect());
        let d = format_digest(&s, band(), at(17, 0)).unwrap();
        assert_eq!(d.entries.len(), MAX_DIGEST_ENTRIES);
        let symbols: Vec<_> = d.entries.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["S0", "S1", "S2", "S3", "S4"]);
    }

    #[test]
    fn short_snapshot_is_taken_whole() {
        let s = Snapshot::new(SnapshotKind::Gainers, (0..2).map(record).collect());
        let d = format_digest(&s, band(), at(17, 0)).unwrap();
        assert_eq!(d.entries.len(), 2);
    }

    #[test]
    fn renders_two_decimals_with_explicit_sign() {
        let s = Snapshot::new(
            SnapshotKind::Gainers,
            vec![QuoteRecord {
                symbol: "AAA".to_string(),
                name: "AAA Inc".to_string(),
                price: dec!(10),
                change: dec!(1.5),
                change_percent: dec!(15),
            }],
        );
        let text = format_digest(&s, band(), at(17, 2)).unwrap().render();

        assert!(text.contains("Generated: 2026-10-19 17:02"));
        assert!(text.contains("Price range: $1.00 - $55.00"));
        assert!(text.contains("1. *AAA* AAA Inc"));
        assert!(text.contains("Price: $10.00 | Change: +1.50 (+15.00%)"));
    }

    #[test]
    fn rounds_to_cents_instead_of_truncating() {
        let s = Snapshot::new(
            SnapshotKind::Gainers,
            vec![QuoteRecord {
                symbol: "RND".to_string(),
                name: "Rounding Co".to_string(),
                price: dec!(1.239),
                change: dec!(0.126),
                change_percent: dec!(11.999),
            }],
        );
        let text = format_digest(&s, band(), at(17, 2)).unwrap().render();
        assert!(text.contains("Price: $1.24 | Change: +0.13 (+12.00%)"), "{text}");
    }

    #[test]
    fn tiny_negative_change_rounds_to_plus_zero() {
        assert_eq!(signed(dec!(-0.004)), "+0.00");
        assert_eq!(signed(dec!(-1.235)), "-1.24");
    }

    #[test]
    fn escapes_markdown_entities_in_names() {
        assert_eq!(escape_markdown("FOO_BAR *Holdings*"), "FOO\\_BAR \\*Holdings\\*");
    }
}
