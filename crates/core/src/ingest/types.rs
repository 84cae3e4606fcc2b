use crate::domain::quote::{QuoteDetail, QuoteRecord};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

// Provider field-name variants, first match wins.
const SYMBOL_KEYS: &[&str] = &["symbol", "ticker"];
const NAME_KEYS: &[&str] = &["name", "companyName"];
const PRICE_KEYS: &[&str] = &["price", "latestPrice"];
const CHANGE_KEYS: &[&str] = &["change"];
const CHANGE_PERCENT_KEYS: &[&str] = &["changesPercentage", "changePercent"];
const VOLUME_KEYS: &[&str] = &["volume", "latestVolume"];

/// Normalizes a market-movers payload.
///
/// The whole payload is rejected if any entry is missing a required field, so callers never
/// see a partially typed listing.
pub fn normalize_listing(raw: &Value) -> Result<Vec<QuoteRecord>> {
    let entries = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => {
            if let Some(msg) = obj.get("Error Message").and_then(Value::as_str) {
                anyhow::bail!("provider error: {msg}");
            }
            anyhow::bail!("expected a JSON array of quotes, got an object");
        }
        other => anyhow::bail!("expected a JSON array of quotes, got {other}"),
    };

    let mut out = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let obj = entry
            .as_object()
            .with_context(|| format!("entry {idx} is not an object"))?;
        out.push(normalize_entry(obj).with_context(|| format!("entry {idx}"))?);
    }
    Ok(out)
}

pub fn normalize_quote_detail(raw: &Value) -> Result<Option<QuoteDetail>> {
    let quotes = match raw {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    };
    let Some(first) = quotes.first() else {
        return Ok(None);
    };
    let obj = first.as_object().context("quote entry is not an object")?;

    let quote = normalize_entry(obj)?;
    let volume = lookup(obj, VOLUME_KEYS).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    });

    Ok(Some(QuoteDetail { quote, volume }))
}

fn normalize_entry(obj: &Map<String, Value>) -> Result<QuoteRecord> {
    let symbol = require_str(obj, SYMBOL_KEYS, "symbol")?;
    anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");

    // Some listings carry a null name for freshly listed tickers.
    let name = lookup(obj, NAME_KEYS)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let price = require_decimal(obj, PRICE_KEYS, "price")?;
    anyhow::ensure!(price >= Decimal::ZERO, "negative price {price} for {symbol}");

    Ok(QuoteRecord {
        change: require_decimal(obj, CHANGE_KEYS, "change")?,
        change_percent: require_decimal(obj, CHANGE_PERCENT_KEYS, "changesPercentage")?,
        symbol,
        name,
        price,
    })
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn require_str(obj: &Map<String, Value>, keys: &[&str], field: &str) -> Result<String> {
    lookup(obj, keys)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("missing string field `{field}`"))
}

fn require_decimal(obj: &Map<String, Value>, keys: &[&str], field: &str) -> Result<Decimal> {
    let v = lookup(obj, keys).with_context(|| format!("missing numeric field `{field}`"))?;
    parse_decimal(v).with_context(|| format!("field `{field}` is not numeric: {v}"))
}

fn parse_decimal(v: &Value) -> Result<Decimal> {
    match v {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .with_context(|| format!("unrepresentable number {s}"))
        }
        // e.g. "+12.50%" or "(+12.50%)" from older endpoint versions.
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_matches(|c| c == '(' || c == ')')
                .trim_end_matches('%')
                .trim_start_matches('+')
                .to_string();
            Decimal::from_str(&cleaned).with_context(|| format!("unparseable number {s:?}"))
        }
        other => anyhow::bail!("unexpected JSON type: {other}"),
    }
}
