use crate::config::Settings;
use crate::domain::quote::{QuoteDetail, Snapshot, SnapshotKind};
use crate::ingest::types::{normalize_listing, normalize_quote_detail};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const MOVERS_PATH: &str = "/api/v3/stock_market";
const QUOTE_PATH: &str = "/api/v3/quote";

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch(&self, api_key: &str, kind: SnapshotKind) -> Result<Snapshot>;

    async fn fetch_quote(&self, api_key: &str, symbol: &str) -> Result<Option<QuoteDetail>>;
}

/// Result of a fetch that never fails: an empty snapshot plus a one-line diagnostic on error.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub snapshot: Snapshot,
    pub diagnostic: Option<String>,
}

impl FetchOutcome {
    pub fn is_failure(&self) -> bool {
        self.diagnostic.is_some()
    }
}

pub async fn fetch_or_empty(
    client: &dyn MarketDataClient,
    api_key: &str,
    kind: SnapshotKind,
) -> FetchOutcome {
    match client.fetch(api_key, kind).await {
        Ok(snapshot) => FetchOutcome {
            snapshot,
            diagnostic: None,
        },
        Err(err) => {
            tracing::warn!(
                provider = client.provider_name(),
                %kind,
                error = %format!("{err:#}"),
                "upstream fetch failed; using empty snapshot"
            );
            FetchOutcome {
                snapshot: Snapshot::empty(kind),
                diagnostic: Some(format!("failed to fetch {kind}: {err:#}")),
            }
        }
    }
}

/// Financial Modeling Prep market-movers client.
#[derive(Debug, Clone)]
pub struct FmpClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff: Duration,
}

impl FmpClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.quote_provider_base_url,
            Duration::from_secs(settings.quote_provider_timeout_secs),
            settings.quote_provider_retries,
        )
    }

    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build quote provider http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries: retries.max(1),
            backoff: Duration::from_secs(1),
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn get_json(&self, path: &str, api_key: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let backoff = self.backoff * (1 << (attempt - 1));

            let res = self
                .http
                .get(&url)
                .query(&[("apikey", api_key)])
                .send()
                .await;

            let res = match res {
                Ok(r) => r,
                Err(err) => {
                    // The request URL carries the API key.
                    let err = err.without_url();
                    if attempt >= self.retries {
                        return Err(err).context("quote provider request failed");
                    }
                    tracing::warn!(attempt, ?backoff, %path, error = %err, "quote provider request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .map_err(|e| e.without_url())
                .context("failed to read quote provider response")?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempt < self.retries {
                    tracing::warn!(attempt, ?backoff, %path, http_status = %status, "quote provider HTTP error; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                anyhow::bail!("quote provider HTTP {status}: {}", truncate(&text, 200));
            }

            return serde_json::from_str::<Value>(&text).with_context(|| {
                format!("quote provider response is not valid JSON: {}", truncate(&text, 200))
            });
        }
    }
}

#[async_trait::async_trait]
impl MarketDataClient for FmpClient {
    fn provider_name(&self) -> &'static str {
        "financialmodelingprep"
    }

    async fn fetch(&self, api_key: &str, kind: SnapshotKind) -> Result<Snapshot> {
        let path = format!("{MOVERS_PATH}/{}", kind.endpoint());
        let raw = self.get_json(&path, api_key).await?;
        let records = normalize_listing(&raw)
            .with_context(|| format!("malformed {kind} payload"))?;

        tracing::debug!(%kind, records = records.len(), "fetched market movers");
        Ok(Snapshot::new(kind, records))
    }

    async fn fetch_quote(&self, api_key: &str, symbol: &str) -> Result<Option<QuoteDetail>> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let valid = !symbol.is_empty()
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));
        anyhow::ensure!(valid, "invalid symbol {symbol:?}");

        let raw = self.get_json(&format!("{QUOTE_PATH}/{symbol}"), api_key).await?;
        normalize_quote_detail(&raw).with_context(|| format!("malformed quote payload for {symbol}"))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
