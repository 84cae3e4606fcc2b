//! The single entry point shared by every trigger (timer tick, page refresh, operator action).
//!
//! A cycle fetches both listings, screens them, builds the digest, and hands it to the
//! dispatch gate. Nothing here remembers earlier calls except the scheduler's state, so any
//! caller can invoke a cycle at any frequency.

use crate::alert::format_digest;
use crate::config::Settings;
use crate::dispatch::{DispatchOutcome, DispatchScheduler, Trigger};
use crate::domain::digest::AlertDigest;
use crate::domain::quote::{FilterCriteria, QuoteDetail, Snapshot, SnapshotKind};
use crate::ingest::cache::{CacheKey, SnapshotCache};
use crate::ingest::provider::{fetch_or_empty, FetchOutcome, FmpClient, MarketDataClient};
use crate::notify::{NotificationSink, TelegramSink};
use crate::screen::{exclude_corporate_actions, filter_by_price, retain_genuine_gainers};
use crate::time::MarketClock;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub api_key: String,
    pub criteria: FilterCriteria,
    pub exclude_actives_corporate_actions: bool,
    pub cache_ttl: Duration,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            criteria: settings.criteria(),
            exclude_actives_corporate_actions: settings.exclude_actives_corporate_actions,
            cache_ttl: Duration::from_secs(settings.quote_cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleRequest {
    /// `None` runs a display-only cycle that never reaches the dispatch gate.
    pub trigger: Option<Trigger>,
    pub criteria: Option<FilterCriteria>,
    pub api_key: Option<String>,
}

impl CycleRequest {
    pub fn scheduled() -> Self {
        Self {
            trigger: Some(Trigger::Scheduled),
            criteria: None,
            api_key: None,
        }
    }

    pub fn manual() -> Self {
        Self {
            trigger: Some(Trigger::Manual),
            ..Self::scheduled()
        }
    }

    pub fn display() -> Self {
        Self {
            trigger: None,
            ..Self::scheduled()
        }
    }

    pub fn with_criteria(mut self, criteria: FilterCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub generated_at: NaiveDateTime,
    pub criteria: FilterCriteria,
    pub actives: Snapshot,
    pub gainers: Snapshot,
    pub digest: Option<AlertDigest>,
    /// `None` when there was nothing to send or the cycle was display-only.
    pub dispatch: Option<DispatchOutcome>,
    pub diagnostics: Vec<String>,
}

pub struct Pipeline {
    client: Arc<dyn MarketDataClient>,
    sink: Arc<dyn NotificationSink>,
    scheduler: DispatchScheduler,
    cache: SnapshotCache,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        sink: Arc<dyn NotificationSink>,
        scheduler: DispatchScheduler,
        options: PipelineOptions,
    ) -> Self {
        Self {
            cache: SnapshotCache::new(options.cache_ttl),
            client,
            sink,
            scheduler,
            options,
        }
    }

    /// Production wiring: FMP upstream, Telegram sink, market-local wall clock.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Arc::new(FmpClient::from_settings(settings)?);
        let sink = Arc::new(TelegramSink::from_settings(settings)?);
        let clock = Arc::new(MarketClock::new(settings.market_utc_offset));
        let scheduler = DispatchScheduler::new(settings.send_window(), clock);

        if settings.uses_placeholder_api_key() {
            tracing::warn!("API_KEY not set; using the placeholder key");
        }

        Ok(Self::new(
            client,
            sink,
            scheduler,
            PipelineOptions::from_settings(settings),
        ))
    }

    pub fn scheduler(&self) -> &DispatchScheduler {
        &self.scheduler
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn run_cycle(&self, request: CycleRequest) -> CycleReport {
        let criteria = request.criteria.unwrap_or(self.options.criteria);
        let api_key = request
            .api_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| self.options.api_key.clone());

        let mut diagnostics = Vec::new();
        let (actives, gainers) = if api_key.trim().is_empty() {
            diagnostics.push("API key is not configured; skipping upstream fetch".to_string());
            (
                Snapshot::empty(SnapshotKind::Actives),
                Snapshot::empty(SnapshotKind::Gainers),
            )
        } else {
            let (actives, gainers) = tokio::join!(
                self.fetch_cached(&api_key, SnapshotKind::Actives, criteria),
                self.fetch_cached(&api_key, SnapshotKind::Gainers, criteria),
            );
            diagnostics.extend(actives.diagnostic);
            diagnostics.extend(gainers.diagnostic);
            (actives.snapshot, gainers.snapshot)
        };

        let actives = screen_actives(
            actives,
            &criteria,
            self.options.exclude_actives_corporate_actions,
        );
        let gainers = screen_gainers(gainers, &criteria);

        let generated_at = self.scheduler.now();
        let digest = format_digest(&gainers, criteria, generated_at);

        let dispatch = match (&digest, request.trigger) {
            (Some(digest), Some(trigger)) => Some(
                self.scheduler
                    .dispatch(trigger, digest, self.sink.as_ref())
                    .await,
            ),
            _ => None,
        };
        match dispatch {
            Some(DispatchOutcome::DeliveryFailed) => diagnostics
                .push("alert delivery failed; will retry on the next eligible trigger".to_string()),
            Some(DispatchOutcome::Disabled) => diagnostics
                .push("alert dispatch disabled: notification channel is not configured".to_string()),
            _ => {}
        }

        tracing::info!(
            trigger = ?request.trigger,
            actives = actives.len(),
            gainers = gainers.len(),
            digest_entries = digest.as_ref().map_or(0, |d| d.entries.len()),
            dispatch = ?dispatch,
            diagnostics = diagnostics.len(),
            "pipeline cycle complete"
        );

        CycleReport {
            generated_at,
            criteria,
            actives,
            gainers,
            digest,
            dispatch,
            diagnostics,
        }
    }

    pub async fn lookup_quote(
        &self,
        api_key: Option<&str>,
        symbol: &str,
    ) -> anyhow::Result<Option<QuoteDetail>> {
        let api_key = api_key.unwrap_or(&self.options.api_key);
        self.client.fetch_quote(api_key, symbol).await
    }

    async fn fetch_cached(
        &self,
        api_key: &str,
        kind: SnapshotKind,
        criteria: FilterCriteria,
    ) -> FetchOutcome {
        let key = CacheKey {
            kind,
            api_key: api_key.to_string(),
            criteria,
        };
        if let Some(snapshot) = self.cache.get(&key) {
            tracing::debug!(%kind, "snapshot cache hit");
            return FetchOutcome {
                snapshot,
                diagnostic: None,
            };
        }

        let outcome = fetch_or_empty(self.client.as_ref(), api_key, kind).await;
        if !outcome.is_failure() {
            self.cache.insert(key, outcome.snapshot.clone());
        }
        outcome
    }
}

/// Price band, then optional corporate-action exclusion.
pub fn screen_actives(
    snapshot: Snapshot,
    criteria: &FilterCriteria,
    exclude_artifacts: bool,
) -> Snapshot {
    let filtered = filter_by_price(snapshot, criteria);
    if exclude_artifacts {
        exclude_corporate_actions(filtered)
    } else {
        filtered
    }
}

/// Price band, gain validity, then corporate-action exclusion.
pub fn screen_gainers(snapshot: Snapshot, criteria: &FilterCriteria) -> Snapshot {
    exclude_corporate_actions(retain_genuine_gainers(filter_by_price(snapshot, criteria)))
}

/// Runs scheduled cycles every `interval` until `shutdown` resolves.
///
/// A tick that overruns the interval delays the next one instead of queueing a burst.
pub async fn run_polling(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::info!(?interval, window = %pipeline.scheduler().window(), "polling started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("polling stopped");
                return;
            }
            _ = ticker.tick() => {
                let report = pipeline.run_cycle(CycleRequest::scheduled()).await;
                for diag in &report.diagnostics {
                    tracing::warn!(diagnostic = %diag, "cycle diagnostic");
                }
            }
        }
    }
}
