use chrono::{NaiveDate, NaiveDateTime};
use movers_core::alert::format_digest;
use movers_core::dispatch::{DispatchOutcome, DispatchScheduler, SendWindow};
use movers_core::domain::{AlertDigest, FilterCriteria, QuoteDetail, QuoteRecord, Snapshot, SnapshotKind};
use movers_core::notify::NotificationSink;
use movers_core::pipeline::{screen_gainers, CycleRequest, Pipeline, PipelineOptions};
use movers_core::time::ManualClock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    today().and_hms_opt(h, m, 0).unwrap()
}

fn q(symbol: &str, name: &str, price: Decimal, change: Decimal, pct: Decimal) -> QuoteRecord {
    QuoteRecord {
        symbol: symbol.to_string(),
        name: name.to_string(),
        price,
        change,
        change_percent: pct,
    }
}

fn scenario_a_gainers() -> Vec<QuoteRecord> {
    vec![
        q("AAA", "AAA Inc", dec!(10.00), dec!(1.50), dec!(15.0)),
        q("BBB", "BBB Reverse Split Co", dec!(12.00), dec!(3.00), dec!(25.0)),
    ]
}

struct FakeMarket {
    actives: Vec<QuoteRecord>,
    gainers: Vec<QuoteRecord>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeMarket {
    fn new(actives: Vec<QuoteRecord>, gainers: Vec<QuoteRecord>) -> Self {
        Self {
            actives,
            gainers,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl movers_core::ingest::provider::MarketDataClient for FakeMarket {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, _api_key: &str, kind: SnapshotKind) -> anyhow::Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "connection reset");
        let records = match kind {
            SnapshotKind::Actives => self.actives.clone(),
            SnapshotKind::Gainers => self.gainers.clone(),
        };
        Ok(Snapshot::new(kind, records))
    }

    async fn fetch_quote(&self, _api_key: &str, _symbol: &str) -> anyhow::Result<Option<QuoteDetail>> {
        Ok(None)
    }
}

struct RecordingSink {
    succeed: AtomicBool,
    configured: AtomicBool,
    delivered: Mutex<Vec<AlertDigest>>,
    calls: AtomicUsize,
}

impl RecordingSink {
    fn new(succeed: bool) -> Self {
        Self {
            succeed: AtomicBool::new(succeed),
            configured: AtomicBool::new(true),
            delivered: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn deliver(&self, digest: &AlertDigest) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.succeed.load(Ordering::SeqCst);
        if ok {
            self.delivered.lock().unwrap().push(digest.clone());
        }
        ok
    }
}

struct Harness {
    pipeline: Pipeline,
    market: Arc<FakeMarket>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

fn harness(market: FakeMarket, sink_ok: bool, now: NaiveDateTime, cache_ttl: Duration) -> Harness {
    let market = Arc::new(market);
    let sink = Arc::new(RecordingSink::new(sink_ok));
    let clock = Arc::new(ManualClock::new(now));
    let scheduler = DispatchScheduler::new(SendWindow::default(), clock.clone());
    let options = PipelineOptions {
        api_key: "test-key".to_string(),
        criteria: FilterCriteria::new(dec!(1), dec!(55)),
        exclude_actives_corporate_actions: false,
        cache_ttl,
    };
    let pipeline = Pipeline::new(market.clone(), sink.clone(), scheduler, options);
    Harness {
        pipeline,
        market,
        sink,
        clock,
    }
}

#[test]
fn scenario_a_only_genuine_gainer_survives() {
    let snapshot = Snapshot::new(SnapshotKind::Gainers, scenario_a_gainers());
    let out = screen_gainers(snapshot, &FilterCriteria::new(dec!(1), dec!(55)));
    assert_eq!(out.symbols(), vec!["AAA"]);
}

#[tokio::test]
async fn scenario_b_second_trigger_same_day_does_not_resend() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        true,
        at(17, 2),
        Duration::ZERO,
    );

    let first = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(first.dispatch, Some(DispatchOutcome::Sent { date: today() }));
    assert_eq!(h.pipeline.scheduler().state().await.last_sent_date, Some(today()));
    assert_eq!(h.sink.calls(), 1);

    let delivered = h.sink.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].entries[0].symbol, "AAA");

    h.clock.set(at(17, 4));
    assert!(!h.pipeline.scheduler().may_dispatch(at(17, 4)).await);
    let second = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(second.dispatch, Some(DispatchOutcome::AlreadySent));
    assert_eq!(h.sink.calls(), 1);
}

#[tokio::test]
async fn scenario_c_failed_delivery_is_retried_inside_window() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        false,
        at(17, 1),
        Duration::ZERO,
    );

    let first = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(first.dispatch, Some(DispatchOutcome::DeliveryFailed));
    assert!(h.pipeline.scheduler().state().await.last_sent_date.is_none());
    assert_eq!(first.diagnostics.len(), 1);

    h.clock.set(at(17, 3));
    assert!(h.pipeline.scheduler().may_dispatch(at(17, 3)).await);
    h.sink.succeed.store(true, Ordering::SeqCst);
    let retry = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(retry.dispatch, Some(DispatchOutcome::Sent { date: today() }));
    assert_eq!(h.sink.calls(), 2);
}

#[tokio::test]
async fn empty_after_filtering_skips_dispatch_without_error() {
    let gainers = vec![
        q("PENNY", "Penny Co", dec!(0.40), dec!(0.10), dec!(33)),
        q("BBB", "BBB Reverse Split Co", dec!(12.00), dec!(3.00), dec!(25.0)),
    ];
    let h = harness(FakeMarket::new(Vec::new(), gainers), true, at(17, 2), Duration::ZERO);

    let report = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert!(report.gainers.is_empty());
    assert!(report.digest.is_none());
    assert!(report.dispatch.is_none());
    assert!(report.diagnostics.is_empty());
    assert_eq!(h.sink.calls(), 0);

    let empty = Snapshot::empty(SnapshotKind::Gainers);
    assert!(format_digest(&empty, FilterCriteria::new(dec!(1), dec!(55)), at(17, 2)).is_none());
}

#[tokio::test]
async fn manual_trigger_sends_outside_window_once() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        true,
        at(10, 30),
        Duration::ZERO,
    );

    let scheduled = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(scheduled.dispatch, Some(DispatchOutcome::OutsideWindow));

    let manual = h.pipeline.run_cycle(CycleRequest::manual()).await;
    assert_eq!(manual.dispatch, Some(DispatchOutcome::Sent { date: today() }));

    h.clock.set(at(17, 1));
    let in_window = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(in_window.dispatch, Some(DispatchOutcome::AlreadySent));
    assert_eq!(h.sink.calls(), 1);
}

#[tokio::test]
async fn upstream_failure_yields_empty_snapshots_and_diagnostics() {
    let market = FakeMarket::new(Vec::new(), scenario_a_gainers());
    market.fail.store(true, Ordering::SeqCst);
    let h = harness(market, true, at(17, 2), Duration::from_secs(300));

    let report = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert!(report.actives.is_empty());
    assert!(report.gainers.is_empty());
    assert!(report.dispatch.is_none());
    assert_eq!(report.diagnostics.len(), 2);

    // Failures are not cached: the next cycle goes upstream again and succeeds.
    h.market.fail.store(false, Ordering::SeqCst);
    let report = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(report.gainers.symbols(), vec!["AAA"]);
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn cache_bounds_upstream_calls_per_band() {
    let actives = vec![q("ACT", "Active Co", dec!(20), dec!(-1), dec!(-4.7))];
    let h = harness(
        FakeMarket::new(actives, scenario_a_gainers()),
        true,
        at(9, 0),
        Duration::from_secs(300),
    );

    for _ in 0..3 {
        let report = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
        assert_eq!(report.actives.symbols(), vec!["ACT"]);
    }
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 2);

    let narrower = CycleRequest::scheduled().with_criteria(FilterCriteria::new(dec!(11), dec!(55)));
    let report = h.pipeline.run_cycle(narrower).await;
    assert_eq!(report.actives.symbols(), vec!["ACT"]);
    assert!(report.gainers.is_empty());
    assert_eq!(h.market.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn inverted_band_is_an_empty_result_not_an_error() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        true,
        at(17, 2),
        Duration::ZERO,
    );
    let request = CycleRequest::scheduled().with_criteria(FilterCriteria::new(dec!(55), dec!(1)));
    let report = h.pipeline.run_cycle(request).await;
    assert!(report.gainers.is_empty());
    assert!(report.diagnostics.is_empty());
    assert_eq!(h.sink.calls(), 0);
}

#[tokio::test]
async fn page_refresh_inside_window_never_dispatches() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        true,
        at(17, 2),
        Duration::ZERO,
    );

    let refresh = CycleRequest::display().with_criteria(FilterCriteria::new(dec!(1), dec!(11)));
    let report = h.pipeline.run_cycle(refresh).await;
    assert!(report.digest.is_some());
    assert!(report.dispatch.is_none());
    assert_eq!(h.sink.calls(), 0);
    assert!(h.pipeline.scheduler().state().await.last_sent_date.is_none());

    // The scheduled tick still fires, with the configured band.
    let tick = h.pipeline.run_cycle(CycleRequest::scheduled()).await;
    assert_eq!(tick.dispatch, Some(DispatchOutcome::Sent { date: today() }));
    let delivered = h.sink.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].price_range, FilterCriteria::new(dec!(1), dec!(55)));
}

#[tokio::test]
async fn unconfigured_sink_disables_dispatch_with_diagnostic() {
    let h = harness(
        FakeMarket::new(Vec::new(), scenario_a_gainers()),
        true,
        at(17, 2),
        Duration::ZERO,
    );
    h.sink.configured.store(false, Ordering::SeqCst);

    let report = h.pipeline.run_cycle(CycleRequest::manual()).await;
    assert_eq!(report.dispatch, Some(DispatchOutcome::Disabled));
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].contains("not configured"));
    assert_eq!(h.sink.calls(), 0);
    assert!(h.pipeline.scheduler().state().await.last_sent_date.is_none());
}
