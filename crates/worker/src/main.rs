use clap::{Parser, Subcommand};
use movers_core::dispatch::DispatchOutcome;
use movers_core::domain::FilterCriteria;
use movers_core::pipeline::{CycleRequest, Pipeline};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "movers_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll on a fixed interval until interrupted. Alerts go out inside the send window.
    Run {
        /// Overrides POLL_INTERVAL_SECS.
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Run a single cycle and print the report as JSON.
    Once {
        /// Send now, ignoring the send window. Still at most once per day per process.
        #[arg(long)]
        send_now: bool,

        #[arg(long)]
        min_price: Option<Decimal>,

        #[arg(long)]
        max_price: Option<Decimal>,
    },

    /// Look up a single symbol's quote.
    Quote { symbol: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = movers_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    settings.log_warnings();

    let args = Args::parse();

    let pipeline = Arc::new(Pipeline::from_settings(&settings)?);

    match args.command {
        Command::Run { interval_secs } => {
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(settings.poll_interval_secs));
            movers_core::pipeline::run_polling(pipeline, interval, shutdown_signal()).await;
        }
        Command::Once {
            send_now,
            min_price,
            max_price,
        } => {
            let mut request = if send_now {
                CycleRequest::manual()
            } else {
                CycleRequest::scheduled()
            };
            if min_price.is_some() || max_price.is_some() {
                let defaults = settings.criteria();
                request = request.with_criteria(FilterCriteria::new(
                    min_price.unwrap_or(defaults.min_price),
                    max_price.unwrap_or(defaults.max_price),
                ));
            }

            let report = pipeline.run_cycle(request).await;
            for diag in &report.diagnostics {
                tracing::warn!(diagnostic = %diag, "cycle diagnostic");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);

            if send_now {
                match report.dispatch {
                    Some(DispatchOutcome::DeliveryFailed) => anyhow::bail!("alert delivery failed"),
                    Some(DispatchOutcome::Disabled) => {
                        anyhow::bail!("alert dispatch disabled: TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set")
                    }
                    _ => {}
                }
            }
        }
        Command::Quote { symbol } => match pipeline.lookup_quote(None, &symbol).await {
            Ok(Some(detail)) => println!("{}", serde_json::to_string_pretty(&detail)?),
            Ok(None) => {
                tracing::warn!(%symbol, "no quote returned");
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                return Err(err.context(format!("quote lookup failed for {symbol}")));
            }
        },
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &movers_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
