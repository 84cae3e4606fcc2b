pub mod alert;
pub mod dispatch;
pub mod domain;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod screen;
pub mod time;

pub mod config {
    use crate::dispatch::SendWindow;
    use crate::domain::quote::FilterCriteria;
    use crate::time::market_clock::{parse_time_of_day, parse_utc_offset};
    use chrono::{FixedOffset, NaiveTime};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    pub const PLACEHOLDER_API_KEY: &str = "demo";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_key: String,
        pub quote_provider_base_url: String,
        pub quote_provider_timeout_secs: u64,
        pub quote_provider_retries: u32,
        pub quote_cache_ttl_secs: u64,
        pub telegram_bot_token: Option<String>,
        pub telegram_chat_id: Option<String>,
        pub telegram_base_url: String,
        pub telegram_timeout_secs: u64,
        pub min_price: Decimal,
        pub max_price: Decimal,
        pub send_window_start: NaiveTime,
        pub send_window_end: NaiveTime,
        pub market_utc_offset: Option<FixedOffset>,
        pub poll_interval_secs: u64,
        /// Whether the api process runs the fixed-interval trigger.
        pub poll_enabled: bool,
        pub exclude_actives_corporate_actions: bool,
        pub sentry_dsn: Option<String>,
        pub warnings: Vec<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self::from_lookup(|key| std::env::var(key).ok()))
        }

        /// Builds settings from any key lookup. Unparseable values fall back to defaults
        /// and are recorded in `warnings`, since this runs before logging is installed.
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
            let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
            let window = SendWindow::default();
            let mut warnings = Vec::new();

            let market_utc_offset = var("MARKET_UTC_OFFSET").and_then(|s| {
                parse_utc_offset(&s)
                    .map_err(|e| warnings.push(format!("MARKET_UTC_OFFSET={s:?} ignored: {e}")))
                    .ok()
            });

            Self {
                api_key: var("API_KEY").unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string()),
                quote_provider_base_url: var("QUOTE_PROVIDER_BASE_URL")
                    .unwrap_or_else(|| "https://financialmodelingprep.com".to_string()),
                quote_provider_timeout_secs: parse_or(&var, &mut warnings, "QUOTE_PROVIDER_TIMEOUT_SECS", 10),
                quote_provider_retries: parse_or(&var, &mut warnings, "QUOTE_PROVIDER_RETRIES", 2),
                quote_cache_ttl_secs: parse_or(&var, &mut warnings, "QUOTE_CACHE_TTL_SECS", 300),
                telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: var("TELEGRAM_CHAT_ID"),
                telegram_base_url: var("TELEGRAM_BASE_URL")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
                telegram_timeout_secs: parse_or(&var, &mut warnings, "TELEGRAM_TIMEOUT_SECS", 10),
                min_price: parse_or(&var, &mut warnings, "MIN_PRICE", Decimal::ONE),
                max_price: parse_or(&var, &mut warnings, "MAX_PRICE", Decimal::from(55)),
                send_window_start: time_or(&var, &mut warnings, "SEND_WINDOW_START", window.start),
                send_window_end: time_or(&var, &mut warnings, "SEND_WINDOW_END", window.end),
                market_utc_offset,
                poll_interval_secs: parse_or(&var, &mut warnings, "POLL_INTERVAL_SECS", 60),
                poll_enabled: parse_or(&var, &mut warnings, "POLL_ENABLED", true),
                exclude_actives_corporate_actions: parse_or(
                    &var,
                    &mut warnings,
                    "EXCLUDE_ACTIVES_CORPORATE_ACTIONS",
                    false,
                ),
                sentry_dsn: var("SENTRY_DSN"),
                warnings,
            }
        }

        /// Emits the fallbacks recorded while parsing. Call once tracing is initialized.
        pub fn log_warnings(&self) {
            for warning in &self.warnings {
                tracing::warn!(%warning, "unparseable setting; using default");
            }
        }

        pub fn criteria(&self) -> FilterCriteria {
            FilterCriteria::new(self.min_price, self.max_price)
        }

        pub fn send_window(&self) -> SendWindow {
            SendWindow::new(self.send_window_start, self.send_window_end)
        }

        pub fn uses_placeholder_api_key(&self) -> bool {
            self.api_key == PLACEHOLDER_API_KEY
        }
    }

    fn parse_or<T: FromStr>(
        var: &impl Fn(&str) -> Option<String>,
        warnings: &mut Vec<String>,
        key: &str,
        default: T,
    ) -> T {
        match var(key) {
            Some(s) => s.trim().parse::<T>().unwrap_or_else(|_| {
                warnings.push(format!("{key}={s:?} is not valid"));
                default
            }),
            None => default,
        }
    }

    fn time_or(
        var: &impl Fn(&str) -> Option<String>,
        warnings: &mut Vec<String>,
        key: &str,
        default: NaiveTime,
    ) -> NaiveTime {
        match var(key) {
            Some(s) => parse_time_of_day(&s).unwrap_or_else(|e| {
                warnings.push(format!("{key}={s:?} is not valid: {e}"));
                default
            }),
            None => default,
        }
    }

}
