pub mod market_clock;

pub use market_clock::{Clock, ManualClock, MarketClock};
