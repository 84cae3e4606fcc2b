pub mod artifacts;
pub mod filter;

pub use artifacts::{exclude_corporate_actions, is_corporate_action_name};
pub use filter::{filter_by_price, retain_genuine_gainers};
