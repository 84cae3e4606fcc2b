use crate::domain::quote::{FilterCriteria, QuoteRecord};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const MAX_DIGEST_ENTRIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDigest {
    pub generated_at: NaiveDateTime,
    pub price_range: FilterCriteria,
    pub entries: Vec<QuoteRecord>,
}
