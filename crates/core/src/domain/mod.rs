pub mod digest;
pub mod quote;

pub use digest::AlertDigest;
pub use quote::{FilterCriteria, QuoteDetail, QuoteRecord, Snapshot, SnapshotKind};
