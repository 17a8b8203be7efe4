//! Session ingestion: raw records to validated sessions to power samples.

/// Session-to-grid explosion.
pub mod exploder;
pub mod normalizer;
pub mod types;

pub use exploder::SessionExploder;
pub use normalizer::SessionNormalizer;
pub use types::{ChargeChoice, PowerSample, RawRecord, Session};
