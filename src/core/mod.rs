//! Rate retrieval core: feed abstraction, cache, derivation and comparisons

pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod log;
pub mod price;
pub mod rates;

// Re-export main types for cleaner imports
pub use cache::TtlCache;
pub use error::RateError;
pub use price::PriceFeed;
pub use rates::{LegRate, RateService, RateSettings, RateSnapshot, RateSource};
