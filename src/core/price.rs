//! Spot price feed abstraction

use super::error::RateError;
use async_trait::async_trait;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Spot price of `asset_id` quoted in `quote_currency`.
    ///
    /// No range or sign validation happens here; callers decide what a usable price is.
    async fn fetch_pair_rate(&self, asset_id: &str, quote_currency: &str)
    -> Result<f64, RateError>;
}
