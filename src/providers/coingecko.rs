use crate::core::error::RateError;
use crate::core::price::PriceFeed;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

// CoinGeckoProvider implementation for PriceFeed
pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_user_agent(base_url, timeout, "ratefeed/1.0")
    }

    pub fn with_user_agent(
        base_url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn extract_price(body: &Value, asset_id: &str, currency: &str) -> Result<f64, String> {
    let asset = body
        .get(asset_id)
        .ok_or_else(|| format!("missing asset '{asset_id}'"))?;
    let price = asset
        .get(currency)
        .ok_or_else(|| format!("missing currency '{currency}' for asset '{asset_id}'"))?;
    price
        .as_f64()
        .ok_or_else(|| format!("non-numeric price for '{asset_id}/{currency}': {price}"))
}

#[async_trait]
impl PriceFeed for CoinGeckoProvider {
    #[instrument(
        name = "CoinGeckoPriceFetch",
        skip(self),
        fields(asset = %asset_id, currency = %quote_currency)
    )]
    async fn fetch_pair_rate(
        &self,
        asset_id: &str,
        quote_currency: &str,
    ) -> Result<f64, RateError> {
        let currency = quote_currency.to_lowercase();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, asset_id, currency
        );
        debug!("Requesting spot price from {}", url);

        let transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                RateError::UpstreamTimeout {
                    asset: asset_id.to_string(),
                    currency: currency.clone(),
                }
            } else {
                RateError::UpstreamRequest {
                    asset: asset_id.to_string(),
                    currency: currency.clone(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::UpstreamHttp {
                asset: asset_id.to_string(),
                currency: currency.clone(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        debug!(body = %text, "Received CoinGecko response");

        let schema_error = |message: String| RateError::UpstreamSchema {
            asset: asset_id.to_string(),
            currency: currency.clone(),
            message,
        };
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| schema_error(format!("invalid JSON: {e}")))?;

        extract_price(&body, asset_id, &currency).map_err(schema_error)
    }
}
