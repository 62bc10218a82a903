//! Live rate retrieval, cross-rate derivation and snapshot assembly
//!
//! [`RateService`] owns a [`TtlCache`] with one entry per upstream leg
//! (`<asset>-<currency>`). Each leg producer applies its own fallback, so the cache
//! never sees a failure and [`RateService::get_all_rates`] has no error channel.

use super::cache::TtlCache;
use super::config::{AppConfig, FallbackConfig};
use super::error::RateError;
use super::price::PriceFeed;
use crate::providers::coingecko::CoinGeckoProvider;
use futures::future::join;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    Live,
    Fallback,
}

/// One resolved rate together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegRate {
    pub value: f64,
    pub source: RateSource,
}

impl LegRate {
    pub fn live(value: f64) -> Self {
        LegRate {
            value,
            source: RateSource::Live,
        }
    }

    pub fn fallback(value: f64) -> Self {
        LegRate {
            value,
            source: RateSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == RateSource::Fallback
    }
}

/// Rates handed to the rendering layer. Built fresh on every request and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    primary_rate: f64,
    secondary_rate: f64,
    fetched_at: i64,
    degraded: bool,
}

impl RateSnapshot {
    /// Destination fiat per unit of the reference asset (THB per USDT).
    pub fn primary_rate(&self) -> f64 {
        self.primary_rate
    }

    /// Destination fiat per unit of the secondary source currency (THB per RUB).
    pub fn secondary_rate(&self) -> f64 {
        self.secondary_rate
    }

    /// Milliseconds since the Unix epoch at which the snapshot was assembled.
    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// True when any value in the snapshot is a configured fallback.
    pub fn degraded(&self) -> bool {
        self.degraded
    }
}

/// Cross-rate through a shared reference asset: `primary / pair`, unrounded.
pub fn derive_cross_rate(primary: f64, pair: f64) -> Result<f64, RateError> {
    if pair.is_nan() || pair <= 0.0 {
        return Err(RateError::DivisionByZero { denominator: pair });
    }
    Ok(primary / pair)
}

fn usable(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// What to fetch and what to substitute when fetching fails.
#[derive(Debug, Clone)]
pub struct RateSettings {
    pub asset_id: String,
    pub primary_currency: String,
    pub secondary_currency: String,
    pub fallback: FallbackConfig,
}

impl From<&AppConfig> for RateSettings {
    fn from(config: &AppConfig) -> Self {
        RateSettings {
            asset_id: config.feed.asset_id.clone(),
            primary_currency: config.rates.primary_currency.clone(),
            secondary_currency: config.rates.secondary_currency.clone(),
            fallback: config.fallback.clone(),
        }
    }
}

pub struct RateService {
    feed: Arc<dyn PriceFeed>,
    cache: TtlCache<String, LegRate>,
    settings: RateSettings,
    last_stamp: AtomicI64,
}

impl RateService {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        cache: TtlCache<String, LegRate>,
        settings: RateSettings,
    ) -> Self {
        debug!(
            ttl = ?cache.ttl(),
            asset = %settings.asset_id,
            primary = %settings.primary_currency,
            secondary = %settings.secondary_currency,
            "Rate service ready"
        );
        RateService {
            feed,
            cache,
            settings,
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Wires a CoinGecko feed and a cache sized from the config.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let feed = CoinGeckoProvider::with_user_agent(
            &config.feed.base_url,
            config.request_timeout(),
            &config.feed.user_agent,
        )?;
        Ok(Self::new(
            Arc::new(feed),
            TtlCache::new(config.cache_ttl()),
            RateSettings::from(config),
        ))
    }

    fn cache_key(&self, currency: &str) -> String {
        format!("{}-{}", self.settings.asset_id, currency.to_lowercase())
    }

    async fn cached_leg(&self, currency: &str, fallback: f64) -> LegRate {
        let key = self.cache_key(currency);
        let feed = &self.feed;
        let asset = self.settings.asset_id.as_str();

        let producer = move || async move {
            let leg = match feed.fetch_pair_rate(asset, currency).await {
                Ok(price) if usable(price) => {
                    info!(asset, currency, price, "Live rate fetched");
                    LegRate::live(price)
                }
                Ok(price) => {
                    warn!(asset, currency, price, fallback, "Unusable price, using fallback");
                    LegRate::fallback(fallback)
                }
                Err(e) if e.is_upstream() => {
                    warn!(
                        asset,
                        currency,
                        error = %e,
                        fallback,
                        "Rate fetch failed, using fallback"
                    );
                    LegRate::fallback(fallback)
                }
                Err(e) => {
                    error!(asset, currency, error = %e, fallback, "Price feed failed, using fallback");
                    LegRate::fallback(fallback)
                }
            };
            Ok::<_, Infallible>(leg)
        };

        self.cache
            .get_cached(key.clone(), producer)
            .await
            .unwrap_or_else(|e| {
                error!(key = %key, error = %e, "Rate producer broke its no-failure contract");
                LegRate::fallback(fallback)
            })
    }

    /// Primary currency per reference asset, cached.
    pub async fn primary_rate(&self) -> LegRate {
        self.cached_leg(
            &self.settings.primary_currency,
            self.settings.fallback.primary_rate,
        )
        .await
    }

    /// Secondary currency per reference asset, cached. Denominator of the cross-rate.
    pub async fn pair_rate(&self) -> LegRate {
        self.cached_leg(
            &self.settings.secondary_currency,
            self.settings.fallback.pair_rate,
        )
        .await
    }

    /// Primary currency per unit of the secondary currency.
    ///
    /// Each leg has already had its own fallback applied. A bad denominator replaces
    /// the whole result with `fallback.secondary_rate`.
    pub async fn secondary_rate(&self) -> LegRate {
        let (primary, pair) = join(self.primary_rate(), self.pair_rate()).await;

        match derive_cross_rate(primary.value, pair.value) {
            Ok(value) if primary.is_fallback() || pair.is_fallback() => LegRate::fallback(value),
            Ok(value) => LegRate::live(value),
            Err(e) => {
                error!(
                    error = %e,
                    primary = primary.value,
                    pair = pair.value,
                    fallback = self.settings.fallback.secondary_rate,
                    "Cross-rate derivation failed, check fallback.pair_rate"
                );
                LegRate::fallback(self.settings.fallback.secondary_rate)
            }
        }
    }

    /// Fetches the primary rate and derives the secondary rate concurrently.
    ///
    /// `fetched_at` is taken when the snapshot is built, so successive calls served from
    /// cache still carry increasing timestamps.
    pub async fn get_all_rates(&self) -> RateSnapshot {
        let (primary, secondary) = join(self.primary_rate(), self.secondary_rate()).await;

        let snapshot = RateSnapshot {
            primary_rate: primary.value,
            secondary_rate: secondary.value,
            fetched_at: self.stamp(),
            degraded: primary.is_fallback() || secondary.is_fallback(),
        };
        debug!(?snapshot, "Assembled rate snapshot");
        snapshot
    }

    // Wall clock may step backwards; never hand out an older stamp than before.
    fn stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.last_stamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum MockLeg {
        Price(f64),
        HttpError(u16),
        Malformed,
        Timeout,
        Broken,
    }

    struct MockFeed {
        legs: HashMap<String, MockLeg>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl MockFeed {
        fn new(legs: &[(&str, MockLeg)]) -> Self {
            Self {
                legs: legs
                    .iter()
                    .map(|(currency, leg)| (currency.to_string(), *leg))
                    .collect(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, currency: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .get(currency)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl PriceFeed for MockFeed {
        async fn fetch_pair_rate(
            &self,
            asset_id: &str,
            quote_currency: &str,
        ) -> Result<f64, RateError> {
            let currency = quote_currency.to_lowercase();
            *self
                .calls
                .lock()
                .unwrap()
                .entry(currency.clone())
                .or_default() += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;

            let asset = asset_id.to_string();
            match self.legs.get(&currency) {
                Some(MockLeg::Price(p)) => Ok(*p),
                Some(MockLeg::HttpError(status)) => Err(RateError::UpstreamHttp {
                    asset,
                    currency,
                    status: *status,
                    reason: "mock".to_string(),
                }),
                Some(MockLeg::Malformed) | None => Err(RateError::UpstreamSchema {
                    asset,
                    currency,
                    message: "mock".to_string(),
                }),
                Some(MockLeg::Timeout) => Err(RateError::UpstreamTimeout { asset, currency }),
                Some(MockLeg::Broken) => Err(RateError::Producer {
                    key: currency,
                    source: Arc::new(std::io::Error::other("feed state corrupted")),
                }),
            }
        }
    }

    fn settings(fallback: FallbackConfig) -> RateSettings {
        RateSettings {
            asset_id: "tether".to_string(),
            primary_currency: "THB".to_string(),
            secondary_currency: "RUB".to_string(),
            fallback,
        }
    }

    fn test_fallback() -> FallbackConfig {
        FallbackConfig {
            primary_rate: 34.0,
            pair_rate: 90.0,
            secondary_rate: 0.35,
        }
    }

    fn service(feed: Arc<MockFeed>, fallback: FallbackConfig) -> RateService {
        RateService::new(
            feed,
            TtlCache::new(Duration::from_secs(60)),
            settings(fallback),
        )
    }

    #[test]
    fn test_derive_cross_rate_is_exact_quotient() {
        let rate = derive_cross_rate(33.5, 97.0).unwrap();
        assert_eq!(rate, 33.5_f64 / 97.0_f64);
        assert!((rate - 0.3454).abs() < 1e-4);
    }

    #[test]
    fn test_derive_cross_rate_guards_denominator() {
        for denominator in [0.0, -0.0, -97.0, f64::NAN] {
            let result = derive_cross_rate(33.5, denominator);
            assert!(
                matches!(result, Err(RateError::DivisionByZero { .. })),
                "denominator {denominator} should be rejected"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_live_rates() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::Price(97.0)),
        ]));
        let service = service(Arc::clone(&feed), test_fallback());

        let snapshot = service.get_all_rates().await;

        assert_eq!(snapshot.primary_rate(), 33.5);
        assert_eq!(snapshot.secondary_rate(), 33.5 / 97.0);
        assert!(!snapshot.degraded());
        assert!(snapshot.fetched_at() > 0);
        // Primary is requested by both the aggregator and the deriver but fetched once
        assert_eq!(feed.calls("thb"), 1);
        assert_eq!(feed.calls("rub"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_falls_back_on_primary_leg_only() {
        for failure in [
            MockLeg::Timeout,
            MockLeg::HttpError(503),
            MockLeg::Malformed,
            MockLeg::Broken,
        ] {
            let feed = Arc::new(MockFeed::new(&[
                ("thb", failure),
                ("rub", MockLeg::Price(97.0)),
            ]));
            let service = service(feed, test_fallback());

            let snapshot = service.get_all_rates().await;

            assert_eq!(snapshot.primary_rate(), 34.0);
            assert_eq!(snapshot.secondary_rate(), 34.0 / 97.0);
            assert!(snapshot.degraded());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_failure_falls_back_on_pair_leg_only() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::HttpError(500)),
        ]));
        let service = service(feed, test_fallback());

        let snapshot = service.get_all_rates().await;

        assert_eq!(snapshot.primary_rate(), 33.5);
        // Live numerator over the fallback denominator, not the secondary fallback
        assert_eq!(snapshot.secondary_rate(), 33.5 / 90.0);
        assert!(snapshot.degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_legs_fail() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Malformed),
            ("rub", MockLeg::Timeout),
        ]));
        let service = service(feed, test_fallback());

        let snapshot = service.get_all_rates().await;

        assert_eq!(snapshot.primary_rate(), 34.0);
        assert_eq!(snapshot.secondary_rate(), 34.0 / 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_denominator_uses_secondary_fallback() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::HttpError(500)),
        ]));
        let fallback = FallbackConfig {
            pair_rate: 0.0,
            ..test_fallback()
        };
        let service = service(feed, fallback);

        let snapshot = service.get_all_rates().await;

        assert_eq!(snapshot.primary_rate(), 33.5);
        assert_eq!(snapshot.secondary_rate(), 0.35);
        assert!(snapshot.secondary_rate().is_finite());
        assert!(snapshot.degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_live_price_is_not_used() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::Price(0.0)),
        ]));
        let service = service(feed, test_fallback());

        let pair = service.pair_rate().await;
        assert_eq!(pair, LegRate::fallback(90.0));

        let snapshot = service.get_all_rates().await;
        assert_eq!(snapshot.secondary_rate(), 33.5 / 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_upstream_calls() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::Price(97.0)),
        ]));
        let service = service(Arc::clone(&feed), test_fallback());

        let snapshots = join_all((0..10).map(|_| service.get_all_rates())).await;

        assert_eq!(feed.calls("thb"), 1);
        assert_eq!(feed.calls("rub"), 1);
        for snapshot in &snapshots {
            assert_eq!(snapshot.primary_rate(), 33.5);
            assert_eq!(snapshot.secondary_rate(), 33.5 / 97.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rates_refresh_after_ttl() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::Price(97.0)),
        ]));
        let service = service(Arc::clone(&feed), test_fallback());

        service.get_all_rates().await;
        tokio::time::advance(Duration::from_secs(59)).await;
        service.get_all_rates().await;
        assert_eq!(feed.calls("thb"), 1);
        assert_eq!(feed.calls("rub"), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        service.get_all_rates().await;
        assert_eq!(feed.calls("thb"), 2);
        assert_eq!(feed.calls("rub"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_is_held_for_the_ttl_window() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::HttpError(500)),
            ("rub", MockLeg::Price(97.0)),
        ]));
        let service = service(Arc::clone(&feed), test_fallback());

        service.get_all_rates().await;
        service.get_all_rates().await;
        assert_eq!(feed.calls("thb"), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        service.get_all_rates().await;
        assert_eq!(feed.calls("thb"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamps_do_not_go_backwards() {
        let feed = Arc::new(MockFeed::new(&[
            ("thb", MockLeg::Price(33.5)),
            ("rub", MockLeg::Price(97.0)),
        ]));
        let service = service(feed, test_fallback());

        let first = service.get_all_rates().await;
        let second = service.get_all_rates().await;

        assert_eq!(first.primary_rate(), second.primary_rate());
        assert_eq!(first.secondary_rate(), second.secondary_rate());
        assert!(second.fetched_at() >= first.fetched_at());
    }

    #[test]
    fn test_stamp_is_monotonic_even_if_clock_steps_back() {
        let feed = Arc::new(MockFeed::new(&[]));
        let service = service(feed, test_fallback());
        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        service.last_stamp.store(future, Ordering::SeqCst);

        assert_eq!(service.stamp(), future);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = RateSnapshot {
            primary_rate: 33.5,
            secondary_rate: 0.5,
            fetched_at: 1_700_000_000_000,
            degraded: false,
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "primaryRate": 33.5,
                "secondaryRate": 0.5,
                "fetchedAt": 1_700_000_000_000_i64,
                "degraded": false
            })
        );
    }
}
