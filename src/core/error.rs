//! Error taxonomy for rate retrieval and derivation

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while fetching, caching or deriving a rate.
///
/// The upstream variants are recovered inside [`RateService`](super::rates::RateService)
/// by substituting a configured fallback. Only [`RateError::Producer`] signals a bug.
#[derive(Error, Debug)]
pub enum RateError {
    /// The price API answered with a non-success status.
    #[error("HTTP error: {status} {reason} for {asset}/{currency}")]
    UpstreamHttp {
        asset: String,
        currency: String,
        status: u16,
        reason: String,
    },

    /// The response body did not carry the expected numeric field.
    #[error("Unexpected response for {asset}/{currency}: {message}")]
    UpstreamSchema {
        asset: String,
        currency: String,
        message: String,
    },

    /// The request never produced a response (connect, TLS, body read).
    #[error("Request error for {asset}/{currency}: {message}")]
    UpstreamRequest {
        asset: String,
        currency: String,
        message: String,
    },

    #[error("Request timed out for {asset}/{currency}")]
    UpstreamTimeout { asset: String, currency: String },

    /// Cross-rate denominator was zero, negative or not a number.
    #[error("Cannot derive cross-rate with denominator {denominator}")]
    DivisionByZero { denominator: f64 },

    /// A cache producer failed instead of applying its own fallback.
    #[error("Producer failed for cache key {key}: {source}")]
    Producer {
        key: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl RateError {
    /// True for failures that come from the price API rather than from this crate.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RateError::UpstreamHttp { .. }
                | RateError::UpstreamSchema { .. }
                | RateError::UpstreamRequest { .. }
                | RateError::UpstreamTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RateError::UpstreamHttp {
            asset: "tether".to_string(),
            currency: "thb".to_string(),
            status: 500,
            reason: "Internal Server Error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP error: 500 Internal Server Error for tether/thb"
        );
        assert!(err.is_upstream());

        let err = RateError::DivisionByZero { denominator: 0.0 };
        assert_eq!(err.to_string(), "Cannot derive cross-rate with denominator 0");
        assert!(!err.is_upstream());
    }

    #[test]
    fn test_producer_error_keeps_source() {
        use std::error::Error;

        let err = RateError::Producer {
            key: "tether-thb".to_string(),
            source: Arc::new(std::io::Error::other("boom")),
        };
        assert_eq!(
            err.to_string(),
            "Producer failed for cache key tether-thb: boom"
        );
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }
}
