use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::instrument;

use crate::model::chain::{ChainSnapshot, Contract, Expiry, Right};
use crate::provider::{ChainProvider, ProviderError};

/// Generic HTTP chain provider. The vendor's actual wire schema is an
/// external concern the core doesn't own (§1 Non-goals); this adapter's
/// wire DTOs below are a placeholder shape that lines up field-for-field
/// with `ChainSnapshot`, kept separate from the domain model the way
/// `StonfiClient`/`PoolEnvelope` keep wire shapes out of the domain.
pub struct HttpChainProvider {
    http: Client,
    base_url: String,
}

impl HttpChainProvider {
    pub fn new(base_url: String, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !api_key.is_empty() {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ProviderError::permanent(format!("invalid api key: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::permanent(format!("building http client: {e}")))?;

        Ok(Self { http, base_url })
    }
}

#[async_trait::async_trait]
impl ChainProvider for HttpChainProvider {
    #[instrument(skip(self), fields(ticker = %ticker), level = "debug")]
    async fn get_chain_snapshot(&self, ticker: &str) -> Result<ChainSnapshot, ProviderError> {
        let url = format!("{}/chains/{}", self.base_url, ticker);

        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::transient(format!("request timed out: {e}"))
            } else {
                ProviderError::transient(format!("http request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1_000);
            return Err(ProviderError::rate_limited(retry_after_ms));
        }
        if status.is_server_error() {
            return Err(ProviderError::transient(format!("server error: {status}")));
        }
        if status.is_client_error() {
            return Err(ProviderError {
                kind: crate::provider::ProviderErrorKind::Permanent,
                http_status: Some(status.as_u16()),
                retry_after_ms: None,
                message: format!("client error: {status}"),
            });
        }

        let wire: WireChainSnapshot = resp
            .json()
            .await
            .map_err(|e| ProviderError::permanent(format!("malformed payload: {e}")))?;

        wire.try_into()
    }
}

#[derive(Deserialize)]
struct WireChainSnapshot {
    ticker: String,
    as_of_ts: u64,
    underlying_price: f64,
    expiries: Vec<WireExpiry>,
}

#[derive(Deserialize)]
struct WireExpiry {
    expiry_date: String,
    contracts: Vec<WireContract>,
}

#[derive(Deserialize)]
struct WireContract {
    strike: f64,
    right: String,
    bid: Option<f64>,
    ask: Option<f64>,
    iv: Option<f64>,
    delta: Option<f64>,
    volume: i64,
    open_interest: i64,
}

impl TryFrom<WireChainSnapshot> for ChainSnapshot {
    type Error = ProviderError;

    fn try_from(wire: WireChainSnapshot) -> Result<Self, Self::Error> {
        let mut expiries = Vec::with_capacity(wire.expiries.len());
        for e in wire.expiries {
            let expiry_date = NaiveDate::parse_from_str(&e.expiry_date, "%Y-%m-%d")
                .map_err(|err| ProviderError::permanent(format!("malformed expiry_date: {err}")))?;
            let mut contracts = Vec::with_capacity(e.contracts.len());
            for c in e.contracts {
                let right = match c.right.as_str() {
                    "call" => Right::Call,
                    "put" => Right::Put,
                    other => {
                        return Err(ProviderError::permanent(format!("unrecognized right: {other}")));
                    }
                };
                contracts.push(Contract {
                    strike: c.strike,
                    right,
                    bid: c.bid,
                    ask: c.ask,
                    iv: c.iv,
                    delta: c.delta,
                    volume: c.volume,
                    open_interest: c.open_interest,
                });
            }
            expiries.push(Expiry { expiry_date, contracts });
        }

        Ok(ChainSnapshot {
            ticker: wire.ticker,
            as_of_ts: wire.as_of_ts,
            underlying_price: wire.underlying_price,
            expiries,
        })
    }
}
