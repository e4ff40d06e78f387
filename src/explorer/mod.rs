//! Block explorer clients for ETH balances and the ETH→USD price.
//!
//! Both clients normalize every failure into an [`ApiError`]; transport
//! errors never escape this module.

mod transport;
mod types;

pub use transport::{ExplorerTransport, HttpTransport, TransportError, TransportResponse};
#[cfg(any(test, feature = "test-util"))]
pub use transport::MockExplorerTransport;
pub use types::{EthPriceResult, ExplorerResponse};

use anyhow::{Context, Result};
use log::{debug, warn};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::constants::CHAIN_ID;
use crate::decimals::{wei_to_eth, EthPrice};
use crate::errors::ApiError;
use crate::metrics;
use crate::watchlist::is_valid_address;

const BALANCE_DEFAULT_MESSAGE: &str = "Failed to fetch balance";
const PRICE_DEFAULT_MESSAGE: &str = "Failed to fetch ETH price";

pub struct ExplorerClient {
    transport: Arc<dyn ExplorerTransport>,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(transport: Arc<dyn ExplorerTransport>, api_key: Option<String>) -> Self {
        Self { transport, api_key }
    }

    /// HTTP client against `config.api_base_url`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("building http client")?;
        let transport = HttpTransport::new(client, config.base_url()?);
        Ok(Self::new(Arc::new(transport), config.api_key.clone()))
    }

    /// ETH balance of `address` with exactly 6 fractional digits.
    ///
    /// Malformed addresses fail with `INVALID_ADDRESS` before any request is
    /// issued. Fails with `CANCELLED` only once `cancel` has been triggered.
    pub async fn fetch_balance(
        &self,
        address: &str,
        cancel: CancellationToken,
    ) -> Result<String, ApiError> {
        if !is_valid_address(address) {
            return Err(ApiError::invalid_address());
        }

        let query = self.query(&[
            ("module", "account"),
            ("action", "balance"),
            ("address", address),
            ("tag", "latest"),
        ]);
        let (status, response) = self
            .request("balance", query, cancel, BALANCE_DEFAULT_MESSAGE)
            .await?;

        if response.is_failure() {
            return Err(ApiError::api(
                &response.message,
                BALANCE_DEFAULT_MESSAGE,
                status,
            ));
        }

        let wei = response.wei_balance().ok_or_else(ApiError::invalid_data)?;
        wei_to_eth(&wei).map_err(|e| {
            warn!("Unusable balance for {}: {}", address, e);
            ApiError::invalid_data()
        })
    }

    /// Current ETH→USD rate. Always strictly positive. Fails with
    /// `CANCELLED` only once `cancel` has been triggered.
    pub async fn fetch_price(&self, cancel: CancellationToken) -> Result<EthPrice, ApiError> {
        let query = self.query(&[("module", "stats"), ("action", "ethprice")]);
        let (status, response) = self
            .request("ethprice", query, cancel, PRICE_DEFAULT_MESSAGE)
            .await?;

        if response.is_failure() {
            return Err(ApiError::api(&response.message, PRICE_DEFAULT_MESSAGE, status));
        }

        let eth_usd = response
            .eth_price()
            .and_then(|result| result.ethusd)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(ApiError::invalid_data)?;

        EthPrice::parse(&eth_usd).ok_or_else(ApiError::invalid_price)
    }

    fn query(&self, params: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        query.push(("chainid".to_string(), CHAIN_ID.to_string()));
        if let Some(key) = &self.api_key {
            query.push(("apikey".to_string(), key.clone()));
        }
        query
    }

    async fn request(
        &self,
        action: &'static str,
        query: Vec<(String, String)>,
        cancel: CancellationToken,
        default_message: &str,
    ) -> Result<(u16, ExplorerResponse), ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::cancelled());
        }

        let start = Instant::now();
        let result = self.transport.get(query, cancel).await;
        let elapsed = start.elapsed();

        let response = match result {
            Ok(response) => response,
            Err(TransportError::Cancelled) => {
                debug!("Explorer {} request cancelled", action);
                return Err(ApiError::cancelled());
            }
            Err(e) => {
                metrics::record_request(action, "network_error", elapsed);
                return Err(map_transport_error(e));
            }
        };

        match serde_json::from_str::<ExplorerResponse>(&response.body) {
            Ok(decoded) => {
                let outcome = if decoded.is_failure() { "api_error" } else { "ok" };
                metrics::record_request(action, outcome, elapsed);
                Ok((response.status, decoded))
            }
            Err(e) => {
                metrics::record_request(action, "unknown_error", elapsed);
                warn!("Undecodable explorer {} response: {}", action, e);
                Err(ApiError::unknown(format!(
                    "An unexpected error occurred: {}",
                    default_message.to_lowercase()
                )))
            }
        }
    }
}

fn map_transport_error(err: TransportError) -> ApiError {
    match err {
        TransportError::Http { status, body } => {
            let message = serde_json::from_str::<ExplorerResponse>(&body)
                .ok()
                .map(|response| response.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("Request failed with status code {status}"));
            ApiError::network(message, Some(status))
        }
        TransportError::Timeout => ApiError::network("timeout of 10000ms exceeded", None),
        TransportError::Connect(message) => ApiError::network(message, None),
        TransportError::Cancelled => ApiError::cancelled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use mockall::predicate::always;

    fn ok(body: &str) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn client(transport: MockExplorerTransport) -> ExplorerClient {
        ExplorerClient::new(Arc::new(transport), None)
    }

    #[tokio::test]
    async fn test_balance_query_parameters() {
        let mut transport = MockExplorerTransport::new();
        transport
            .expect_get()
            .withf(|query, _| {
                let get = |k: &str| query.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
                get("module") == Some("account")
                    && get("action") == Some("balance")
                    && get("tag") == Some("latest")
                    && get("chainid") == Some("1")
                    && get("apikey") == Some("KEY")
                    && get("address") == Some("0x0000000000000000000000000000000000000001")
            })
            .times(1)
            .returning(|_, _| ok(r#"{"status":"1","message":"OK","result":"2000000000000000000"}"#));

        let client = ExplorerClient::new(Arc::new(transport), Some("KEY".to_string()));
        let balance = client
            .fetch_balance(
                "0x0000000000000000000000000000000000000001",
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(balance, "2.000000");
    }

    #[tokio::test]
    async fn test_invalid_address_skips_network() {
        let mut transport = MockExplorerTransport::new();
        transport.expect_get().never();

        let err = client(transport)
            .fetch_balance("0x123", CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAddress);
        assert_eq!(err.status, Some(400));
    }

    #[tokio::test]
    async fn test_balance_api_error() {
        let mut transport = MockExplorerTransport::new();
        transport
            .expect_get()
            .with(always(), always())
            .returning(|_, _| ok(r#"{"status":"0","message":"","result":"Error"}"#));

        let err = client(transport)
            .fetch_balance(
                "0x0000000000000000000000000000000000000001",
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ApiError);
        assert_eq!(err.message, "Failed to fetch balance");
        assert_eq!(err.status, Some(200));
    }

    #[tokio::test]
    async fn test_price_check_order() {
        let cases = [
            (r#"{"status":"0","message":"NOTOK","result":"x"}"#, ErrorKind::ApiError),
            (r#"{"status":"1","message":"OK","result":null}"#, ErrorKind::InvalidData),
            (r#"{"status":"1","message":"OK","result":{"ethbtc":"0.05"}}"#, ErrorKind::InvalidData),
            (r#"{"status":"1","message":"OK","result":{"ethusd":"abc"}}"#, ErrorKind::InvalidPrice),
            (r#"{"status":"1","message":"OK","result":{"ethusd":"0"}}"#, ErrorKind::InvalidPrice),
            (r#"{"status":"1","message":"OK","result":{"ethusd":"-3"}}"#, ErrorKind::InvalidPrice),
            ("<html>", ErrorKind::UnknownError),
        ];

        for (body, expected) in cases {
            let mut transport = MockExplorerTransport::new();
            let body = body.to_string();
            transport
                .expect_get()
                .returning(move |_, _| ok(&body));
            let err = client(transport)
                .fetch_price(CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind, expected);
        }
    }

    #[tokio::test]
    async fn test_price_success() {
        let mut transport = MockExplorerTransport::new();
        transport.expect_get().returning(|_, _| {
            ok(r#"{"status":"1","message":"OK","result":{"ethusd":"3456.78","ethbtc":"0.05"}}"#)
        });
        let price = client(transport)
            .fetch_price(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(price.to_string(), "3456.78");
    }

    #[tokio::test]
    async fn test_transport_errors_are_normalized() {
        let mut transport = MockExplorerTransport::new();
        transport.expect_get().returning(|_, _| {
            Err(TransportError::Http {
                status: 503,
                body: r#"{"status":"0","message":"Service unavailable"}"#.to_string(),
            })
        });
        let err = client(transport)
            .fetch_price(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert_eq!(err.status, Some(503));
        assert_eq!(err.message, "Network error: Service unavailable");

        let mut transport = MockExplorerTransport::new();
        transport
            .expect_get()
            .returning(|_, _| Err(TransportError::Connect("connection refused".to_string())));
        let err = client(transport)
            .fetch_price(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert_eq!(err.status, Some(500));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let mut transport = MockExplorerTransport::new();
        transport.expect_get().never();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = client(transport);
        let err = client.fetch_price(cancel.clone()).await.unwrap_err();
        assert!(err.is_cancelled());
        let err = client
            .fetch_balance("0x0000000000000000000000000000000000000001", cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_live_token_never_reports_cancelled() {
        let mut transport = MockExplorerTransport::new();
        transport
            .expect_get()
            .returning(|_, _| Err(TransportError::Timeout));
        let err = client(transport)
            .fetch_price(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());
        assert_eq!(err.kind, ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_unparseable_wei_is_invalid_data() {
        let mut transport = MockExplorerTransport::new();
        transport
            .expect_get()
            .returning(|_, _| ok(r#"{"status":"1","message":"OK","result":"12abc"}"#));
        let err = client(transport)
            .fetch_balance(
                "0x0000000000000000000000000000000000000001",
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
    }
}
