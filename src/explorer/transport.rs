use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::constants::REQUEST_TIMEOUT;

/// Raw HTTP response handed back to the explorer client.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    /// Non-2xx response. `body` is kept so the caller can surface the
    /// endpoint's own message.
    #[error("HTTP {status}")]
    Http { status: u16, body: String },
    /// Connectivity or protocol failure without a response.
    #[error("{0}")]
    Connect(String),
    #[error("request cancelled")]
    Cancelled,
}

/// GET against the explorer endpoint. Provides a mockable implementation.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait ExplorerTransport: Send + Sync {
    async fn get(
        &self,
        query: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` backed transport with a 10 second timeout per request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn format_url(&self, query: &[(String, String)]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}

#[async_trait]
impl ExplorerTransport for HttpTransport {
    async fn get(
        &self,
        query: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.format_url(&query);
        debug!("Querying explorer: {}", redact_api_key(&url));

        let request = async {
            let response = self
                .client
                .get(url)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = response.status();
            let body = response.text().await.map_err(map_reqwest_error)?;

            if !status.is_success() {
                return Err(TransportError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(TransportResponse {
                status: status.as_u16(),
                body,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = request => result,
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    match err.status() {
        Some(status) => TransportError::Http {
            status: status.as_u16(),
            body: String::new(),
        },
        None => TransportError::Connect(err.to_string()),
    }
}

fn redact_api_key(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_url_appends_query() {
        let transport = HttpTransport::new(
            Client::new(),
            Url::parse("https://api.etherscan.io/api").unwrap(),
        );
        let url = transport.format_url(&[
            ("module".to_string(), "stats".to_string()),
            ("action".to_string(), "ethprice".to_string()),
        ]);
        assert_eq!(
            url.as_str(),
            "https://api.etherscan.io/api?module=stats&action=ethprice"
        );
    }

    #[test]
    fn test_redacts_api_key() {
        let url = Url::parse("https://x.io/api?module=stats&apikey=secret").unwrap();
        let redacted = redact_api_key(&url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("apikey=***") || redacted.contains("apikey=%2A%2A%2A"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = HttpTransport::new(
            Client::new(),
            Url::parse("http://127.0.0.1:9/api").unwrap(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transport.get(vec![], cancel).await;
        assert_eq!(result, Err(TransportError::Cancelled));
    }
}
