use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope shared by every explorer action. `status == "0"` is a logical
/// failure even when the HTTP status is 200; `result` then usually holds an
/// error string instead of the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplorerResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

impl ExplorerResponse {
    pub fn is_failure(&self) -> bool {
        self.status == "0"
    }

    /// `account.balance` result: the Wei amount as a decimal string.
    pub fn wei_balance(&self) -> Option<String> {
        match &self.result {
            Value::String(wei) => Some(wei.clone()),
            Value::Number(wei) => Some(wei.to_string()),
            Value::Null => Some(String::new()),
            _ => None,
        }
    }

    /// `stats.ethprice` result, if it is an object at all.
    pub fn eth_price(&self) -> Option<EthPriceResult> {
        match &self.result {
            Value::Object(_) => serde_json::from_value(self.result.clone()).ok(),
            _ => None,
        }
    }
}

/// Payload of `stats.ethprice`. Numbers arrive as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EthPriceResult {
    #[serde(default, deserialize_with = "string_or_number")]
    pub ethusd: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ethbtc: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ethusd_timestamp: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ethbtc_timestamp: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
