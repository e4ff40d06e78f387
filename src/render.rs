//! Plain-text rendering of exposure snapshots and the watchlist.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::constants::PLACEHOLDER;
use crate::exposure::{ExposureRow, ExposureSnapshot, RowStatus, ViewStatus};
use crate::utils::format_relative_time;
use crate::watchlist::WatchlistState;

const ADDRESS_WIDTH: usize = 42;
const ETH_WIDTH: usize = 18;
const USD_WIDTH: usize = 16;

/// "Saved <relative>" or nothing when the watchlist was never modified.
pub fn save_status(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<String> {
    last_modified.map(|ts| format!("Saved {}", format_relative_time(ts, now)))
}

pub fn render_snapshot(snapshot: &ExposureSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let price = snapshot
        .price
        .as_ref()
        .map(|price| format!("${price}"))
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    let refreshing = if snapshot.price_fetching { " (refreshing)" } else { "" };

    let _ = writeln!(out, "Total exposure: ${}", snapshot.total_usd_display);
    let _ = writeln!(out, "ETH price:      {price}{refreshing}");
    let _ = writeln!(out, "Addresses:      {}", snapshot.address_count);
    if let Some(saved) = save_status(snapshot.last_modified, now) {
        let _ = writeln!(out, "{saved}");
    }
    out.push('\n');

    match &snapshot.status {
        ViewStatus::Error(error) => {
            let _ = writeln!(out, "Unable to load exposure: {}", error.message);
            return out;
        }
        ViewStatus::Loading if snapshot.rows.is_empty() => {
            let _ = writeln!(out, "Loading...");
            return out;
        }
        _ => {}
    }

    if snapshot.rows.is_empty() {
        let _ = writeln!(out, "No addresses monitored.");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<ADDRESS_WIDTH$}  {:>ETH_WIDTH$}  {:>USD_WIDTH$}  STATUS",
        "ADDRESS", "ETH", "USD"
    );
    for row in &snapshot.rows {
        let _ = writeln!(out, "{}", render_row(row));
    }
    out
}

fn render_row(row: &ExposureRow) -> String {
    let status = match (&row.status, &row.error) {
        (RowStatus::Ok, _) => "ok".to_string(),
        (RowStatus::Loading, _) => "loading".to_string(),
        (RowStatus::Error, Some(error)) => format!("error: {}", error.message),
        (RowStatus::Error, None) => "error".to_string(),
    };
    format!(
        "{:<ADDRESS_WIDTH$}  {:>ETH_WIDTH$}  {:>USD_WIDTH$}  {}",
        row.address.as_str(),
        row.eth_display,
        row.usd_display,
        status
    )
}

pub fn render_watchlist(state: &WatchlistState, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for (i, address) in state.addresses.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {}", i + 1, address);
    }
    let _ = writeln!(out, "{} addresses monitored", state.addresses.len());
    if let Some(saved) = save_status(state.last_modified, now) {
        let _ = writeln!(out, "{saved}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimals::EthPrice;
    use crate::errors::ApiError;
    use crate::watchlist::Address;
    use chrono::Duration;

    fn row(status: RowStatus, eth: &str, usd: &str) -> ExposureRow {
        ExposureRow {
            address: Address::parse("0x0000000000000000000000000000000000000001").unwrap(),
            eth: None,
            eth_display: eth.to_string(),
            usd: None,
            usd_display: usd.to_string(),
            status,
            error: (status == RowStatus::Error).then(|| ApiError::network("timeout", None)),
        }
    }

    fn snapshot(status: ViewStatus, rows: Vec<ExposureRow>) -> ExposureSnapshot {
        ExposureSnapshot {
            status,
            address_count: rows.len(),
            rows,
            total_usd: "2000.00".to_string(),
            total_usd_display: "2,000.00".to_string(),
            price: EthPrice::parse("1000"),
            price_fetching: false,
            last_modified: None,
        }
    }

    #[test]
    fn test_renders_rows_and_totals() {
        let now = Utc::now();
        let mut snap = snapshot(
            ViewStatus::Ready,
            vec![
                row(RowStatus::Ok, "2.000000", "2,000.00"),
                row(RowStatus::Error, PLACEHOLDER, PLACEHOLDER),
            ],
        );
        snap.last_modified = Some(now - Duration::minutes(3));

        let text = render_snapshot(&snap, now);
        assert!(text.contains("Total exposure: $2,000.00"));
        assert!(text.contains("ETH price:      $1000"));
        assert!(text.contains("Saved 3 minutes ago"));
        assert!(text.contains("2,000.00  ok"));
        assert!(text.contains("error: Network error: timeout"));
    }

    #[test]
    fn test_price_error_replaces_table() {
        let snap = snapshot(ViewStatus::Error(ApiError::invalid_price()), vec![]);
        let text = render_snapshot(&snap, Utc::now());
        assert!(text.contains("Unable to load exposure: Invalid price value received from API"));
        assert!(!text.contains("ADDRESS"));
    }

    #[test]
    fn test_save_status_absent_without_timestamp() {
        assert_eq!(save_status(None, Utc::now()), None);
    }
}
