//! Per-address and aggregate USD exposure, derived from the watchlist, the
//! price query and one balance query per watched address.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::constants::PLACEHOLDER;
use crate::decimals::{
    eth_to_usd, format_eth_display, sum_usd, with_thousands_separators, EthPrice,
};
use crate::errors::ApiError;
use crate::explorer::ExplorerClient;
use crate::query::{query_fn, QueryClient, QueryFn, QueryKey, QueryState, QuerySubscription};
use crate::watchlist::{Address, Watchlist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Loading,
    Error,
    Ok,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRow {
    pub address: Address,
    /// ETH with 6 fractional digits, no separators.
    pub eth: Option<String>,
    pub eth_display: String,
    /// USD with 2 fractional digits, no separators.
    pub usd: Option<String>,
    pub usd_display: String,
    pub status: RowStatus,
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewStatus {
    /// No price yet.
    Loading,
    /// The price query failed; rows are withheld.
    Error(ApiError),
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSnapshot {
    pub status: ViewStatus,
    pub rows: Vec<ExposureRow>,
    pub total_usd: String,
    pub total_usd_display: String,
    pub address_count: usize,
    pub price: Option<EthPrice>,
    pub price_fetching: bool,
    pub last_modified: Option<DateTime<Utc>>,
}

pub struct ExposureView {
    watchlist: Arc<Watchlist>,
    explorer: Arc<ExplorerClient>,
    balances: QueryClient<String>,
    prices: QueryClient<EthPrice>,
    price: QuerySubscription<EthPrice>,
    subscriptions: HashMap<Address, QuerySubscription<String>>,
    price_refresh: Option<JoinHandle<()>>,
}

impl ExposureView {
    /// Subscribes to the price and to every address currently watched.
    pub fn new(
        watchlist: Arc<Watchlist>,
        explorer: Arc<ExplorerClient>,
        balances: QueryClient<String>,
        prices: QueryClient<EthPrice>,
    ) -> Self {
        let price = prices.subscribe(QueryKey::price(), price_fetcher(explorer.clone()));
        let mut view = Self {
            watchlist,
            explorer,
            balances,
            prices,
            price,
            subscriptions: HashMap::new(),
            price_refresh: None,
        };
        view.sync();
        view
    }

    /// Subscribes newly watched addresses and drops subscriptions of removed
    /// ones, which cancels their pending requests.
    pub fn sync(&mut self) {
        let addresses = self.watchlist.addresses();

        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|address, _| addresses.contains(address));
        let removed = before - self.subscriptions.len();

        let mut added = 0;
        for address in addresses {
            if self.subscriptions.contains_key(&address) {
                continue;
            }
            let subscription = self.balances.subscribe(
                QueryKey::balance(address.as_str()),
                balance_fetcher(self.explorer.clone(), address.clone()),
            );
            self.subscriptions.insert(address, subscription);
            added += 1;
        }

        if added > 0 || removed > 0 {
            debug!(
                "Balance subscriptions synced: {} added, {} removed",
                added, removed
            );
        }
    }

    pub fn address_count(&self) -> usize {
        self.watchlist.len()
    }

    pub fn price(&self) -> Option<EthPrice> {
        self.price.value()
    }

    pub fn refetch_price(&self) {
        self.price.refetch();
    }

    /// Refetches the price every `period` for as long as the view lives.
    /// Replaces any refresh started earlier.
    pub fn spawn_price_refresh(&mut self, period: Duration) {
        let handle = self
            .prices
            .spawn_refetch_interval(self.price.key().clone(), period);
        if let Some(previous) = self.price_refresh.replace(handle) {
            previous.abort();
        }
    }

    pub fn refetch_all(&self) {
        self.price.refetch();
        for subscription in self.subscriptions.values() {
            subscription.refetch();
        }
    }

    /// Waits until the price and every balance have no request in flight.
    pub async fn settled(&mut self) {
        self.price.settled().await;
        for subscription in self.subscriptions.values_mut() {
            subscription.settled().await;
        }
    }

    pub fn snapshot(&self) -> ExposureSnapshot {
        let watched = self.watchlist.snapshot();
        let price_state = self.price.state();
        let price = price_state.data.clone();

        let status = if let (true, Some(error)) = (price_state.is_error(), &price_state.error) {
            ViewStatus::Error(error.clone())
        } else if price.is_none() {
            ViewStatus::Loading
        } else {
            ViewStatus::Ready
        };

        let rows: Vec<ExposureRow> = match status {
            ViewStatus::Error(_) => Vec::new(),
            _ => watched
                .addresses
                .iter()
                .map(|address| {
                    let balance = self
                        .subscriptions
                        .get(address)
                        .map(|subscription| subscription.state())
                        .unwrap_or_default();
                    build_row(address.clone(), &balance, price.as_ref())
                })
                .collect(),
        };

        let total_usd = sum_usd(
            rows.iter()
                .filter(|row| row.status == RowStatus::Ok)
                .filter_map(|row| row.usd.as_deref()),
        )
        .unwrap_or_else(|e| {
            warn!("Failed to total exposure: {}", e);
            "0.00".to_string()
        });

        ExposureSnapshot {
            status,
            total_usd_display: with_thousands_separators(&total_usd),
            total_usd,
            rows,
            address_count: watched.addresses.len(),
            price,
            price_fetching: price_state.is_fetching,
            last_modified: watched.last_modified,
        }
    }
}

impl Drop for ExposureView {
    fn drop(&mut self) {
        if let Some(refresh) = self.price_refresh.take() {
            refresh.abort();
        }
    }
}

fn build_row(
    address: Address,
    balance: &QueryState<String>,
    price: Option<&EthPrice>,
) -> ExposureRow {
    let eth = balance.data.clone();
    let usd = match (eth.as_deref(), price) {
        (Some(eth), Some(price)) => eth_to_usd(eth, price).ok(),
        _ => None,
    };

    let status = if balance.is_error() {
        RowStatus::Error
    } else if eth.is_none() || price.is_none() {
        RowStatus::Loading
    } else {
        RowStatus::Ok
    };

    ExposureRow {
        eth_display: eth
            .as_deref()
            .and_then(|eth| format_eth_display(eth).ok())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        usd_display: usd
            .as_deref()
            .map(with_thousands_separators)
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        address,
        eth,
        usd,
        status,
        error: balance.error.clone(),
    }
}

fn balance_fetcher(explorer: Arc<ExplorerClient>, address: Address) -> QueryFn<String> {
    query_fn(move |cancel| {
        let explorer = explorer.clone();
        let address = address.clone();
        async move { explorer.fetch_balance(address.as_str(), cancel).await }
    })
}

fn price_fetcher(explorer: Arc<ExplorerClient>) -> QueryFn<EthPrice> {
    query_fn(move |cancel| {
        let explorer = explorer.clone();
        async move { explorer.fetch_price(cancel).await }
    })
}
