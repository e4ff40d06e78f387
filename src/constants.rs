use std::time::Duration;

/// Mainnet, the only chain the explorer is queried for.
pub const CHAIN_ID: u64 = 1;

/// Wei per ETH is 10^18.
pub const WEI_DECIMALS: i64 = 18;

/// Fractional digits shown for ETH amounts.
pub const ETH_DISPLAY_DECIMALS: i64 = 6;

/// Fractional digits shown for USD amounts.
pub const USD_DISPLAY_DECIMALS: i64 = 2;

/// Shown in place of an amount that is not available yet.
pub const PLACEHOLDER: &str = "—";

pub const DEFAULT_API_BASE_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Upper bound for a single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-request timeout for explorer calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Discriminator used for the ETH price query key.
pub const PRICE_SYMBOL: &str = "ETH";

/// Key of the persisted watchlist record.
pub const WATCHLIST_STORAGE_KEY: &str = "sanctioned-addresses";
pub const WATCHLIST_STORAGE_VERSION: u32 = 1;

/// Initial watchlist when nothing has been persisted yet.
pub const DEFAULT_ADDRESSES: [&str; 5] = [
    "0x0000000000000000000000000000000000000001",
    "0x0000000000000000000000000000000000000002",
    "0x0000000000000000000000000000000000000003",
    "0x0000000000000000000000000000000000000004",
    "0x0000000000000000000000000000000000000005",
];
