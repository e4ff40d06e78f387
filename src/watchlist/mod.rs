//! Ordered, deduplicated set of watched addresses.
//!
//! The store is an explicitly constructed container shared through an
//! `Arc`. Every mutation happens inside a single `watch::Sender`
//! modification, so readers and subscribers only ever observe complete
//! states, and the new state is persisted before the modification ends.

mod storage;

pub use storage::{FileStore, KeyValueStore, MemoryStore};

use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tokio::sync::watch;

use crate::constants::{DEFAULT_ADDRESSES, WATCHLIST_STORAGE_KEY, WATCHLIST_STORAGE_VERSION};
use crate::errors::WatchlistError;
use crate::metrics;
use crate::utils::short_address;

const ADDRESS_LEN: usize = 42;

/// A canonical (lowercase, `0x`-prefixed, 40 hex digit) address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Validates `raw` and lowercases it.
    pub fn parse(raw: &str) -> Result<Self, WatchlistError> {
        if raw.chars().count() > ADDRESS_LEN {
            return Err(WatchlistError::InvalidLength);
        }
        if !is_valid_address(raw) {
            return Err(WatchlistError::InvalidFormat);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an arbitrary string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

/// True iff `raw` matches `^0x[0-9a-fA-F]{40}$`.
pub fn is_valid_address(raw: &str) -> bool {
    raw.len() == ADDRESS_LEN
        && raw.starts_with("0x")
        && raw.is_ascii()
        && hex::decode(&raw[2..]).is_ok()
}

impl FromStr for Address {
    type Err = WatchlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = WatchlistError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistState {
    pub addresses: Vec<Address>,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for WatchlistState {
    fn default() -> Self {
        Self {
            addresses: DEFAULT_ADDRESSES
                .iter()
                .filter_map(|raw| Address::parse(raw).ok())
                .collect(),
            last_modified: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedWatchlist {
    version: u32,
    state: WatchlistState,
}

pub struct Watchlist {
    state: watch::Sender<WatchlistState>,
    storage: Arc<dyn KeyValueStore>,
}

impl Watchlist {
    /// Hydrates from `storage`, falling back to the default addresses when no
    /// usable record exists.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let state = match storage.load(WATCHLIST_STORAGE_KEY) {
            Ok(Some(raw)) => decode_record(&raw).unwrap_or_default(),
            Ok(None) => WatchlistState::default(),
            Err(e) => {
                warn!("Failed to read persisted watchlist: {}", e);
                WatchlistState::default()
            }
        };
        debug!("Watchlist hydrated with {} addresses", state.addresses.len());
        metrics::record_watchlist_size(state.addresses.len());

        let (state, _) = watch::channel(state);
        Self { state, storage }
    }

    /// Default addresses, nothing persisted beyond the process.
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new()))
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.state.borrow().addresses.clone()
    }

    pub fn snapshot(&self) -> WatchlistState {
        self.state.borrow().clone()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_modified
    }

    pub fn len(&self) -> usize {
        self.state.borrow().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &str) -> bool {
        self.state
            .borrow()
            .addresses
            .iter()
            .any(|existing| existing.matches(address))
    }

    /// Notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<WatchlistState> {
        self.state.subscribe()
    }

    /// Validates `raw` exactly as given. Surrounding whitespace counts
    /// towards the length.
    pub fn add_address(&self, raw: &str) -> Result<Address, WatchlistError> {
        let address = Address::parse(raw)?;

        let mut outcome = Ok(address.clone());
        self.state.send_if_modified(|state| {
            if state.addresses.contains(&address) {
                outcome = Err(WatchlistError::DuplicateAddress);
                return false;
            }
            state.addresses.push(address.clone());
            state.last_modified = Some(modified_now());
            self.persist(state);
            true
        });

        if outcome.is_ok() {
            info!("Now monitoring {}", short_address(address.as_str()));
        }
        outcome
    }

    /// Removes every entry equal to `address` ignoring case. Absent addresses
    /// are a no-op apart from the timestamp.
    pub fn remove_address(&self, address: &str) {
        self.state.send_modify(|state| {
            let before = state.addresses.len();
            state.addresses.retain(|existing| !existing.matches(address));
            state.last_modified = Some(modified_now());
            self.persist(state);

            if state.addresses.len() < before {
                info!("Stopped monitoring {}", short_address(address));
            }
        });
    }

    fn persist(&self, state: &WatchlistState) {
        metrics::record_watchlist_size(state.addresses.len());

        let record = PersistedWatchlist {
            version: WATCHLIST_STORAGE_VERSION,
            state: state.clone(),
        };
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode watchlist: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.save(WATCHLIST_STORAGE_KEY, &encoded) {
            warn!("Failed to persist watchlist: {}", e);
        }
    }
}

/// Millisecond precision, the resolution of the persisted record.
fn modified_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn decode_record(raw: &str) -> Option<WatchlistState> {
    let record: PersistedWatchlist = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(e) => {
            warn!("Ignoring unreadable watchlist record: {}", e);
            return None;
        }
    };
    if record.version != WATCHLIST_STORAGE_VERSION {
        warn!(
            "Ignoring watchlist record with unsupported version {}",
            record.version
        );
        return None;
    }

    let mut state = record.state;
    let mut seen = std::collections::HashSet::new();
    state.addresses.retain(|address| seen.insert(address.clone()));
    Some(state)
}
