use metrics::{counter, gauge, histogram};
use std::time::Duration;

// Metrics for monitoring
const METRIC_EXPLORER_REQUESTS: &str = "explorer_requests_total";
const METRIC_EXPLORER_LATENCY: &str = "explorer_request_seconds";
const METRIC_QUERY_RETRIES: &str = "query_retries_total";
const METRIC_CACHE_LOOKUPS: &str = "query_cache_lookups_total";
const METRIC_CACHE_EVICTIONS: &str = "query_cache_evictions_total";
const METRIC_CACHE_ENTRIES: &str = "query_cache_entries";
const METRIC_WATCHLIST_SIZE: &str = "watchlist_addresses";

pub fn record_request(action: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(METRIC_EXPLORER_REQUESTS, 1, "action" => action, "outcome" => outcome);
    histogram!(METRIC_EXPLORER_LATENCY, elapsed.as_secs_f64(), "action" => action);
}

pub fn record_retry(kind: &'static str) {
    counter!(METRIC_QUERY_RETRIES, 1, "kind" => kind);
}

pub fn record_cache_lookup(kind: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(METRIC_CACHE_LOOKUPS, 1, "kind" => kind, "result" => result);
}

pub fn record_evictions(kind: &'static str, evicted: usize) {
    counter!(METRIC_CACHE_EVICTIONS, evicted as u64, "kind" => kind);
}

/// Entries of one kind currently cached.
pub fn record_cache_entries(kind: &'static str, entries: usize) {
    gauge!(METRIC_CACHE_ENTRIES, entries as f64, "kind" => kind);
}

pub fn record_watchlist_size(size: usize) {
    gauge!(METRIC_WATCHLIST_SIZE, size as f64);
}
