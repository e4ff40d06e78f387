pub mod config;
pub mod constants;
pub mod decimals;
pub mod errors;
pub mod explorer;    // Balance and price clients
pub mod exposure;    // Aggregation over the watchlist
pub mod metrics;
pub mod query;       // Cache, dedup and retry engine
pub mod render;
pub mod utils;
pub mod watchlist;
