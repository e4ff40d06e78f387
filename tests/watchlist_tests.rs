use anyhow::Result;
use eth_exposure::errors::{ErrorKind, WatchlistError};
use eth_exposure::watchlist::{FileStore, KeyValueStore, MemoryStore, Watchlist};
use std::sync::Arc;
use test_log::test;

const MIXED_CASE: &str = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";

#[test]
fn test_add_normalizes_and_rejects_duplicates() -> Result<()> {
    let watchlist = Watchlist::in_memory();
    let before = watchlist.len();

    let added = watchlist.add_address(MIXED_CASE)?;
    assert_eq!(added.as_str(), MIXED_CASE.to_lowercase());
    assert_eq!(watchlist.len(), before + 1);

    let err = watchlist
        .add_address(&MIXED_CASE.to_uppercase().replacen("0X", "0x", 1))
        .unwrap_err();
    assert_eq!(err, WatchlistError::DuplicateAddress);
    assert_eq!(err.kind(), ErrorKind::DuplicateAddress);
    assert_eq!(watchlist.len(), before + 1);
    Ok(())
}

#[test]
fn test_rejects_malformed_addresses() {
    let watchlist = Watchlist::in_memory();
    let before = watchlist.snapshot();

    assert_eq!(
        watchlist.add_address("0x123").unwrap_err().kind(),
        ErrorKind::InvalidAddress
    );
    assert_eq!(
        watchlist
            .add_address("0x00000000000000000000000000000000000000000001")
            .unwrap_err(),
        WatchlistError::InvalidLength
    );
    assert_eq!(
        watchlist
            .add_address("0xZZ00000000000000000000000000000000000001")
            .unwrap_err(),
        WatchlistError::InvalidFormat
    );
    assert_eq!(watchlist.snapshot(), before);
}

#[test]
fn test_padded_input_counts_towards_length() {
    let watchlist = Watchlist::in_memory();
    let before = watchlist.snapshot();

    let padded = " 0xabcdef0123456789abcdef0123456789abcdef01\n";
    assert_eq!(padded.len(), 44);
    assert_eq!(
        watchlist.add_address(padded).unwrap_err(),
        WatchlistError::InvalidLength
    );
    assert_eq!(watchlist.snapshot(), before);
}

#[test]
fn test_persists_across_loads() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let watchlist = Watchlist::load(Arc::new(FileStore::new(dir.path())));
    watchlist.add_address(MIXED_CASE)?;
    watchlist.remove_address("0x0000000000000000000000000000000000000001");
    let saved = watchlist.snapshot();
    assert!(saved.last_modified.is_some());

    let reloaded = Watchlist::load(Arc::new(FileStore::new(dir.path())));
    assert_eq!(reloaded.snapshot(), saved);
    assert!(reloaded.contains(MIXED_CASE));
    assert!(!reloaded.contains("0x0000000000000000000000000000000000000001"));
    Ok(())
}

#[test]
fn test_unknown_record_version_falls_back_to_defaults() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.save(
        "sanctioned-addresses",
        r#"{"version":2,"state":{"addresses":[],"lastModified":null}}"#,
    )?;

    let watchlist = Watchlist::load(store);
    assert_eq!(watchlist.len(), 5);
    assert_eq!(watchlist.last_modified(), None);
    Ok(())
}

#[test(tokio::test)]
async fn test_subscribers_see_complete_states() -> Result<()> {
    let watchlist = Watchlist::in_memory();
    let mut changes = watchlist.subscribe();

    watchlist.add_address(MIXED_CASE)?;
    changes.changed().await?;
    let state = changes.borrow_and_update().clone();
    assert_eq!(state.addresses.len(), 6);
    assert!(state.last_modified.is_some());

    assert!(watchlist.add_address(MIXED_CASE).is_err());
    assert!(!changes.has_changed()?);
    Ok(())
}
