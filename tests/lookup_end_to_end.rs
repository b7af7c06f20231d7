//! Lookups through the public API, from configuration to value

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use refdata::error::{Error, Result};
use refdata::timecodec::{parse_zone, TimeResolution};
use refdata::{
    KeyValueStore, Loader, RefDataConfig, RefDataLookup, SourceIdentity, VersionEnumerator,
    VersionId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Version listings and store contents for two feeds, counting collaborator calls
struct Catalogue {
    list_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl Catalogue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            list_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        })
    }
}

const JAN_2024_MS: i64 = 1_704_067_200_000;
const FEB_2024_MS: i64 = 1_706_745_600_000;

impl VersionEnumerator for Catalogue {
    fn list_versions(&self, source: &SourceIdentity) -> Result<Vec<(i64, VersionId)>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        match source.id() {
            "IP_TO_HOST" => Ok(vec![(FEB_2024_MS, VersionId(2)), (JAN_2024_MS, VersionId(1))]),
            "IP_TO_HOST_STATIC" => Ok(vec![(0, VersionId(100))]),
            other => Err(Error::VersionEnumeration(format!("unknown feed {}", other))),
        }
    }
}

impl Loader for Catalogue {
    fn load(&self, version: VersionId) -> Result<KeyValueStore> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        let mut store = KeyValueStore::new();
        match version {
            VersionId(1) => {
                store.put("IP_TO_HOST", "192.168.0.10", "build-01");
                store.put("HOST_TO_TEAM", "build-01", "platform");
            }
            VersionId(2) => {
                store.put("IP_TO_HOST", "192.168.0.10", "build-02");
                store.put("HOST_TO_TEAM", "build-02", "release");
            }
            VersionId(100) => {
                store.put("IP_TO_HOST", "192.168.0.99", "printer");
                store.put_range("PORT_CLASS", 0, 1024, "system")?;
            }
            other => return Err(Error::Loader(format!("no snapshot for {}", other))),
        }
        Ok(store)
    }
}

fn lookup_for(catalogue: &Arc<Catalogue>) -> Result<RefDataLookup> {
    let config = RefDataConfig::from_toml_str(
        r#"
        [byte_buffer_pool.pooled_byte_buffer_counts]
        10 = 4
        100 = 2

        [store_cache]
        max_stores = 8
        "#,
    )?;
    let enumerator: Arc<dyn VersionEnumerator> = catalogue.clone();
    let loader: Arc<dyn Loader> = catalogue.clone();
    RefDataLookup::new(&config, enumerator, loader)
}

fn feeds() -> Vec<SourceIdentity> {
    vec![
        SourceIdentity::new("IP_TO_HOST"),
        SourceIdentity::new("IP_TO_HOST_STATIC"),
    ]
}

#[test]
fn test_lookup_follows_effective_time() -> Result<()> {
    let catalogue = Catalogue::new();
    let lookup = lookup_for(&catalogue)?;
    let mid_jan = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let mid_feb = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();

    assert_eq!(
        lookup.lookup(&feeds(), mid_jan, "IP_TO_HOST/HOST_TO_TEAM", b"192.168.0.10")?,
        Some(Bytes::from("platform"))
    );
    assert_eq!(
        lookup.lookup(&feeds(), mid_feb, "IP_TO_HOST/HOST_TO_TEAM", b"192.168.0.10")?,
        Some(Bytes::from("release"))
    );
    // Falls through to the static feed
    assert_eq!(
        lookup.lookup(&feeds(), mid_feb, "IP_TO_HOST", b"192.168.0.99")?,
        Some(Bytes::from("printer"))
    );
    assert_eq!(
        lookup.lookup(&feeds(), mid_feb, "PORT_CLASS", b"443")?,
        Some(Bytes::from("system"))
    );
    assert_eq!(lookup.lookup(&feeds(), mid_feb, "IP_TO_HOST", b"10.0.0.1")?, None);
    Ok(())
}

#[test]
fn test_before_first_version_uses_fallback_only() -> Result<()> {
    let catalogue = Catalogue::new();
    let lookup = lookup_for(&catalogue)?;
    let december = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();

    let trace = lookup.lookup_with_trace(&feeds(), december, "IP_TO_HOST", b"192.168.0.10")?;
    assert_eq!(trace.value, None);
    assert_eq!(trace.consulted.len(), 1);
    assert_eq!(trace.consulted[0].version, VersionId(100));
    Ok(())
}

#[test]
fn test_concurrent_cold_lookups_call_collaborators_once() -> Result<()> {
    let catalogue = Catalogue::new();
    let lookup = Arc::new(lookup_for(&catalogue)?);
    let instant = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
    let only_primary = vec![SourceIdentity::new("IP_TO_HOST")];

    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let lookup = Arc::clone(&lookup);
            let barrier = Arc::clone(&barrier);
            let sources = only_primary.clone();
            thread::spawn(move || {
                barrier.wait();
                lookup.lookup(&sources, instant, "IP_TO_HOST", b"192.168.0.10")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap()?, Some(Bytes::from("build-01")));
    }
    assert_eq!(catalogue.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(catalogue.load_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_failed_source_surfaces_error() -> Result<()> {
    let catalogue = Catalogue::new();
    let lookup = lookup_for(&catalogue)?;
    let sources = vec![SourceIdentity::new("RETIRED_FEED")];

    let result = lookup.lookup(&sources, Utc::now(), "IP_TO_HOST", b"x");
    assert!(matches!(result, Err(Error::VersionEnumeration(_))));
    // The healthy feeds are unaffected
    assert!(lookup.lookup(&feeds(), Utc::now(), "IP_TO_HOST", b"192.168.0.10")?.is_some());
    Ok(())
}

#[test]
fn test_temporal_key_round_trip_through_store() -> Result<()> {
    let zone = parse_zone("Europe/London")?;
    let codec = TimeResolution::HourZoned.codec(Some(zone));
    let event = Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap();

    // Build the stored key the same way the lookup will
    let mut stored_key = b"SHIFT:".to_vec();
    codec.write(&mut stored_key, event)?;

    let enumerator: Arc<dyn VersionEnumerator> =
        Arc::new(|_: &SourceIdentity| -> Result<Vec<(i64, VersionId)>> { Ok(vec![(0, VersionId(1))]) });
    let loader: Arc<dyn Loader> = Arc::new(move |_: VersionId| -> Result<KeyValueStore> {
        let mut store = KeyValueStore::new();
        store.put("ROTA", stored_key.clone(), "night-team");
        Ok(store)
    });
    let lookup = RefDataLookup::new(&RefDataConfig::default(), enumerator, loader)?;

    let later_same_hour = event + chrono::Duration::minutes(20);
    let value = lookup.lookup_temporal(
        &[SourceIdentity::new("ROTA")],
        Utc::now(),
        "ROTA",
        b"SHIFT:",
        codec.as_ref(),
        later_same_hour,
    )?;
    assert_eq!(value, Some(Bytes::from("night-team")));

    let scratch = lookup.acquire_scratch_buffers(&[16, 16])?;
    assert_eq!(scratch.len(), 2);
    Ok(())
}
