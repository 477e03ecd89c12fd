#![allow(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use symmap::{
    SymbolColumnDescriptor, SymbolError, SymbolKey, SymbolMapConfig, SymbolMapReader,
    SymbolMapWriter, Synchronous,
};
use tempfile::TempDir;

const SEED: u64 = 0x5eed_0001;

fn setup(capacity: u32) -> (TempDir, SymbolMapConfig) {
    let dir = TempDir::new().expect("tempdir");
    let config = SymbolMapConfig::new(dir.path()).synchronous(Synchronous::Off);
    SymbolMapWriter::create(&config, &SymbolColumnDescriptor::new("x", capacity))
        .expect("create column");
    (dir, config)
}

fn next_chars(rng: &mut ChaCha8Rng) -> String {
    (0..10).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

#[test]
fn append_dedups_and_continues_after_reopen() {
    const N: usize = 1000;
    let (_dir, config) = setup(N as u32);
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    let mut writer = SymbolMapWriter::open(&config, "x", true, 0).expect("open");
    for i in 0..N {
        let value = next_chars(&mut rng);
        let key = writer.append(value.as_str()).expect("append");
        assert_eq!(key, SymbolKey(i as i32));
        assert_eq!(writer.append(value.as_str()).expect("append again"), key);
    }
    writer.close().expect("close");

    let mut writer = SymbolMapWriter::open(&config, "x", true, N).expect("reopen");
    for i in 0..N {
        let value = next_chars(&mut rng);
        let key = writer.append(value.as_str()).expect("append");
        assert_eq!(key, SymbolKey((N + i) as i32));
        assert_eq!(writer.append(value.as_str()).expect("append again"), key);
    }

    // the first batch is still known under its original keys
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    for i in 0..N {
        let value = next_chars(&mut rng);
        assert_eq!(
            writer.append(value.as_str()).expect("append"),
            SymbolKey(i as i32)
        );
    }
    assert_eq!(writer.append(None).expect("null"), SymbolKey::NULL);
    assert_eq!(writer.count(), 2 * N);

    let metrics = writer.metrics_snapshot();
    assert_eq!(metrics.cache_misses, N as u64);
    assert_eq!(metrics.cache_hits, 2 * N as u64);
    assert_eq!(metrics.null_appends, 1);
}

#[test]
fn rollback_to_half_then_continue() {
    const N: usize = 1024;
    let (_dir, config) = setup(N as u32);
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut writer = SymbolMapWriter::open(&config, "x", true, 0).expect("open");
    let mut first_batch = Vec::with_capacity(N);
    for i in 0..N {
        let value = next_chars(&mut rng);
        assert_eq!(
            writer.append(value.as_str()).expect("append"),
            SymbolKey(i as i32)
        );
        first_batch.push(value);
    }

    writer.rollback(N / 2).expect("rollback");
    assert_eq!(writer.count(), N / 2);

    for i in 0..N {
        let value = next_chars(&mut rng);
        let key = writer.append(value.as_str()).expect("append");
        assert_eq!(key, SymbolKey((N / 2 + i) as i32));
        assert_eq!(writer.append(value.as_str()).expect("append again"), key);
    }
    // survivors keep their keys; rolled back values are gone
    assert_eq!(
        writer.append(first_batch[0].as_str()).expect("append"),
        SymbolKey(0)
    );
    assert_eq!(
        writer.append(first_batch[N - 1].as_str()).expect("append"),
        SymbolKey((N / 2 + N) as i32)
    );
    writer.close().expect("close");

    let reader = SymbolMapReader::open(&config, "x", usize::MAX).expect("reader");
    assert_eq!(reader.count(), N / 2 + N + 1);
    assert_eq!(
        reader.value_of(N as i32 / 2 - 1).expect("value"),
        Some(first_batch[N / 2 - 1].as_str())
    );
}

#[test]
fn null_value_maps_to_null_key() {
    let (_dir, config) = setup(16);
    let mut writer = SymbolMapWriter::open(&config, "x", true, 0).expect("open");
    assert_eq!(writer.append(None).expect("null"), SymbolKey(-1));
    assert!(writer.append(None).expect("null").is_null());
    assert_eq!(writer.count(), 0);
    assert_eq!(writer.values_len(), 0);
}

#[test]
fn missing_map_does_not_exist() {
    let dir = TempDir::new().expect("tempdir");
    let config = SymbolMapConfig::new(dir.path());
    let err = SymbolMapWriter::open(&config, "x", false, 0)
        .err()
        .expect("open must fail");
    assert!(matches!(err, SymbolError::NotFound(_)));
    assert!(err.to_string().contains("does not exist"), "{err}");
}

#[test]
fn short_header_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let config = SymbolMapConfig::new(dir.path());
    std::fs::write(config.offsets_path("x").expect("path"), b"").expect("touch");
    let err = SymbolMapWriter::open(&config, "x", false, 0)
        .err()
        .expect("open must fail");
    assert!(matches!(err, SymbolError::CorruptFormat { .. }));
    assert!(err.to_string().contains("too short"), "{err}");
}

#[test]
fn uncached_writer_assigns_fresh_keys() {
    const N: usize = 10_000;
    let (_dir, config) = setup(N as u32);
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut writer = SymbolMapWriter::open(&config, "x", false, 0).expect("open");
    let mut expected = 0i32;
    for _ in 0..N {
        let value = next_chars(&mut rng);
        assert_eq!(
            writer.append(value.as_str()).expect("append"),
            SymbolKey(expected)
        );
        assert_eq!(
            writer.append(value.as_str()).expect("append again"),
            SymbolKey(expected + 1)
        );
        expected += 2;
    }
    assert_eq!(writer.count(), 2 * N);
    let metrics = writer.metrics_snapshot();
    assert_eq!(metrics.appends, 2 * N as u64);
    assert_eq!((metrics.cache_hits, metrics.cache_misses), (0, 0));
    assert_eq!(metrics.cache_hit_rate(), 0.0);
}

#[test]
fn full_sync_commits_are_visible_to_new_readers() {
    let dir = TempDir::new().expect("tempdir");
    let config = SymbolMapConfig::new(dir.path()).synchronous(Synchronous::Full);
    let descriptor = SymbolColumnDescriptor::new("venue", 4);
    SymbolMapWriter::create(&config, &descriptor).expect("create");
    let mut writer = SymbolMapWriter::open_column(&config, &descriptor, 0).expect("open");
    for venue in ["XNAS", "XNYS", "XLON", "XNAS"] {
        writer.append(venue).expect("append");
    }
    assert_eq!(writer.commit().expect("commit"), 3);

    let reader = SymbolMapReader::open(&config, "venue", 3).expect("reader");
    assert_eq!(reader.key_of("XLON"), SymbolKey(2));
    assert_eq!(reader.capacity(), 4);
    assert!(reader.header().cached);
}

#[test]
fn exceeding_capacity_keeps_appending() {
    let (_dir, config) = setup(2);
    let mut writer = SymbolMapWriter::open(&config, "x", true, 0).expect("open");
    for (i, v) in ["a", "b", "c", "d"].into_iter().enumerate() {
        assert_eq!(writer.append(v).expect("append"), SymbolKey(i as i32));
    }
    assert_eq!(writer.capacity(), 2);
    assert_eq!(writer.count(), 4);
}
