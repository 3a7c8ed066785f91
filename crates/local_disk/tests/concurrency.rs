// Concurrent writer discipline: same-key serialization, lock-free reads.

use std::fs;
use std::sync::Arc;
use std::thread;

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::source::BytesSource;
use local_disk::{DiskConfig, DiskLocation, TMP_DIR};
use locations::{Location, WriteOutcome};
use rand::{Rng, SeedableRng};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn key_of(bytes: &[u8]) -> Key {
    HashAlgorithm::Sha256.digest_of(bytes)
}

#[test]
fn concurrent_writes_of_the_same_key_converge() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store =
        Arc::new(DiskLocation::init(dir.path(), DiskConfig::new(HashAlgorithm::Sha256))?);
    let data = b"same-bytes".to_vec();
    let key = key_of(&data);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let data = data.clone();
        let key = key.clone();
        handles.push(thread::spawn(move || {
            store.write(&key, &BytesSource::new(data)).unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), WriteOutcome::Accepted);
    }

    // Exactly one payload file, no temp residue.
    let shard = dir.path().join(key.shard());
    let payloads = fs::read_dir(&shard)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name != ".lock" && !name.ends_with(".time")
        })
        .count();
    assert_eq!(payloads, 1);
    assert_eq!(fs::read_dir(dir.path().join(TMP_DIR))?.count(), 0);
    assert_eq!(store.used_bytes(), data.len() as u64);
    Ok(())
}

#[test]
fn concurrent_distinct_writers_do_not_interfere() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store =
        Arc::new(DiskLocation::init(dir.path(), DiskConfig::new(HashAlgorithm::Sha256))?);

    let mut handles = Vec::new();
    for seed in 0..8u64 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut data = vec![0u8; 1024];
            rng.fill(&mut data[..]);
            let key = key_of(&data);
            assert_eq!(
                store.write(&key, &BytesSource::new(data.clone())).unwrap(),
                WriteOutcome::Accepted
            );
            (key, data)
        }));
    }
    for handle in handles {
        let (key, data) = handle.join().unwrap();
        let got = store.read(&key)?.expect("entry readable").into_vec()?;
        assert_eq!(got, data);
    }
    assert_eq!(store.used_bytes(), 8 * 1024);
    Ok(())
}

#[test]
fn readers_are_not_blocked_by_writers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store =
        Arc::new(DiskLocation::init(dir.path(), DiskConfig::new(HashAlgorithm::Sha256))?);

    let stable = b"published entry".to_vec();
    let key = key_of(&stable);
    store.write(&key, &BytesSource::new(stable.clone()))?;

    let mut handles = Vec::new();
    for i in 0..4u8 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let data = vec![i; 4096];
            store.write(&key_of(&data), &BytesSource::new(data)).unwrap()
        }));
    }
    // Reads of the published entry proceed while writers hold shard locks.
    for _ in 0..16 {
        let got = store.read(&key)?.expect("entry readable").into_vec()?;
        assert_eq!(got, stable);
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), WriteOutcome::Accepted);
    }
    Ok(())
}
