use std::fs;
use std::io::Read;
use std::sync::Arc;

use cairn_core::digest::HashAlgorithm;
use cairn_core::error::StoreError;
use hash_storage::HashKeyStorage;
use local_disk::{DiskConfig, DiskLocation};
use locations::{DeleteOutcome, Presence};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn disk_store(root: &std::path::Path) -> Arc<DiskLocation> {
    Arc::new(DiskLocation::init(root, DiskConfig::new(HashAlgorithm::Sha256)).unwrap())
}

fn storage_over(root: Arc<DiskLocation>) -> HashKeyStorage {
    HashKeyStorage::new(root)
}

#[test]
fn write_hello_yields_the_sha256_key() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));

    let key = storage.write_bytes(b"hello")?;
    assert_eq!(
        key.to_hex(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(storage.read_to_vec(&key)?, b"hello");
    Ok(())
}

#[test]
fn unknown_keys_read_as_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));
    let key = HashAlgorithm::Sha256.digest_of(b"never written");
    assert!(matches!(storage.read(&key), Err(StoreError::NotFound)));
    assert!(matches!(storage.read_to_vec(&key), Err(StoreError::NotFound)));
    assert_eq!(storage.contains(&key)?, Presence::Absent);
    Ok(())
}

#[test]
fn identical_writes_share_one_entry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = disk_store(dir.path());
    let storage = storage_over(root.clone());

    let k1 = storage.write_bytes(b"same payload")?;
    let used = root.used_bytes();
    let k2 = storage.write_bytes(b"same payload")?;
    assert_eq!(k1, k2);
    assert_eq!(root.used_bytes(), used);
    Ok(())
}

#[test]
fn one_shot_streams_are_spooled_and_cleaned_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spool = tempfile::tempdir()?;
    let storage =
        storage_over(disk_store(dir.path())).with_spool_dir(spool.path());

    let data = vec![42u8; 200_000];
    let mut reader = std::io::Cursor::new(data.clone());
    let key = storage.write_reader(&mut reader)?;
    assert_eq!(key, HashAlgorithm::Sha256.digest_of(&data));
    assert_eq!(storage.read_to_vec(&key)?, data);
    assert_eq!(fs::read_dir(spool.path())?.count(), 0, "spool must be removed");
    Ok(())
}

#[test]
fn files_are_hashed_then_stored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));

    let input = dir.path().join("input.bin");
    fs::write(&input, b"file payload")?;
    let key = storage.write_path(&input)?;
    assert_eq!(key, HashAlgorithm::Sha256.digest_of(b"file payload"));
    assert_eq!(storage.read_to_vec(&key)?, b"file payload");
    Ok(())
}

#[test]
fn corrupted_payload_fails_eagerly_or_on_close() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));

    let key = storage.write_bytes(b"soon to be corrupted")?;

    // Flip one byte of the payload file on disk.
    let path = dir.path().join(key.shard()).join(key.rest());
    let mut bytes = fs::read(&path)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    fs::write(&path, bytes)?;

    // Eager path: no bytes come back, the mismatch is the error.
    let err = storage.read_to_vec(&key).unwrap_err();
    assert!(matches!(err, StoreError::DigestMismatch { .. }));

    // Lazy path: bytes flow, the close signals corruption.
    let mut guard = storage.read(&key)?;
    let mut out = Vec::new();
    guard.read_to_end(&mut out)?;
    assert!(!out.is_empty());
    let err = guard.finish().unwrap_err();
    assert!(matches!(err, StoreError::Corruption(_)));
    Ok(())
}

#[test]
fn intact_payload_finishes_clean() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));
    let key = storage.write_bytes(b"intact")?;

    let mut guard = storage.read(&key)?;
    assert_eq!(guard.len(), Some(6));
    let mut out = Vec::new();
    guard.read_to_end(&mut out)?;
    assert_eq!(out, b"intact");
    guard.finish()?;
    Ok(())
}

#[test]
fn partially_consumed_reads_still_verify_on_finish() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));
    let data = vec![9u8; 100_000];
    let key = storage.write_bytes(&data)?;

    let mut guard = storage.read(&key)?;
    let mut first = [0u8; 10];
    guard.read_exact(&mut first)?;
    // finish drains the rest and the digest still checks out.
    guard.finish()?;
    Ok(())
}

#[test]
fn legacy_algorithms_are_opt_in() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = disk_store(dir.path());

    let foreign = HashAlgorithm::Sha512.digest_of(b"legacy entry");
    let strict = storage_over(root.clone());
    assert!(matches!(strict.read(&foreign), Err(StoreError::Config(_))));
    assert!(matches!(strict.contains(&foreign), Err(StoreError::Config(_))));

    let tolerant = storage_over(root).with_legacy([HashAlgorithm::Sha512]);
    // Accepted now; simply absent from the store.
    assert!(matches!(tolerant.read(&foreign), Err(StoreError::NotFound)));
    assert_eq!(tolerant.contains(&foreign)?, Presence::Absent);
    Ok(())
}

#[test]
fn full_root_surfaces_storage_full() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = DiskConfig::new(HashAlgorithm::Sha256).with_max_size(16);
    let root = Arc::new(DiskLocation::init(dir.path(), config)?);
    let storage = HashKeyStorage::new(root);

    let err = storage.write_bytes(&vec![0u8; 64]).unwrap_err();
    assert!(matches!(err, StoreError::StorageFull));
    Ok(())
}

#[test]
fn readonly_root_surfaces_permission() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = Arc::new(
        DiskLocation::init(dir.path(), DiskConfig::new(HashAlgorithm::Sha256))?.read_only(),
    );
    let storage = HashKeyStorage::new(root);
    let err = storage.write_bytes(b"refused").unwrap_err();
    assert!(matches!(err, StoreError::Permission(_)));
    Ok(())
}

#[test]
fn delete_removes_the_entry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = storage_over(disk_store(dir.path()));
    let key = storage.write_bytes(b"short lived")?;
    assert_eq!(storage.delete(&key)?, DeleteOutcome::Removed);
    assert!(matches!(storage.read(&key), Err(StoreError::NotFound)));
    assert_eq!(storage.delete(&key)?, DeleteOutcome::Absent);
    Ok(())
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

    #[test]
    fn read_of_write_returns_the_same_bytes(
        data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16384)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_over(disk_store(dir.path()));
        let key = storage.write_bytes(&data).unwrap();
        proptest::prop_assert_eq!(&key, &HashAlgorithm::Sha256.digest_of(&data));
        let got = storage.read_to_vec(&key).unwrap();
        proptest::prop_assert_eq!(got, data);
    }
}
