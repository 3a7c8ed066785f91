// The façade over combinator compositions: cache hierarchies and spill.

use std::sync::Arc;

use cairn_core::digest::HashAlgorithm;
use hash_storage::HashKeyStorage;
use local_disk::{DiskConfig, DiskLocation};
use locations::{Fanout, Level, Levels, Location, Presence};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn disk_store(root: &std::path::Path) -> Arc<DiskLocation> {
    Arc::new(DiskLocation::init(root, DiskConfig::new(HashAlgorithm::Sha256)).unwrap())
}

fn disk_store_with_budget(root: &std::path::Path, budget: u64) -> Arc<DiskLocation> {
    let config = DiskConfig::new(HashAlgorithm::Sha256).with_max_size(budget);
    Arc::new(DiskLocation::init(root, config).unwrap())
}

#[test]
fn levels_repopulate_the_top_tier_on_read() -> Result<()> {
    let top_dir = tempfile::tempdir()?;
    let bottom_dir = tempfile::tempdir()?;
    let top = disk_store(top_dir.path());
    let bottom = disk_store(bottom_dir.path());
    let levels =
        Levels::new(vec![Level::open(top.clone()), Level::open(bottom.clone())])?;
    let storage = HashKeyStorage::new(Arc::new(levels));

    // A write lands in both tiers.
    let key = storage.write_bytes(b"x")?;
    assert_eq!(top.contains(&key)?, Presence::Present);
    assert_eq!(bottom.contains(&key)?, Presence::Present);

    // Drop the entry from the top tier only.
    top.delete(&key)?;
    assert_eq!(top.contains(&key)?, Presence::Absent);

    // A read is served from the bottom tier and repopulates the top.
    assert_eq!(storage.read_to_vec(&key)?, b"x");
    assert_eq!(top.contains(&key)?, Presence::Present);
    Ok(())
}

#[test]
fn levels_respect_write_gates_on_promotion() -> Result<()> {
    let top_dir = tempfile::tempdir()?;
    let bottom_dir = tempfile::tempdir()?;
    let top = disk_store(top_dir.path());
    let bottom = disk_store(bottom_dir.path());
    let levels = Levels::new(vec![
        Level::new(top.clone(), true, false),
        Level::open(bottom.clone()),
    ])?;
    let storage = HashKeyStorage::new(Arc::new(levels));

    let key = storage.write_bytes(b"cold entry")?;
    assert_eq!(top.contains(&key)?, Presence::Absent, "write gate holds");
    assert_eq!(storage.read_to_vec(&key)?, b"cold entry");
    assert_eq!(top.contains(&key)?, Presence::Absent, "promotion honors the gate");
    Ok(())
}

#[test]
fn fanout_spills_once_the_first_store_fills() -> Result<()> {
    let a_dir = tempfile::tempdir()?;
    let b_dir = tempfile::tempdir()?;
    let a = disk_store_with_budget(a_dir.path(), 100);
    let b = disk_store_with_budget(b_dir.path(), 1024 * 1024);
    let fanout = Fanout::new(vec![a.clone() as Arc<dyn Location>, b.clone()])?;
    let storage = HashKeyStorage::new(Arc::new(fanout));

    let payloads: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 30]).collect();
    let mut keys = Vec::new();
    for p in &payloads {
        keys.push(storage.write_bytes(p)?);
    }

    // Three 30-byte entries fit the 100-byte budget; the rest spilled.
    for key in &keys[..3] {
        assert_eq!(a.contains(key)?, Presence::Present);
        assert_eq!(b.contains(key)?, Presence::Absent);
    }
    for key in &keys[3..] {
        assert_eq!(a.contains(key)?, Presence::Absent);
        assert_eq!(b.contains(key)?, Presence::Present);
    }

    // Every entry reads back through the composition.
    for (key, p) in keys.iter().zip(&payloads) {
        assert_eq!(&storage.read_to_vec(key)?, p);
    }
    Ok(())
}

#[test]
fn levels_over_fanout_compose() -> Result<()> {
    let top_dir = tempfile::tempdir()?;
    let a_dir = tempfile::tempdir()?;
    let b_dir = tempfile::tempdir()?;
    let top = disk_store(top_dir.path());
    let a = disk_store_with_budget(a_dir.path(), 64);
    let b = disk_store_with_budget(b_dir.path(), 1024 * 1024);

    let bottom = Fanout::new(vec![a as Arc<dyn Location>, b])?;
    let levels = Levels::new(vec![
        Level::open(top.clone()),
        Level::open(Arc::new(bottom)),
    ])?;
    let storage = HashKeyStorage::new(Arc::new(levels));

    let big = vec![1u8; 128];
    let key = storage.write_bytes(&big)?;
    // The fanout spilled past its full first child; the hierarchy as a
    // whole still holds the entry at both tiers.
    assert_eq!(top.contains(&key)?, Presence::Present);
    assert_eq!(storage.read_to_vec(&key)?, big);
    Ok(())
}
