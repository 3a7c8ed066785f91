use std::io::{Cursor, Read};

use cairn_core::digest::{HashAlgorithm, Key};
use cairn_core::source::{ByteSource, SpooledSource};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

// Deterministic pseudo-random payload (xorshift64) so runs compare.
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

fn bench_algorithm_throughput(c: &mut Criterion) {
    let data = payload(1024 * 1024);
    let mut group = c.benchmark_group("algorithm_throughput");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for algorithm in HashAlgorithm::ALL {
        group.bench_function(algorithm.name(), |b| {
            b.iter(|| algorithm.digest_of(&data));
        });
    }
    group.finish();
}

fn bench_key_encoding(c: &mut Criterion) {
    let key = HashAlgorithm::Sha256.digest_of(&payload(256));
    let hex = key.to_hex();
    c.bench_function("key_hex_and_path_split", |b| {
        b.iter(|| {
            let parsed = Key::from_hex(HashAlgorithm::Sha256, &hex).unwrap();
            (parsed.shard(), parsed.rest())
        });
    });
}

// The write-side hot path: drain a one-shot stream to a spool, then
// replay it through a streaming hasher the way a location write does.
fn bench_spool_and_replay(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let data = payload(256 * 1024);
    let mut group = c.benchmark_group("spool_and_replay");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("drain_then_hash", |b| {
        b.iter(|| {
            let mut incoming = Cursor::new(data.as_slice());
            let spool = SpooledSource::drain(dir.path(), &mut incoming).unwrap();
            let mut hasher = HashAlgorithm::Sha256.hasher();
            let mut replay = spool.open().unwrap();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = replay.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            drop(replay);
            hasher.finalize()
        });
    });
    group.finish();
}

criterion_group!(digest, bench_algorithm_throughput, bench_key_encoding, bench_spool_and_replay);
criterion_main!(digest);
