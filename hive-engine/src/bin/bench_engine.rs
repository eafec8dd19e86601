//! # Engine Benchmark Harness
//!
//! Purpose: Provide a dependency-free, repeatable benchmark driver for the
//! eviction engines so LRU and LFU throughput can be compared over time.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Use a fixed PRNG seed for stable comparisons.
//! 2. **Allocation Control**: Pre-build keys/values to keep setup costs off the hot path.
//! 3. **Same Harness, Both Policies**: Drive engines through the shared trait
//!    so the two policies see an identical operation stream.

use std::env;
use std::hint::black_box;
use std::time::Instant;

use hive_engine::{build_engine, CacheEngine, Policy};

const DEFAULT_KEY_COUNT: usize = 1 << 14;
const DEFAULT_OP_COUNT: usize = 1_000_000;
const DEFAULT_VALUE_SIZE: usize = 128;

struct BenchConfig {
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    value_size: usize,
    max_bytes: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        let key_count = normalize_power_of_two(requested_keys);
        // Budget for roughly half the key space so eviction stays exercised.
        let max_bytes = key_count / 2 * (value_size + 24);

        BenchConfig {
            key_count,
            key_mask: key_count - 1,
            op_count,
            value_size,
            max_bytes,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

/// Tiny deterministic PRNG used to avoid external dependencies.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)");
}

fn run_policy(policy: Policy, label: &str, config: &BenchConfig, keys: &[String]) {
    let mut engine = build_engine::<Vec<u8>>(config.max_bytes, None, policy);

    let start = Instant::now();
    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        engine
            .add(&keys[idx], vec![idx as u8; config.value_size])
            .expect("value fits the budget");
    }
    report(&format!("{label} ADD"), config.op_count, start.elapsed());

    let start = Instant::now();
    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        black_box(engine.get(&keys[idx]));
    }
    report(&format!("{label} GET"), config.op_count, start.elapsed());

    println!("{label} resident: {} entries, {} bytes", engine.len(), engine.size());
}

fn main() {
    let config = BenchConfig::from_args();
    let keys: Vec<String> = (0..config.key_count).map(|i| format!("bench-key-{i:08}")).collect();

    println!(
        "keys={}, ops={}, value_size={}, max_bytes={}",
        config.key_count, config.op_count, config.value_size, config.max_bytes
    );

    run_policy(Policy::Lru, "LRU", &config, &keys);
    run_policy(Policy::Lfu, "LFU", &config, &keys);
}
