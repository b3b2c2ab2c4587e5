//! Drives the allocator with the three classic workloads and prints what the
//! free list looks like afterwards.
//!
//! ```text
//! cargo run --example benchmark -- [random|stress|sizes] [min] [max]
//! RUST_LOG=tagalloc=debug cargo run --example benchmark
//! ```

use std::env;

use tagalloc::{AllocError, Allocator, ArenaConfig, Stats};
use tracing_subscriber::{EnvFilter, fmt};

const ROUNDS: usize = 10;
const BLOCKS: usize = 10;

/// Small deterministic generator so runs are repeatable.
struct XorShift(u64);

impl XorShift {
  fn next(&mut self) -> u64 {
    let mut x = self.0;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.0 = x;
    x
  }

  fn between(
    &mut self,
    min: usize,
    max: usize,
  ) -> usize {
    min + (self.next() % (max - min + 1) as u64) as usize
  }
}

fn print_free_list_summary(stats: &Stats) {
  println!("Number of blocks in freelist: {}", stats.free_blocks);
  println!(
    "Number of blocks in freelist with smallest size: {}",
    stats.min_size_free_blocks
  );
}

fn sanity(allocator: &Allocator) {
  for violation in allocator.check_consistency() {
    println!("SANITY ERROR: {violation}");
  }
}

/// Rounds of random-size allocations that are all freed again, checking the
/// arena after every call.
fn random_sizes(
  allocator: &mut Allocator,
  min: usize,
  max: usize,
) -> Result<(), AllocError> {
  let mut rng = XorShift(0x2545_F491_4F6C_DD1D);

  for round in 0..ROUNDS {
    println!("\n~~~* Iteration {} *~~~\n", round + 1);

    let mut blocks = Vec::with_capacity(BLOCKS);
    for _ in 0..BLOCKS {
      let ptr = allocator.allocate(rng.between(min, max))?;
      unsafe { ptr.cast::<u8>().write(123) };
      blocks.push(ptr);
      sanity(allocator);
    }

    for ptr in blocks {
      unsafe { allocator.release(Some(ptr)) };
      sanity(allocator);
    }

    print_free_list_summary(&allocator.stats());
    sanity(allocator);
  }

  Ok(())
}

/// Many rounds of fixed 16-byte allocations.
fn stress(allocator: &mut Allocator) -> Result<(), AllocError> {
  const STRESS_ROUNDS: usize = 1_000;
  const STRESS_BLOCKS: usize = 1_000;

  let mut blocks = Vec::with_capacity(STRESS_BLOCKS);
  for _ in 0..STRESS_ROUNDS {
    for _ in 0..STRESS_BLOCKS {
      blocks.push(allocator.allocate(16)?);
    }
    for ptr in blocks.drain(..) {
      unsafe { allocator.release(Some(ptr)) };
    }
  }

  print_free_list_summary(&allocator.stats());
  sanity(allocator);
  Ok(())
}

/// Header overhead against bytes in use, for request sizes 1..=64.
fn sizes(allocator: &mut Allocator) -> Result<(), AllocError> {
  println!("request\toverhead\tin_use");

  let mut blocks = Vec::with_capacity(BLOCKS);
  for request in 1..=64 {
    for _ in 0..BLOCKS {
      blocks.push(allocator.allocate(request)?);
    }

    let stats = allocator.stats();
    println!("{request}\t{}\t{}", stats.overhead_in_use, stats.bytes_in_use);

    for ptr in blocks.drain(..) {
      unsafe { allocator.release(Some(ptr)) };
    }
  }

  Ok(())
}

fn main() {
  fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_target(true)
    .init();

  let args: Vec<String> = env::args().skip(1).collect();
  let workload = args.first().map_or("random", String::as_str);
  let min = args.get(1).and_then(|v| v.parse().ok()).unwrap_or(1);
  let max = args.get(2).and_then(|v| v.parse().ok()).unwrap_or(10);

  let mut allocator = Allocator::with_config(ArenaConfig::from_env());
  sanity(&allocator);

  println!("\nRUNNING BENCHMARK...");
  let result = match workload {
    "stress" => stress(&mut allocator),
    "sizes" => sizes(&mut allocator),
    _ => random_sizes(&mut allocator, min, max.max(min)),
  };

  match result {
    Ok(()) => println!("\nBENCHMARK COMPLETED."),
    Err(err) => println!("\nBENCHMARK FAILED: {err}"),
  }

  sanity(&allocator);
}
