use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tagalloc::Allocator;

fn bench_allocation(c: &mut Criterion) {
  c.bench_function("alloc_release_16bytes", |b| {
    let mut allocator = Allocator::new();
    b.iter(|| {
      let ptr = allocator.allocate(black_box(16)).unwrap();
      unsafe { allocator.release(Some(ptr)) };
    });
  });

  c.bench_function("alloc_release_1000_blocks", |b| {
    let mut allocator = Allocator::new();
    let mut blocks = Vec::with_capacity(1000);
    b.iter(|| {
      for _ in 0..1000 {
        blocks.push(allocator.allocate(black_box(16)).unwrap());
      }
      for ptr in blocks.drain(..) {
        unsafe { allocator.release(Some(ptr)) };
      }
    });
  });

  c.bench_function("fragmented_free_list", |b| {
    let mut allocator = Allocator::new();
    let held: Vec<_> = (0..400).map(|i| allocator.allocate(8 + (i % 7) * 8).unwrap()).collect();
    // Every other block freed: a long free list of small holes.
    for ptr in held.iter().step_by(2) {
      unsafe { allocator.release(Some(*ptr)) };
    }

    b.iter(|| {
      let ptr = allocator.allocate(black_box(256)).unwrap();
      unsafe { allocator.release(Some(ptr)) };
    });
  });
}

criterion_group!(benches, bench_allocation);
criterion_main!(benches);
