use core::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::align::{self, MIN_BLOCK_SIZE};
use crate::arena::Arena;
use crate::block::{BlockRef, HEADER_SIZE};
use crate::check::{self, Violation};
use crate::config::ArenaConfig;
use crate::error::AllocError;
use crate::free_list::FreeList;

/// Leftover a candidate must exceed, beyond the request itself, before it is
/// split: room for one more header and a minimum-size block.
const SPLIT_SLACK: usize = HEADER_SIZE + MIN_BLOCK_SIZE;

/// The arena together with the free list threaded through it.
pub(crate) struct Heap {
  pub(crate) arena: Arena,
  pub(crate) free: FreeList,
}

impl Heap {
  fn new(config: &ArenaConfig) -> Result<Self, AllocError> {
    config.validate()?;

    let mut arena = Arena::create(config.capacity)?;
    let first = arena.first();
    let mut free = FreeList::default();
    free.insert(&mut arena, first);

    Ok(Self { arena, free })
  }

  /// First-fit search, then split-or-take.
  fn take(
    &mut self,
    size: usize,
  ) -> Result<BlockRef, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidRequest);
    }

    let found = self
      .free
      .iter(&self.arena)
      .find(|&block| self.arena.header(block).payload_size() >= size)
      .ok_or(AllocError::OutOfMemory { requested: size })?;

    self.free.detach(&mut self.arena, found);

    let taken = if self.arena.header(found).payload_size() > size + SPLIT_SLACK {
      let carved = self.arena.split(found, size);
      self.free.insert(&mut self.arena, found);
      carved
    } else {
      found
    };

    self.arena.header_mut(taken).is_free = false;
    let after = self.arena.after(taken);
    self.arena.header_mut(after).prev_free = false;

    Ok(taken)
  }

  /// Coalesces `block` with its free neighbors and puts the result back on
  /// the free list. Returns the merged block.
  fn give_back(
    &mut self,
    block: BlockRef,
  ) -> BlockRef {
    let mut block = block;
    let released = *self.arena.header(block);

    if released.prev_free {
      let before = self.arena.before(block);
      self.free.detach(&mut self.arena, before);

      let merged =
        self.arena.header(before).payload_size() + HEADER_SIZE + released.payload_size();
      self.arena.header_mut(before).set_size(merged);

      debug!(
        event = "merge_backward",
        from = %block,
        into = %before,
        size = merged,
        "Coalesced with lower neighbor"
      );
      block = before;
    }

    let after = self.arena.after(block);
    let following = *self.arena.header(after);
    if following.is_free {
      self.free.detach(&mut self.arena, after);

      let merged =
        self.arena.header(block).payload_size() + HEADER_SIZE + following.payload_size();
      self.arena.header_mut(block).set_size(merged);

      debug!(
        event = "merge_forward",
        from = %after,
        into = %block,
        size = merged,
        "Coalesced with upper neighbor"
      );
    }

    let header = self.arena.header_mut(block);
    header.is_free = true;
    let size = header.payload_size();

    let after = self.arena.after(block);
    self.arena.header_mut(after).set_prev(size, true);

    self.free.insert(&mut self.arena, block);
    block
  }
}

/// Byte counters over live allocations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Usage {
  bytes_in_use: usize,
  overhead_in_use: usize,
}

/// Snapshot of the allocator for reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Blocks currently on the free list.
  pub free_blocks: usize,
  /// Free blocks of exactly the minimum payload size.
  pub min_size_free_blocks: usize,
  /// Payload plus header bytes of every live allocation.
  pub bytes_in_use: usize,
  /// Header bytes of every live allocation.
  pub overhead_in_use: usize,
}

/// A first-fit, boundary-tag allocator over one fixed arena.
///
/// The arena is mapped from the OS on the first allocation (or on an explicit
/// [`init`](Self::init)) and never grows. It is unmapped when the allocator
/// is dropped, which invalidates every pointer it handed out.
///
/// All operations take `&mut self`; an allocator shared between threads needs
/// one lock around each call.
pub struct Allocator {
  config: ArenaConfig,
  heap: Option<Heap>,
  usage: Usage,
}

impl Allocator {
  pub fn new() -> Self {
    Self::with_config(ArenaConfig::default())
  }

  pub fn with_config(config: ArenaConfig) -> Self {
    Self {
      config,
      heap: None,
      usage: Usage::default(),
    }
  }

  pub fn config(&self) -> &ArenaConfig {
    &self.config
  }

  pub fn capacity(&self) -> usize {
    self.config.capacity
  }

  pub fn is_initialized(&self) -> bool {
    self.heap.is_some()
  }

  /// Reserves the arena now instead of on the first allocation.
  ///
  /// # Errors
  ///
  /// - [`AllocError::ArenaAlreadyExists`] if the arena was already reserved;
  ///   the existing arena is left untouched.
  /// - [`AllocError::Config`] if the configured capacity is unusable.
  /// - [`AllocError::OsReservation`] if the OS refused the mapping.
  pub fn init(&mut self) -> Result<(), AllocError> {
    if self.heap.is_some() {
      warn!(event = "arena_exists", "Arena already reserved");
      return Err(AllocError::ArenaAlreadyExists);
    }

    self.install().map(|_| ())
  }

  fn install(&mut self) -> Result<&mut Heap, AllocError> {
    let heap = Heap::new(&self.config)?;
    Ok(self.heap.insert(heap))
  }

  fn heap_mut(&mut self) -> Result<&mut Heap, AllocError> {
    match self.heap {
      Some(ref mut heap) => Ok(heap),
      None => self.install(),
    }
  }

  #[cfg(test)]
  pub(crate) fn heap_for_tests(&mut self) -> &mut Heap {
    self.heap.as_mut().expect("arena not reserved")
  }

  /// Hands out at least `request` bytes, aligned to 8.
  ///
  /// # Errors
  ///
  /// - [`AllocError::InvalidRequest`] for `request == 0`.
  /// - [`AllocError::OutOfMemory`] when no free block is large enough.
  /// - Any error of [`init`](Self::init) other than `ArenaAlreadyExists`
  ///   when this is the first allocation.
  pub fn allocate(
    &mut self,
    request: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = align::normalize(request)?;
    let heap = self.heap_mut()?;

    let block = heap
      .take(size)
      .map_err(|err| match err {
        AllocError::OutOfMemory { .. } => AllocError::OutOfMemory { requested: request },
        other => other,
      })
      .inspect_err(|_| {
        warn!(event = "out_of_memory", request, size, "No free block large enough");
      })?;

    let taken = heap.arena.header(block).payload_size();
    let payload = heap.arena.payload(block);

    self.usage.bytes_in_use += HEADER_SIZE + taken;
    self.usage.overhead_in_use += HEADER_SIZE;

    trace!(
      event = "allocation",
      request,
      size_bytes = taken,
      address = ?payload,
      "Memory allocated"
    );

    Ok(payload)
  }

  /// Returns a block to the allocator, merging it with free neighbors.
  ///
  /// `None` is accepted and ignored. Pointers that do not point into this
  /// allocator's arena are logged and ignored.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by [`allocate`](Self::allocate) on this
  /// allocator and must not have been released since. Releasing anything else
  /// that points into the arena corrupts it.
  pub unsafe fn release(
    &mut self,
    payload: Option<NonNull<u8>>,
  ) {
    let Some(payload) = payload else {
      return;
    };

    let Some(heap) = self.heap.as_mut() else {
      warn!(event = "release_without_arena", address = ?payload, "Nothing was ever allocated");
      return;
    };

    let Some(block) = heap.arena.block_of(payload) else {
      warn!(event = "foreign_release", address = ?payload, "Pointer is not inside the arena");
      return;
    };

    let released = heap.arena.header(block).payload_size();
    heap.give_back(block);

    self.usage.bytes_in_use = self.usage.bytes_in_use.saturating_sub(HEADER_SIZE + released);
    self.usage.overhead_in_use = self.usage.overhead_in_use.saturating_sub(HEADER_SIZE);

    trace!(
      event = "deallocation",
      size_bytes = released,
      address = ?payload,
      "Memory deallocated"
    );
  }

  /// Walks the free list and the whole arena looking for broken invariants.
  ///
  /// An allocator without an arena has nothing to check.
  pub fn check_consistency(&self) -> Vec<Violation> {
    self.heap.as_ref().map(check::run).unwrap_or_default()
  }

  /// Payload sizes of the free blocks, in free-list order.
  pub fn free_blocks(&self) -> impl Iterator<Item = usize> + '_ {
    self.heap.iter().flat_map(|heap| {
      heap
        .free
        .iter(&heap.arena)
        .map(move |block| heap.arena.header(block).payload_size())
    })
  }

  /// Total payload bytes on the free list.
  pub fn free_bytes(&self) -> usize {
    self.free_blocks().sum()
  }

  pub fn stats(&self) -> Stats {
    let (free_blocks, min_size_free_blocks) = self
      .free_blocks()
      .fold((0, 0), |(total, smallest), size| {
        (total + 1, smallest + usize::from(size == MIN_BLOCK_SIZE))
      });

    Stats {
      free_blocks,
      min_size_free_blocks,
      bytes_in_use: self.usage.bytes_in_use,
      overhead_in_use: self.usage.overhead_in_use,
    }
  }
}

impl Default for Allocator {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const INITIAL: usize = 65536 - 2 * HEADER_SIZE;

  fn block_of(
    allocator: &Allocator,
    payload: NonNull<u8>,
  ) -> BlockRef {
    let heap = allocator.heap.as_ref().unwrap();
    heap.arena.block_of(payload).unwrap()
  }

  #[test]
  fn arena_is_created_lazily() {
    let mut allocator = Allocator::new();
    assert!(!allocator.is_initialized());
    assert_eq!(allocator.free_blocks().count(), 0);

    allocator.allocate(8).unwrap();
    assert!(allocator.is_initialized());
  }

  #[test]
  fn second_init_is_rejected() {
    let mut allocator = Allocator::new();
    allocator.init().unwrap();
    assert_eq!(allocator.free_bytes(), INITIAL);

    let ptr = allocator.allocate(64).unwrap();
    assert!(matches!(
      allocator.init(),
      Err(AllocError::ArenaAlreadyExists)
    ));

    // The existing arena survived the failed attempt.
    assert_eq!(block_of(&allocator, ptr).offset(), INITIAL - 64);
    assert!(allocator.check_consistency().is_empty());
  }

  #[test]
  fn split_leaves_remainder_in_place() {
    let mut allocator = Allocator::new();
    let ptr = allocator.allocate(32).unwrap();

    let remainder: Vec<_> = allocator.free_blocks().collect();
    assert_eq!(remainder, vec![INITIAL - 32 - HEADER_SIZE]);

    // The carved block sits at the high end, right before the sentinel.
    let block = block_of(&allocator, ptr);
    let heap = allocator.heap.as_ref().unwrap();
    assert_eq!(heap.arena.after(block), heap.arena.sentinel());
    assert_eq!(heap.free.head(), Some(heap.arena.first()));
  }

  #[test]
  fn small_leftover_is_not_split() {
    let mut allocator = Allocator::new();
    let a = allocator.allocate(64).unwrap();
    let _guard = allocator.allocate(8).unwrap();

    unsafe { allocator.release(Some(a)) };
    // A 64-byte hole: 56 + 24 + 8 = 88 > 64, so it is handed out whole.
    let b = allocator.allocate(56).unwrap();
    assert_eq!(a, b);

    let heap = allocator.heap.as_ref().unwrap();
    assert_eq!(heap.arena.header(block_of(&allocator, b)).payload_size(), 64);
  }

  #[test]
  fn minimum_size_request_never_splits_a_minimum_block() {
    let mut allocator = Allocator::new();
    let a = allocator.allocate(8).unwrap();
    let _guard = allocator.allocate(8).unwrap();
    unsafe { allocator.release(Some(a)) };

    assert_eq!(allocator.stats().min_size_free_blocks, 1);
    let b = allocator.allocate(1).unwrap();
    assert_eq!(a, b);
    assert_eq!(allocator.stats().min_size_free_blocks, 0);
  }

  #[test]
  fn first_fit_follows_list_order() {
    let mut allocator = Allocator::new();
    let big = allocator.allocate(128).unwrap();
    let _g1 = allocator.allocate(8).unwrap();
    let small = allocator.allocate(64).unwrap();
    let _g2 = allocator.allocate(8).unwrap();

    unsafe {
      allocator.release(Some(big));
      allocator.release(Some(small));
    }

    // `small` was freed last, so it heads the list and satisfies the request
    // even though `big` would fit too.
    let ptr = allocator.allocate(16).unwrap();
    let small_block = block_of(&allocator, small);
    let heap = allocator.heap.as_ref().unwrap();
    assert_eq!(heap.arena.after(small_block), block_of(&allocator, ptr));
  }

  #[test]
  fn release_merges_both_neighbors() {
    let mut allocator = Allocator::new();
    let a = allocator.allocate(16).unwrap();
    let b = allocator.allocate(16).unwrap();
    let c = allocator.allocate(16).unwrap();
    let _guard = allocator.allocate(16).unwrap();

    unsafe {
      allocator.release(Some(a));
      allocator.release(Some(c));
    }
    assert_eq!(allocator.stats().free_blocks, 3);

    unsafe { allocator.release(Some(b)) };

    // a, b and c collapse into one block spanning three payloads and two
    // reclaimed headers.
    let sizes: Vec<_> = allocator.free_blocks().collect();
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes[0], 3 * 16 + 2 * HEADER_SIZE);
    assert!(allocator.check_consistency().is_empty());
  }

  #[test]
  fn usage_counters_track_live_blocks() {
    let mut allocator = Allocator::new();
    let a = allocator.allocate(10).unwrap();
    let b = allocator.allocate(100).unwrap();

    let stats = allocator.stats();
    assert_eq!(stats.bytes_in_use, (16 + HEADER_SIZE) + (104 + HEADER_SIZE));
    assert_eq!(stats.overhead_in_use, 2 * HEADER_SIZE);

    unsafe { allocator.release(Some(a)) };
    assert_eq!(allocator.stats().bytes_in_use, 104 + HEADER_SIZE);

    unsafe { allocator.release(Some(b)) };
    let stats = allocator.stats();
    assert_eq!(stats.bytes_in_use, 0);
    assert_eq!(stats.overhead_in_use, 0);
  }

  #[test]
  fn release_of_none_and_foreign_pointers_is_ignored() {
    let mut allocator = Allocator::new();
    unsafe { allocator.release(None) };
    assert!(!allocator.is_initialized());

    let ptr = allocator.allocate(32).unwrap();
    let before = allocator.stats();

    let mut local = 0u64;
    unsafe { allocator.release(Some(NonNull::from(&mut local).cast())) };
    assert_eq!(allocator.stats(), before);

    unsafe { allocator.release(Some(ptr)) };
    assert_eq!(allocator.free_bytes(), INITIAL);
  }

  #[test]
  fn invalid_capacity_surfaces_on_first_allocation() {
    let mut allocator = Allocator::with_config(ArenaConfig::with_capacity(100));
    assert!(matches!(
      allocator.allocate(8),
      Err(AllocError::Config(_))
    ));
    assert!(!allocator.is_initialized());
  }

  #[test]
  fn small_arena_runs_out() {
    let mut allocator = Allocator::with_config(ArenaConfig::with_capacity(128));
    // 128 - 48 = 80 payload bytes to start with.
    let a = allocator.allocate(40).unwrap();
    assert_eq!(allocator.free_bytes(), 80 - 40 - HEADER_SIZE);

    assert!(matches!(
      allocator.allocate(40),
      Err(AllocError::OutOfMemory { requested: 40 })
    ));

    unsafe { allocator.release(Some(a)) };
    assert_eq!(allocator.free_bytes(), 80);
  }

  #[test]
  fn out_of_memory_reports_the_caller_request() {
    let mut allocator = Allocator::with_config(ArenaConfig::with_capacity(128));
    allocator.allocate(40).unwrap();
    assert_eq!(allocator.free_bytes(), 16);

    // 17 rounds to 24, which no longer fits; the error still names 17.
    assert!(matches!(
      allocator.allocate(17),
      Err(AllocError::OutOfMemory { requested: 17 })
    ));
    assert!(matches!(
      allocator.allocate(70_000),
      Err(AllocError::OutOfMemory { requested: 70_000 })
    ));
  }

  #[test]
  fn take_rejects_zero_sizes() {
    let mut allocator = Allocator::new();
    allocator.init().unwrap();

    let heap = allocator.heap_for_tests();
    assert!(matches!(heap.take(0), Err(AllocError::InvalidRequest)));
    assert_eq!(heap.free.head(), Some(heap.arena.first()));

    assert_eq!(allocator.free_blocks().collect::<Vec<_>>(), vec![INITIAL]);
    assert!(allocator.check_consistency().is_empty());
  }
}
