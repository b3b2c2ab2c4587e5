//! Consistency checker.
//!
//! Two independent walks over the allocator state:
//!
//! 1. the free list, checking link symmetry and that every listed block is
//!    marked free;
//! 2. the arena, block by block up to the sentinel, checking that each header
//!    mirrors the size and free status of the block before it.
//!
//! Findings are collected, never raised.

use tracing::warn;

use crate::align::MIN_BLOCK_SIZE;
use crate::allocator::Heap;
use crate::block::{BlockRef, HEADER_SIZE};

/// A broken invariant, and where it was found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
  #[error("free list head {block} has a back link to {prev}")]
  HeadHasPrev { block: BlockRef, prev: BlockRef },
  #[error("free list link {block} -> {next} is not mirrored: {next} links back to {back:?}")]
  BrokenBackLink {
    block: BlockRef,
    next: BlockRef,
    back: Option<BlockRef>,
  },
  #[error("{block} is on the free list but not marked free")]
  ListedButNotFree { block: BlockRef },
  #[error("free list reaches {block}, outside the arena")]
  ListedOutOfBounds { block: BlockRef },
  #[error("free list does not end after {visited} blocks")]
  FreeListCycle { visited: usize },
  #[error("{block} has size {size} but {next} records {mirrored}")]
  SizeMirror {
    block: BlockRef,
    next: BlockRef,
    size: u16,
    mirrored: u16,
  },
  #[error("{block} has is_free = {is_free} but {next} records {mirrored}")]
  FreeMirror {
    block: BlockRef,
    next: BlockRef,
    is_free: bool,
    mirrored: bool,
  },
  #[error("{block} runs past the end of the arena")]
  BlockOutOfBounds { block: BlockRef },
  #[error("arena walk stopped at {block} instead of the sentinel {sentinel}")]
  MissedSentinel { block: BlockRef, sentinel: BlockRef },
  #[error("arena holds {in_arena} free blocks but the free list holds {listed}")]
  FreeCountMismatch { in_arena: usize, listed: usize },
}

pub(crate) fn run(heap: &Heap) -> Vec<Violation> {
  let mut violations = Vec::new();

  let listed = walk_free_list(heap, &mut violations);
  let in_arena = walk_arena(heap, &mut violations);

  if let (Some(listed), Some(in_arena)) = (listed, in_arena) {
    if listed != in_arena {
      violations.push(Violation::FreeCountMismatch { in_arena, listed });
    }
  }

  for violation in &violations {
    warn!(event = "sanity_violation", %violation, "Consistency check failed");
  }

  violations
}

/// Upper bound on the number of blocks an arena can hold.
fn max_blocks(heap: &Heap) -> usize {
  heap.arena.capacity() / (HEADER_SIZE + MIN_BLOCK_SIZE) + 1
}

/// Returns the list length, or `None` if the walk had to stop early.
fn walk_free_list(
  heap: &Heap,
  violations: &mut Vec<Violation>,
) -> Option<usize> {
  let arena = &heap.arena;
  let limit = max_blocks(heap);

  let Some(mut current) = heap.free.head() else {
    return Some(0);
  };
  let mut visited = 0;

  if !arena.contains(current) {
    violations.push(Violation::ListedOutOfBounds { block: current });
    return None;
  }
  if let Some(prev) = arena.header(current).prev {
    violations.push(Violation::HeadHasPrev {
      block: current,
      prev,
    });
  }

  loop {
    visited += 1;
    if visited > limit {
      violations.push(Violation::FreeListCycle { visited });
      return None;
    }

    let header = arena.header(current);
    if !header.is_free {
      violations.push(Violation::ListedButNotFree { block: current });
    }

    let Some(next) = header.next else {
      return Some(visited);
    };

    if !arena.contains(next) {
      violations.push(Violation::ListedOutOfBounds { block: next });
      return None;
    }

    let back = arena.header(next).prev;
    if back != Some(current) {
      violations.push(Violation::BrokenBackLink {
        block: current,
        next,
        back,
      });
    }

    current = next;
  }
}

/// Returns the number of free blocks met, or `None` if the walk had to stop
/// early.
fn walk_arena(
  heap: &Heap,
  violations: &mut Vec<Violation>,
) -> Option<usize> {
  let arena = &heap.arena;
  let sentinel = arena.sentinel();

  let mut current = arena.first();
  let mut free = 0;

  loop {
    let header = arena.header(current);
    if header.is_sentinel() {
      if current != sentinel {
        violations.push(Violation::MissedSentinel {
          block: current,
          sentinel,
        });
        return None;
      }
      return Some(free);
    }

    if header.is_free {
      free += 1;
    }

    let Some(next) = arena.try_after(current) else {
      violations.push(Violation::BlockOutOfBounds { block: current });
      return None;
    };

    let mirror = arena.header(next);
    if header.size != mirror.prev_size {
      violations.push(Violation::SizeMirror {
        block: current,
        next,
        size: header.size,
        mirrored: mirror.prev_size,
      });
    }
    if header.is_free != mirror.prev_free {
      violations.push(Violation::FreeMirror {
        block: current,
        next,
        is_free: header.is_free,
        mirrored: mirror.prev_free,
      });
    }

    current = next;
  }
}
