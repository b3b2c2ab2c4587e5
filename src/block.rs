use core::{fmt, mem};

use crate::align::ALIGN;

/// Bytes taken by the header in front of every block.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Largest payload a header can describe.
pub const MAX_BLOCK_SIZE: usize = u16::MAX as usize;

const _: () = assert!(HEADER_SIZE % ALIGN == 0);

/// Position of a block header, as a byte offset from the start of the arena.
///
/// Blocks link to each other through these offsets rather than through
/// pointers, so the arena is the only owner of header memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(u32);

impl BlockRef {
  pub(crate) const fn new(offset: usize) -> Self {
    debug_assert!(offset <= u32::MAX as usize);
    Self(offset as u32)
  }

  /// Byte offset of the header from the arena start.
  pub const fn offset(self) -> usize {
    self.0 as usize
  }
}

impl fmt::Display for BlockRef {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "block@{:#06x}", self.0)
  }
}

/// Boundary tag stored right before every payload, free or allocated.
///
/// Besides describing its own block, a header mirrors the size and free
/// status of the block that precedes it in memory. That mirror is what lets
/// release find the lower neighbor without a footer.
///
/// ```text
///   ┌───────────┬───────────┬─────────┬──────┬────────┬────────┐
///   │ prev_free │ prev_size │ is_free │ size │  next  │  prev  │
///   └───────────┴───────────┴─────────┴──────┴────────┴────────┘
///     previous block (mirror)   this block      free-list links
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  pub prev_free: bool,
  pub prev_size: u16,
  pub is_free: bool,
  pub size: u16,
  /// Only meaningful while the block is on the free list.
  pub next: Option<BlockRef>,
  pub prev: Option<BlockRef>,
}

impl Header {
  pub fn new(
    size: usize,
    is_free: bool,
    prev_size: usize,
    prev_free: bool,
  ) -> Self {
    Self {
      prev_free,
      prev_size: narrow(prev_size),
      is_free,
      size: narrow(size),
      next: None,
      prev: None,
    }
  }

  /// The zero-size, never-free header terminating the arena.
  pub fn sentinel(
    prev_size: usize,
    prev_free: bool,
  ) -> Self {
    Self::new(0, false, prev_size, prev_free)
  }

  pub fn payload_size(&self) -> usize {
    usize::from(self.size)
  }

  pub fn prev_payload_size(&self) -> usize {
    usize::from(self.prev_size)
  }

  pub fn set_size(
    &mut self,
    size: usize,
  ) {
    self.size = narrow(size);
  }

  pub fn set_prev(
    &mut self,
    size: usize,
    is_free: bool,
  ) {
    self.prev_size = narrow(size);
    self.prev_free = is_free;
  }

  pub fn is_sentinel(&self) -> bool {
    self.size == 0
  }
}

fn narrow(size: usize) -> u16 {
  debug_assert!(size <= MAX_BLOCK_SIZE, "block size {size} overflows header");
  size as u16
}
