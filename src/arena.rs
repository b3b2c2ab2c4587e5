use core::ptr::NonNull;

use tracing::debug;

use crate::align::ALIGN;
use crate::block::{BlockRef, HEADER_SIZE, Header};
use crate::error::AllocError;
use crate::region::Region;

/// The single memory region all blocks live in.
///
/// ```text
///   offset 0                                           capacity - HEADER_SIZE
///   ┌────────┬──────────────────┬────────┬─────────────┬────────┐
///   │ header │     payload      │ header │   payload   │sentinel│
///   └────────┴──────────────────┴────────┴─────────────┴────────┘
///            ◄── size bytes ───►
/// ```
///
/// Headers are only reached through [`BlockRef`] offsets; every accessor
/// checks the offset against the end of the region.
pub(crate) struct Arena {
  region: Region,
  sentinel: BlockRef,
}

impl Arena {
  /// Maps `capacity` bytes and lays out one free block followed by the
  /// sentinel.
  pub fn create(capacity: usize) -> Result<Self, AllocError> {
    let region = Region::reserve(capacity).map_err(AllocError::OsReservation)?;

    let size = capacity - 2 * HEADER_SIZE;
    let mut arena = Self {
      region,
      sentinel: BlockRef::new(HEADER_SIZE + size),
    };

    *arena.header_mut(arena.first()) = Header::new(size, true, 0, false);
    *arena.header_mut(arena.sentinel) = Header::sentinel(size, true);

    debug!(
      event = "arena_created",
      capacity,
      base = ?arena.region.base(),
      initial_block = size,
      "Arena reserved"
    );

    Ok(arena)
  }

  pub fn first(&self) -> BlockRef {
    BlockRef::new(0)
  }

  pub fn sentinel(&self) -> BlockRef {
    self.sentinel
  }

  pub fn capacity(&self) -> usize {
    self.region.len()
  }

  /// Whether a whole, aligned header fits at `block`.
  pub fn contains(
    &self,
    block: BlockRef,
  ) -> bool {
    block.offset() % ALIGN == 0 && block.offset() + HEADER_SIZE <= self.region.len()
  }

  pub fn header(
    &self,
    block: BlockRef,
  ) -> &Header {
    assert!(self.contains(block), "{block} lies outside the arena");
    unsafe { &*self.header_ptr(block) }
  }

  pub fn header_mut(
    &mut self,
    block: BlockRef,
  ) -> &mut Header {
    assert!(self.contains(block), "{block} lies outside the arena");
    unsafe { &mut *self.header_ptr(block) }
  }

  fn header_ptr(
    &self,
    block: BlockRef,
  ) -> *mut Header {
    unsafe { self.region.base().as_ptr().add(block.offset()).cast::<Header>() }
  }

  /// The block following `block` in memory.
  pub fn after(
    &self,
    block: BlockRef,
  ) -> BlockRef {
    let next = block.offset() + HEADER_SIZE + self.header(block).payload_size();
    BlockRef::new(next)
  }

  /// Like [`after`](Self::after), but `None` when the neighbor would not
  /// fit before the end of the arena.
  pub fn try_after(
    &self,
    block: BlockRef,
  ) -> Option<BlockRef> {
    if !self.contains(block) {
      return None;
    }
    let next = self.after(block);
    self.contains(next).then_some(next)
  }

  /// The block preceding `block` in memory, found through the mirrored size.
  pub fn before(
    &self,
    block: BlockRef,
  ) -> BlockRef {
    let header = self.header(block);
    let prev = block.offset() - header.prev_payload_size() - HEADER_SIZE;
    BlockRef::new(prev)
  }

  /// Address handed to the caller for `block`.
  pub fn payload(
    &self,
    block: BlockRef,
  ) -> NonNull<u8> {
    unsafe { self.region.base().add(block.offset() + HEADER_SIZE) }
  }

  /// Recovers the block owning a payload address.
  ///
  /// Returns `None` for addresses that cannot be a payload of this arena.
  /// Addresses inside the arena that were never handed out are not detected.
  pub fn block_of(
    &self,
    payload: NonNull<u8>,
  ) -> Option<BlockRef> {
    let offset = self.region.offset_of(payload)?.checked_sub(HEADER_SIZE)?;
    let block = BlockRef::new(offset);
    (block < self.sentinel && self.contains(block)).then_some(block)
  }

  /// Carves `size` payload bytes off the high end of the free `block`.
  ///
  /// `block` keeps its address and shrinks to the remainder; the carved block
  /// is returned already marked as taken. The headers of the remainder, the
  /// carved block and the block after it agree on their mirrors afterwards.
  pub fn split(
    &mut self,
    block: BlockRef,
    size: usize,
  ) -> BlockRef {
    let remainder = self.header(block).payload_size() - size - HEADER_SIZE;
    self.header_mut(block).set_size(remainder);

    let is_free = self.header(block).is_free;
    let carved = self.after(block);
    *self.header_mut(carved) = Header::new(size, false, remainder, is_free);

    let after = self.after(carved);
    self.header_mut(after).set_prev(size, false);

    debug!(
      event = "split",
      %block,
      remainder,
      %carved,
      size,
      "Block split"
    );

    carved
  }
}
