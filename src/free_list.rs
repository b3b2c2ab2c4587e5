use crate::arena::Arena;
use crate::block::BlockRef;

/// Doubly linked list of free blocks, threaded through their headers.
///
/// The list only stores the head position; the links themselves live in the
/// arena. Blocks are pushed to the front, so the most recently freed block is
/// found first.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
  head: Option<BlockRef>,
}

impl FreeList {
  pub fn head(&self) -> Option<BlockRef> {
    self.head
  }

  /// Pushes `block` to the front of the list.
  pub fn insert(
    &mut self,
    arena: &mut Arena,
    block: BlockRef,
  ) {
    let header = arena.header_mut(block);
    header.prev = None;
    header.next = self.head;

    if let Some(old_head) = self.head {
      arena.header_mut(old_head).prev = Some(block);
    }

    self.head = Some(block);
  }

  /// Unlinks `block`, which must currently be on the list.
  ///
  /// The block's own links are cleared afterwards.
  pub fn detach(
    &mut self,
    arena: &mut Arena,
    block: BlockRef,
  ) {
    let header = *arena.header(block);

    match (header.prev, header.next) {
      // Sole element.
      (None, None) => {
        debug_assert_eq!(self.head, Some(block));
        self.head = None;
      }
      // First element: its successor becomes the head.
      (None, Some(next)) => {
        debug_assert_eq!(self.head, Some(block));
        arena.header_mut(next).prev = None;
        self.head = Some(next);
      }
      // Last element.
      (Some(prev), None) => {
        arena.header_mut(prev).next = None;
      }
      (Some(prev), Some(next)) => {
        arena.header_mut(prev).next = Some(next);
        arena.header_mut(next).prev = Some(prev);
      }
    }

    let header = arena.header_mut(block);
    header.next = None;
    header.prev = None;
  }

  pub fn iter<'a>(
    &self,
    arena: &'a Arena,
  ) -> Iter<'a> {
    Iter {
      arena,
      next: self.head,
    }
  }
}

/// Walks the free list in list order.
pub(crate) struct Iter<'a> {
  arena: &'a Arena,
  next: Option<BlockRef>,
}

impl Iterator for Iter<'_> {
  type Item = BlockRef;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    self.next = self.arena.header(current).next;
    Some(current)
  }
}
