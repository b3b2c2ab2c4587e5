use std::io;

/// Failures reported by [`Allocator`](crate::Allocator) operations.
///
/// None of them leave partial work behind: when an error is returned the
/// arena, the free list and the usage counters are as they were before the
/// call.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
  /// Zero-byte allocation request.
  #[error("allocation request must be at least one byte")]
  InvalidRequest,
  /// No free block is large enough. The arena never grows.
  #[error("no free block can hold {requested} bytes")]
  OutOfMemory { requested: usize },
  /// The allocator already owns an arena.
  #[error("an arena has already been reserved for this allocator")]
  ArenaAlreadyExists,
  /// The one-time OS mapping failed; carries the OS error code.
  #[error("failed to reserve the arena from the OS")]
  OsReservation(#[source] io::Error),
  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// An [`ArenaConfig`](crate::ArenaConfig) that no arena can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  #[error("arena capacity {capacity} is not a multiple of {align}")]
  Misaligned { capacity: usize, align: usize },
  #[error("arena capacity {capacity} is below the minimum of {minimum} bytes")]
  TooSmall { capacity: usize, minimum: usize },
  #[error("arena capacity {capacity} exceeds the maximum of {maximum} bytes")]
  TooLarge { capacity: usize, maximum: usize },
}
