use crate::align::{ALIGN, MIN_BLOCK_SIZE};
use crate::block::{HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::error::ConfigError;

/// Arena size used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Environment variable overriding the arena capacity, in bytes.
pub const CAPACITY_ENV: &str = "TAGALLOC_ARENA_SIZE";

/// Smallest arena that still fits its own header, the sentinel and one
/// minimum-size block.
pub const MIN_CAPACITY: usize = 2 * HEADER_SIZE + MIN_BLOCK_SIZE;

/// Largest arena whose initial free block still fits a 16-bit size field.
pub const MAX_CAPACITY: usize = 2 * HEADER_SIZE + (MAX_BLOCK_SIZE & !(ALIGN - 1));

/// Sizing of the single arena an [`Allocator`](crate::Allocator) reserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Total bytes requested from the OS, headers included.
  pub capacity: usize,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
    }
  }
}

impl ArenaConfig {
  pub fn with_capacity(capacity: usize) -> Self {
    Self { capacity }
  }

  /// Reads [`CAPACITY_ENV`]; unset or unparsable values keep the default.
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Some(capacity) = std::env::var(CAPACITY_ENV)
      .ok()
      .and_then(|value| value.trim().parse().ok())
    {
      config.capacity = capacity;
    }

    config
  }

  /// Payload bytes of the single free block a fresh arena starts with.
  pub fn initial_block_size(&self) -> usize {
    self.capacity.saturating_sub(2 * HEADER_SIZE)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let capacity = self.capacity;

    if capacity % ALIGN != 0 {
      return Err(ConfigError::Misaligned {
        capacity,
        align: ALIGN,
      });
    }

    if capacity < MIN_CAPACITY {
      return Err(ConfigError::TooSmall {
        capacity,
        minimum: MIN_CAPACITY,
      });
    }

    if capacity > MAX_CAPACITY {
      return Err(ConfigError::TooLarge {
        capacity,
        maximum: MAX_CAPACITY,
      });
    }

    Ok(())
  }
}
