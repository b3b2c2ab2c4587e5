//! # tagalloc - A Boundary-Tag Free-List Allocator
//!
//! This crate provides a **first-fit free-list allocator** over a single
//! fixed-size arena mapped once from the OS with `mmap(2)`. Freed blocks are
//! coalesced with their neighbors in O(1) using boundary tags.
//!
//! ## Overview
//!
//! ```text
//!   Arena (64 KiB by default):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ ┌──┬────────┬──┬────┬──┬──────────────────┬──┬──────┬──┐             │
//!   │ │H │  free  │H │used│H │       free       │H │ used │S │             │
//!   │ └──┴────────┴──┴────┴──┴──────────────────┴──┴──────┴──┘             │
//!   │   ▲                    ▲                                 ▲           │
//!   │   │                    │                                 │           │
//!   │   └──── free list ─────┘                             Sentinel        │
//!   │       (doubly linked,                               (size = 0)       │
//!   │        most recent first)                                            │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   H = 24-byte header, S = sentinel header.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!) and request normalization
//!   ├── block      - Block header and arena offsets (internal)
//!   ├── region     - One-shot OS mapping (internal)
//!   ├── arena      - Header access, neighbor arithmetic, split (internal)
//!   ├── free_list  - Insert/detach on the free list (internal)
//!   ├── allocator  - Allocator: allocate, release, stats
//!   ├── check      - Consistency checker
//!   ├── config     - ArenaConfig
//!   └── error      - AllocError, ConfigError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::Allocator;
//!
//! let mut allocator = Allocator::new();
//!
//! let ptr = allocator.allocate(32).unwrap();
//! unsafe {
//!     ptr.cast::<u64>().write(42);
//!     assert_eq!(ptr.cast::<u64>().read(), 42);
//!
//!     allocator.release(Some(ptr));
//! }
//!
//! assert!(allocator.check_consistency().is_empty());
//! ```
//!
//! ## How It Works
//!
//! Every block is preceded by a header that records its own size and free
//! status **and** those of the block right before it:
//!
//! ```text
//!   ┌─────────────────────────┬──────────────────┬─────────────────────────┐
//!   │ header A                │   payload A      │ header B                │
//!   │  size: 64, is_free: T   │   64 bytes       │  prev_size: 64          │
//!   │                         │                  │  prev_free: T           │
//!   └─────────────────────────┴──────────────────┴─────────────────────────┘
//!
//!   after(A)  = A + HEADER + A.size
//!   before(B) = B - B.prev_size - HEADER
//! ```
//!
//! - **Allocation** rounds the request up to a multiple of 8 (at least 8),
//!   takes the first free block that is large enough and, when enough is
//!   left over, carves the request off its high end.
//! - **Release** merges the block with a free lower neighbor and a free upper
//!   neighbor, then pushes the result to the front of the free list.
//!
//! ## Limitations
//!
//! - **Single arena**: the arena never grows; a failed search is final.
//! - **16-bit sizes**: no block holds more than 65535 bytes, which also caps
//!   the arena size.
//! - **Single-threaded**: the allocator takes `&mut self` everywhere.
//! - **Unix-only**: requires `libc` and `mmap`.
//!
//! ## Logging
//!
//! Allocation events are emitted through `tracing` (`trace` per call, `debug`
//! for splits and merges, `warn` for failures and consistency violations).
//! The crate never installs a subscriber.

pub mod align;
mod allocator;
mod arena;
mod block;
mod check;
mod config;
mod error;
mod free_list;
mod region;

pub use allocator::{Allocator, Stats};
pub use block::{BlockRef, HEADER_SIZE, MAX_BLOCK_SIZE};
pub use check::Violation;
pub use config::{ArenaConfig, CAPACITY_ENV, DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
pub use error::{AllocError, ConfigError};
