use crate::block::MAX_BLOCK_SIZE;
use crate::error::AllocError;

/// Alignment of every payload and every block size.
pub const ALIGN: usize = 8;

/// Smallest payload ever handed out. A freed block must be able to carry its
/// free-list links, so nothing smaller is carved.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Rounds a byte count up to the next multiple of [`ALIGN`].
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 24);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGN - 1) & !($crate::align::ALIGN - 1)
  };
}

/// Turns a raw request into the payload size the allocator will look for.
///
/// The result is the smallest multiple of [`ALIGN`] that is at least the
/// request and at least [`MIN_BLOCK_SIZE`].
///
/// # Errors
///
/// - [`AllocError::InvalidRequest`] for a zero-byte request.
/// - [`AllocError::OutOfMemory`] when the request is larger than any block
///   header can describe.
pub fn normalize(request: usize) -> Result<usize, AllocError> {
  if request == 0 {
    return Err(AllocError::InvalidRequest);
  }

  if request > MAX_BLOCK_SIZE {
    return Err(AllocError::OutOfMemory { requested: request });
  }

  Ok(align!(request).max(MIN_BLOCK_SIZE))
}
