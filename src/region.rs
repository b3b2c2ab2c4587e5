use core::ptr::{self, NonNull};
use std::io;

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};

/// Anonymous, zero-filled memory mapped once from the OS.
///
/// The mapping is returned to the OS when the region is dropped.
pub(crate) struct Region {
  base: NonNull<u8>,
  len: usize,
}

impl Region {
  /// Maps `len` bytes of private anonymous memory.
  pub fn reserve(len: usize) -> io::Result<Self> {
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    let base = NonNull::new(address.cast::<u8>())
      .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

    Ok(Self { base, len })
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Byte offset of `address` from the region start, if it lies inside.
  pub fn offset_of(
    &self,
    address: NonNull<u8>,
  ) -> Option<usize> {
    let offset = address.as_ptr().addr().checked_sub(self.base.as_ptr().addr())?;
    (offset < self.len).then_some(offset)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base.as_ptr().cast::<c_void>(), self.len);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reserved_memory_is_zeroed_and_writable() {
    let region = Region::reserve(4096).unwrap();
    assert_eq!(region.len(), 4096);

    unsafe {
      let bytes = core::slice::from_raw_parts_mut(region.base().as_ptr(), region.len());
      assert!(bytes.iter().all(|&b| b == 0));
      bytes[4095] = 0xAB;
      assert_eq!(bytes[4095], 0xAB);
    }
  }

  #[test]
  fn offset_of_only_accepts_inner_addresses() {
    let region = Region::reserve(4096).unwrap();
    let base = region.base();

    assert_eq!(region.offset_of(base), Some(0));

    let inner = unsafe { base.add(100) };
    assert_eq!(region.offset_of(inner), Some(100));

    let end = unsafe { base.add(4096) };
    assert_eq!(region.offset_of(end), None);

    let other = Region::reserve(4096).unwrap();
    let foreign = unsafe { other.base().add(8) };
    assert_eq!(region.offset_of(foreign), None);
  }
}
