//! # tagalloc - A Boundary-Tag Heap Allocator Library
//!
//! This crate provides a classic **boundary-tag allocator** with an explicit,
//! address-ordered free list, managing memory obtained through an `sbrk`
//! style primitive.
//!
//! ## Overview
//!
//! The allocator tiles one contiguous, monotonically growing region with
//! variable-sized blocks. Every block carries its size at both ends, and
//! free blocks double as nodes of a doubly-linked free list threaded
//! through their own payload words:
//!
//! ```text
//!   Block layout (sizes in words, base = address handed to the user):
//!
//!   word offset:  -2     -1     0                        S-4    S-3
//!                +------+------+------- - - - - - -------+------+------+
//!                | prev | hdr  | payload                 | ftr  | next |
//!                +------+------+------- - - - - - -------+------+------+
//!
//!   hdr == ftr == size | allocated-bit
//!   prev/next: free-list links, only meaningful while the block is free
//! ```
//!
//! Three layers, bottom up:
//!
//! ```text
//!   tagalloc
//!   ├── align      - word / double-word arithmetic
//!   ├── tag        - boundary tags (size + allocated bit in one word)
//!   ├── block      - block layout: init, split, tags, physical neighbors
//!   ├── freelist   - address-ordered doubly-linked list of free blocks
//!   ├── grow       - the OS seam: Sbrk for production, Arena for tests
//!   ├── heap       - the region manager and the four entry points
//!   └── check      - invariant verification and block-map logging
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagalloc::Heap;
//!
//! fn main() {
//!     let mut heap = Heap::new();
//!
//!     unsafe {
//!         let ptr = heap.allocate(64) as *mut u64;
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         let ptr = heap.resize(ptr as *mut u8, 128);
//!         heap.release(ptr);
//!     }
//! }
//! ```
//!
//! Or through the process-wide instance, which serializes callers behind a
//! spin lock and carries the C-style `malloc`/`free`/`calloc`/`realloc`
//! contracts:
//!
//! ```rust,ignore
//! let ptr = unsafe { tagalloc::allocate(64) };
//! unsafe { tagalloc::release(ptr) };
//! ```
//!
//! ## How It Works
//!
//! - **Allocation** is first-fit over the free list, splitting oversize
//!   blocks and lazily growing the region in 8 KiB chunks when the search
//!   comes up empty.
//! - **Release** is eager coalescing: the freed block melts into free
//!   neighbors on both sides, so no two adjacent free blocks ever exist.
//!   The address-ordered list makes the neighbor fixups O(1) once the
//!   block is spliced in.
//! - **Resize** stays in place whenever it can: same fit, shrink with the
//!   tail shed back to the free list, growth into a free right neighbor,
//!   or growth of the region itself when the block is the last one.
//!   Only as a last resort does the payload move.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: a heap must be serialized externally (the
//!   global instance wraps one in a spin lock)
//! - **Nothing returns to the OS**: the region only grows
//! - **Double-word alignment only**: no stricter alignment requests
//! - **Unix-only** production source: `Sbrk` requires `sbrk(2)`
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory
//! management. Callers must uphold the usual allocator contract: no use
//! after release, no double release, no foreign pointers (the entry
//! points shrug off what they can detect, but that is best-effort).

pub mod align;
mod block;
pub mod check;
mod freelist;
mod grow;
mod heap;
mod tag;

pub use block::MIN_BLOCK_WORDS;
pub use check::{CheckError, HeapReport};
pub use grow::{Arena, Grow, Sbrk};
pub use heap::{CHUNK_BYTES, Heap};

use spin::Mutex;

/// The process-wide heap behind the free functions below.
static HEAP: Mutex<Heap> = Mutex::new(Heap::new());

/// Allocates at least `n_bytes` bytes from the process-wide heap.
/// The C `malloc` contract: null when `n_bytes` is 0 or memory is
/// exhausted, a double-word aligned pointer otherwise.
///
/// # Safety
///
/// See [`Heap::allocate`].
pub unsafe fn allocate(n_bytes: usize) -> *mut u8 {
  unsafe { HEAP.lock().allocate(n_bytes) }
}

/// Returns a block to the process-wide heap. The C `free` contract:
/// null is a no-op.
///
/// # Safety
///
/// See [`Heap::release`].
pub unsafe fn release(ptr: *mut u8) {
  unsafe { HEAP.lock().release(ptr) }
}

/// Allocates zeroed room for `count` elements of `size` bytes each from
/// the process-wide heap. The C `calloc` contract.
///
/// # Safety
///
/// See [`Heap::zero_allocate`].
pub unsafe fn zero_allocate(
  count: usize,
  size: usize,
) -> *mut u8 {
  unsafe { HEAP.lock().zero_allocate(count, size) }
}

/// Resizes an allocation of the process-wide heap to at least `n_bytes`
/// bytes. The C `realloc` contract: equivalent to [`allocate`] when `ptr`
/// is null and to [`release`] when `n_bytes` is 0.
///
/// # Safety
///
/// See [`Heap::resize`].
pub unsafe fn resize(
  ptr: *mut u8,
  n_bytes: usize,
) -> *mut u8 {
  unsafe { HEAP.lock().resize(ptr, n_bytes) }
}

#[cfg(test)]
mod tests {
  // The global instance is shared across the whole test binary, so this
  // single test keeps to itself: everything it allocates, it releases.
  #[test]
  fn global_heap_round_trip() {
    unsafe {
      let ptr = super::allocate(64) as *mut u64;
      assert!(!ptr.is_null());
      ptr.write(0xABCD_EF01_2345_6789);

      let zeroed = super::zero_allocate(4, 16);
      assert!(!zeroed.is_null());
      for i in 0..64 {
        assert_eq!(0, *zeroed.add(i));
      }

      let grown = super::resize(ptr as *mut u8, 256);
      assert!(!grown.is_null());
      assert_eq!(0xABCD_EF01_2345_6789, grown.cast::<u64>().read());

      super::release(grown);
      super::release(zeroed);
      assert!(super::allocate(0).is_null());
    }
  }
}
