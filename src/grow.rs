//! Region memory sources.
//!
//! The heap obtains memory through a single sbrk-shaped primitive: "grow
//! my region by this many bytes and give me the previous end". Everything
//! above this seam is oblivious to where the bytes come from, which is
//! what lets the test suite run fully deterministic heaps while production
//! builds move the real program break.

use core::ptr::NonNull;

use libc::{c_void, intptr_t, sbrk};

use crate::align::{DWORD_BYTES, WORD_BYTES, round_div};

/// A source of contiguous region memory.
///
/// # Contract
///
/// * `grow(n)` extends the region by `n` bytes and returns the previous
///   end, i.e. the base of the fresh memory. Successive successful calls
///   return contiguous memory.
/// * `grow(0)` queries the current end without moving it.
/// * On exhaustion, `None`; the region is left unchanged.
///
/// The very first address handed out must be double-word aligned, as the
/// heap derives every user-visible address from it.
pub trait Grow {
  /// Extends the region by `n_bytes` and returns its previous end.
  ///
  /// # Safety
  ///
  /// The returned memory is unique to the caller and lives until the
  /// source is dropped (or forever, for a program-break source).
  unsafe fn grow(
    &mut self,
    n_bytes: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment through `sbrk(2)`.
///
/// ```text
///   Virtual memory layout:
///   ┌─────────────────────┐ high addresses
///   │       stack         │ ↓ grows down
///   │                     │
///   │       heap          │ ↑ grows up (via sbrk)
///   ├─────────────────────┤ ← program break
///   │   data / bss        │
///   └─────────────────────┘ low addresses
/// ```
///
/// The heap assumes it is the only caller moving the break; a libc
/// allocator growing its main arena concurrently breaks the contiguity
/// contract.
pub struct Sbrk;

impl Grow for Sbrk {
  unsafe fn grow(
    &mut self,
    n_bytes: usize,
  ) -> Option<NonNull<u8>> {
    let old = unsafe { sbrk(n_bytes as intptr_t) };
    if old == usize::MAX as *mut c_void {
      // sbrk reports failure as (void *)-1.
      return None;
    }
    NonNull::new(old.cast())
  }
}

/// A deterministic source backed by one preallocated buffer.
///
/// The buffer never moves, so successive grows are contiguous by
/// construction and exhaustion is exact. This is what the test suite runs
/// its heaps on, and it also serves for self-contained heaps that must not
/// touch the program break.
pub struct Arena {
  buf: Vec<usize>,
  used_words: usize,
}

impl Arena {
  /// A source able to hand out at least `n_bytes` in total.
  pub fn with_capacity(n_bytes: usize) -> Self {
    // One spare double word so the first address can be aligned down
    // the line without eating into the capacity.
    let words = round_div(n_bytes, WORD_BYTES) + 2;
    let buf = vec![0usize; words];
    let misaligned = buf.as_ptr() as usize % DWORD_BYTES != 0;
    Arena {
      buf,
      used_words: usize::from(misaligned),
    }
  }

  /// Bytes not yet handed out.
  pub fn remaining_bytes(&self) -> usize {
    (self.buf.len() - self.used_words) * WORD_BYTES
  }
}

impl Grow for Arena {
  unsafe fn grow(
    &mut self,
    n_bytes: usize,
  ) -> Option<NonNull<u8>> {
    let words = round_div(n_bytes, WORD_BYTES);
    if self.buf.len() - self.used_words < words {
      return None;
    }
    let old = unsafe { self.buf.as_mut_ptr().add(self.used_words) };
    self.used_words += words;
    NonNull::new(old.cast())
  }
}
