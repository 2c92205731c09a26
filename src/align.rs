//! Word and double-word arithmetic.
//!
//! The allocator counts in machine words (one pointer-sized integer) and
//! aligns everything user-visible to a double word. These helpers are the
//! only place that arithmetic lives.

use core::mem;

use static_assertions::const_assert;

/// Size in bytes of one machine word, the unit of interior addressing.
pub const WORD_BYTES: usize = mem::size_of::<usize>();

/// Block sizes are multiples of two words.
pub const DWORD_WORDS: usize = 2;

/// The alignment, in bytes, of every address handed to a caller.
pub const DWORD_BYTES: usize = DWORD_WORDS * WORD_BYTES;

// A word must be able to carry an address verbatim.
const_assert!(WORD_BYTES == mem::size_of::<*mut u8>());
const_assert!(DWORD_BYTES.is_power_of_two());

/// Returns the smallest `p` such that `n <= p * m`.
pub(crate) const fn round_div(
  n: usize,
  m: usize,
) -> usize {
  n.div_ceil(m)
}

/// Returns the smallest multiple of `m` that is `>= n`.
pub(crate) const fn round_to(
  n: usize,
  m: usize,
) -> usize {
  round_div(n, m) * m
}
