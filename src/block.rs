//! Block layout primitives.
//!
//! The managed region is a sequence of variable-sized blocks. Every block
//! carries two boundary tags plus two link words, and its base address is
//! the payload address handed to the caller:
//!
//! ```text
//!   word offset:  -2     -1     0                        S-4    S-3
//!                +------+------+------- - - - - - -------+------+------+
//!                | prev | hdr  | payload                 | ftr  | next |
//!                +------+------+------- - - - - - -------+------+------+
//!                              ^
//!                              block base (returned to the user)
//! ```
//!
//! `hdr` and `ftr` are identical boundary tags holding the block size `S`
//! in words plus the allocated flag. `prev` and `next` are free-list links
//! and carry meaning only while the block is free; while it is allocated
//! they hold whatever happens to be there and nothing reads them. The
//! usable payload is `S - 4` words.

use core::ptr;

use log::trace;

use crate::align::{DWORD_WORDS, WORD_BYTES, round_div, round_to};
use crate::tag::Tag;

/// Tag and link words bracketing a block's payload.
pub(crate) const TAG_WORDS: usize = 4;

/// Smallest legal block: four tag words plus one double word of payload.
pub const MIN_BLOCK_WORDS: usize = TAG_WORDS + DWORD_WORDS;

/// A block base address.
///
/// This is a plain address wrapper; every accessor reads or writes the
/// surrounding words, so callers must guarantee the address is the base of
/// a live block inside the managed region.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Block(pub(crate) *mut usize);

impl Block {
  pub(crate) fn base(self) -> *mut usize {
    self.0
  }

  pub(crate) fn addr(self) -> usize {
    self.0 as usize
  }

  /// The address handed to callers; same as the base, typed for users.
  pub(crate) fn user_ptr(self) -> *mut u8 {
    self.0.cast()
  }

  pub(crate) unsafe fn header(self) -> Tag {
    unsafe { Tag::from_raw(*self.0.sub(1)) }
  }

  pub(crate) unsafe fn footer(self) -> Tag {
    let size = unsafe { self.header().size() };
    unsafe { Tag::from_raw(*self.0.add(size - 4)) }
  }

  pub(crate) unsafe fn size(self) -> usize {
    unsafe { self.header().size() }
  }

  pub(crate) unsafe fn is_allocated(self) -> bool {
    unsafe { self.header().is_allocated() }
  }

  /// Writes size `size` into both boundary tags, clearing the allocated flag.
  pub(crate) unsafe fn init(
    self,
    size: usize,
  ) {
    let tag = Tag::pack(size, false);
    unsafe {
      *self.0.sub(1) = tag.raw();
      *self.0.add(size - 4) = tag.raw();
    }
  }

  pub(crate) unsafe fn set_allocated(self) {
    unsafe { self.set_flag(true) }
  }

  pub(crate) unsafe fn set_free(self) {
    unsafe { self.set_flag(false) }
  }

  unsafe fn set_flag(
    self,
    allocated: bool,
  ) {
    unsafe {
      let tag = self.header().with_allocated(allocated);
      *self.0.sub(1) = tag.raw();
      *self.0.add(tag.size() - 4) = tag.raw();
    }
  }

  /// Usable payload size in bytes.
  pub(crate) unsafe fn payload_bytes(self) -> usize {
    unsafe { (self.size() - TAG_WORDS) * WORD_BYTES }
  }

  /// Zeroes the payload words. The tags and links are left alone.
  pub(crate) unsafe fn clear(self) {
    unsafe { ptr::write_bytes(self.0, 0, self.size() - TAG_WORDS) }
  }

  /// The physically following block.
  pub(crate) unsafe fn next_physical(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// The physically preceding block, located through its footer.
  /// Only meaningful when a preceding block exists.
  pub(crate) unsafe fn prev_physical(self) -> Block {
    let prev_size = unsafe { Tag::from_raw(*self.0.sub(4)).size() };
    unsafe { Block(self.0.sub(prev_size)) }
  }

  /// Splits the block into `[size, rest]` when the remainder is big enough
  /// to stand on its own. Both halves come out with the allocated flag
  /// clear; the caller restores flags and free-list membership.
  ///
  /// Returns the right half, or `None` if no split occurred.
  pub(crate) unsafe fn split(
    self,
    size: usize,
  ) -> Option<Block> {
    let rest = unsafe { self.size() } - size;
    if rest < MIN_BLOCK_WORDS {
      return None;
    }
    unsafe {
      self.init(size);
      let right = Block(self.0.add(size));
      right.init(rest);
      Some(right)
    }
  }

  // Free-list link words. The previous link lives at the bottom of the
  // block, the next link at the top; a null address means "none".

  pub(crate) unsafe fn link_prev(self) -> Option<Block> {
    unsafe { from_link(*self.0.sub(2)) }
  }

  pub(crate) unsafe fn link_next(self) -> Option<Block> {
    let size = unsafe { self.size() };
    unsafe { from_link(*self.0.add(size - 3)) }
  }

  pub(crate) unsafe fn set_link_prev(
    self,
    prev: Option<Block>,
  ) {
    unsafe { *self.0.sub(2) = to_link(prev) }
  }

  pub(crate) unsafe fn set_link_next(
    self,
    next: Option<Block>,
  ) {
    let size = unsafe { self.size() };
    unsafe { *self.0.add(size - 3) = to_link(next) }
  }
}

fn from_link(word: usize) -> Option<Block> {
  if word == 0 { None } else { Some(Block(word as *mut usize)) }
}

fn to_link(block: Option<Block>) -> usize {
  block.map_or(0, Block::addr)
}

/// Returns the size in words of the smallest block that can store `n_bytes`
/// bytes of payload, accounting for the four tag words and the double-word
/// size granularity.
pub(crate) fn fit(n_bytes: usize) -> usize {
  let n_words = round_div(n_bytes, WORD_BYTES);
  let size = (TAG_WORDS + round_to(n_words, DWORD_WORDS)).max(MIN_BLOCK_WORDS);
  trace!(
    "fit: requested = {}, allocating = {} * {} = {}",
    n_bytes,
    size,
    WORD_BYTES,
    size * WORD_BYTES
  );
  size
}

#[cfg(test)]
mod tests {
  use super::*;

  // A little scratch region: blocks are laid out by hand starting two words
  // in, the way the heap lays out its first block.
  fn scratch() -> Vec<usize> {
    vec![0usize; 64]
  }

  fn first_block(buf: &mut [usize]) -> Block {
    Block(unsafe { buf.as_mut_ptr().add(2) })
  }

  #[test]
  fn fit_accounts_for_tags_and_dword_rounding() {
    assert_eq!(MIN_BLOCK_WORDS, fit(1));
    assert_eq!(MIN_BLOCK_WORDS, fit(4));
    assert_eq!(MIN_BLOCK_WORDS, fit(2 * WORD_BYTES));
    assert_eq!(8, fit(2 * WORD_BYTES + 1));
    assert_eq!(1028, fit(8192));
    assert_eq!(1254, fit(10000));
    // Degenerate request still yields a legal block.
    assert_eq!(MIN_BLOCK_WORDS, fit(0));
  }

  #[test]
  fn init_writes_matching_tags() {
    let mut buf = scratch();
    let block = first_block(&mut buf);
    unsafe {
      block.init(10);
      assert_eq!(block.header().raw(), block.footer().raw());
      assert_eq!(10, block.size());
      assert!(!block.is_allocated());
      assert_eq!(6 * WORD_BYTES, block.payload_bytes());
    }
  }

  #[test]
  fn allocation_flag_flips_both_tags_and_keeps_the_size() {
    let mut buf = scratch();
    let block = first_block(&mut buf);
    unsafe {
      block.init(8);
      block.set_allocated();
      assert!(block.is_allocated());
      assert_eq!(8, block.size());
      assert_eq!(block.header().raw(), block.footer().raw());
      block.set_free();
      assert!(!block.is_allocated());
      assert_eq!(8, block.size());
    }
  }

  #[test]
  fn split_produces_two_tiled_blocks() {
    let mut buf = scratch();
    let block = first_block(&mut buf);
    unsafe {
      block.init(20);
      let right = block.split(6).expect("remainder is big enough");
      assert_eq!(6, block.size());
      assert_eq!(14, right.size());
      assert_eq!(right, block.next_physical());
      assert_eq!(block, right.prev_physical());
    }
  }

  #[test]
  fn split_refuses_an_undersized_remainder() {
    let mut buf = scratch();
    let block = first_block(&mut buf);
    unsafe {
      block.init(10);
      assert!(block.split(6).is_none());
      // Tags untouched by the refused split.
      assert_eq!(10, block.size());
      assert_eq!(block.header().raw(), block.footer().raw());
    }
  }

  #[test]
  fn links_survive_a_clear_of_the_payload() {
    let mut buf = scratch();
    let block = first_block(&mut buf);
    unsafe {
      block.init(8);
      let other = Block(block.base().add(40));
      block.set_link_prev(Some(other));
      block.set_link_next(None);
      block.clear();
      assert_eq!(Some(other), block.link_prev());
      assert_eq!(None, block.link_next());
      assert_eq!(8, block.size());
    }
  }
}
