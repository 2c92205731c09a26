//! Heap consistency verification.
//!
//! [`Heap::check`] walks the free list and the block chain and verifies
//! every structural invariant the allocator relies on. The test suite
//! calls it after each mutating step; it is also handy in a debugger when
//! something smells off. [`Heap::log_blocks`] dumps the block map through
//! the `log` facade.

use thiserror::Error;

use crate::align::{DWORD_BYTES, WORD_BYTES};
use crate::block::{Block, MIN_BLOCK_WORDS};
use crate::grow::Grow;
use crate::heap::Heap;

/// A violated heap invariant. Addresses identify the offending block base.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
  #[error("boundary tags disagree at {base:#x}: header {header:#x}, footer {footer:#x}")]
  TagMismatch {
    base: usize,
    header: usize,
    footer: usize,
  },

  #[error("block at {base:#x} has illegal size {size}")]
  BadSize { base: usize, size: usize },

  #[error("block at {base:#x} is not double-word aligned")]
  Misaligned { base: usize },

  #[error("block at {base:#x} of size {size} runs past the region end")]
  ChainOverrun { base: usize, size: usize },

  #[error("adjacent free blocks at {left:#x} and {right:#x}")]
  AdjacentFree { left: usize, right: usize },

  #[error("free block at {base:#x} is missing from the free list")]
  MissingFromList { base: usize },

  #[error("free list entry at {base:#x} is not a free block of the region")]
  BadListEntry { base: usize },

  #[error("free list is not in ascending address order at {base:#x}")]
  OutOfOrder { base: usize },

  #[error("free list back link at {base:#x} does not match the forward walk")]
  BackLinkMismatch { base: usize },

  #[error("free list endpoints disagree with its contents")]
  BadEndpoints,
}

/// Heap statistics gathered by a successful [`Heap::check`] walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapReport {
  /// Blocks in the region, allocated or free.
  pub blocks: usize,
  /// Blocks currently free.
  pub free_blocks: usize,
  /// Words tied up in free blocks, tags included.
  pub free_words: usize,
  /// Total region size in words.
  pub region_words: usize,
}

impl<G: Grow> Heap<G> {
  /// Verifies every structural invariant of the heap.
  ///
  /// The free list is validated first (entries are sane free blocks of
  /// the region, addresses strictly ascend, back links and endpoints
  /// agree), then the block chain (tags agree at both ends, sizes are
  /// legal, the chain tiles the region exactly, no two adjacent blocks
  /// are free, every free block is listed). Returns the gathered
  /// statistics or the first violation found.
  pub fn check(&self) -> Result<HeapReport, CheckError> {
    if self.begin.is_null() {
      if self.free.head().is_some() || self.free.tail().is_some() {
        return Err(CheckError::BadEndpoints);
      }
      return Ok(HeapReport::default());
    }

    let end = self.end as usize;
    let mut report = HeapReport {
      region_words: (end - self.begin as usize) / WORD_BYTES,
      ..HeapReport::default()
    };

    let listed = self.check_free_list(report.region_words)?;

    let mut current = self.begin;
    let mut prev_free = None::<Block>;
    while (current as usize) < end {
      let block = Block(current);
      let base = block.addr();
      if base % DWORD_BYTES != 0 {
        return Err(CheckError::Misaligned { base });
      }
      let header = unsafe { block.header() };
      let size = header.size();
      if size < MIN_BLOCK_WORDS || size % 2 != 0 {
        return Err(CheckError::BadSize { base, size });
      }
      if base + size * WORD_BYTES > end {
        return Err(CheckError::ChainOverrun { base, size });
      }
      let footer = unsafe { block.footer() };
      if header.raw() != footer.raw() {
        return Err(CheckError::TagMismatch {
          base,
          header: header.raw(),
          footer: footer.raw(),
        });
      }
      if !header.is_allocated() {
        if let Some(left) = prev_free {
          return Err(CheckError::AdjacentFree {
            left: left.addr(),
            right: base,
          });
        }
        // The list was validated above, so walking it here is safe.
        if !unsafe { self.free.contains(block) } {
          return Err(CheckError::MissingFromList { base });
        }
        report.free_blocks += 1;
        report.free_words += size;
        prev_free = Some(block);
      } else {
        prev_free = None;
      }
      report.blocks += 1;
      current = unsafe { current.add(size) };
    }

    // Every free chain block is listed and the counts agree, so the two
    // sets are equal.
    if listed != report.free_blocks {
      return Err(CheckError::BadEndpoints);
    }
    Ok(report)
  }

  /// Validates the free list on its own and returns its length. Every
  /// read is bounds-checked against the region before it happens, so this
  /// walk is safe even on a corrupted heap.
  fn check_free_list(
    &self,
    region_words: usize,
  ) -> Result<usize, CheckError> {
    let begin = self.begin as usize;
    let end = self.end as usize;
    // A region of W words holds at most W / MIN_BLOCK_WORDS blocks; more
    // list entries than that means the list cycles.
    let max_blocks = region_words / MIN_BLOCK_WORDS;

    let mut listed = 0;
    let mut prev = None::<Block>;
    let mut current = self.free.head();
    while let Some(block) = current {
      let base = block.addr();
      if base < begin || base >= end || base % DWORD_BYTES != 0 {
        return Err(CheckError::BadListEntry { base });
      }
      let header = unsafe { block.header() };
      let size = header.size();
      if size < MIN_BLOCK_WORDS || base + size * WORD_BYTES > end {
        return Err(CheckError::BadListEntry { base });
      }
      if header.is_allocated() {
        return Err(CheckError::BadListEntry { base });
      }
      if let Some(prev) = prev {
        if base <= prev.addr() {
          return Err(CheckError::OutOfOrder { base });
        }
      }
      if unsafe { block.link_prev() } != prev {
        return Err(CheckError::BackLinkMismatch { base });
      }
      listed += 1;
      if listed > max_blocks {
        return Err(CheckError::BadEndpoints);
      }
      prev = Some(block);
      current = unsafe { block.link_next() };
    }

    if self.free.tail() != prev {
      return Err(CheckError::BadEndpoints);
    }
    Ok(listed)
  }

  /// Logs one line per block, `<allocated> <base>:<size>`, at debug level.
  pub fn log_blocks(&self) {
    if self.begin.is_null() {
      log::debug!("heap: uninitialized");
      return;
    }
    let end = self.end as usize;
    let mut current = self.begin;
    while (current as usize) < end {
      let block = Block(current);
      let (size, allocated) = unsafe { (block.size(), block.is_allocated()) };
      log::debug!("{} {:#x}:{}", u8::from(allocated), block.addr(), size);
      if size < MIN_BLOCK_WORDS || block.addr() + size * WORD_BYTES > end {
        log::debug!("heap: corrupt chain, stopping the walk");
        return;
      }
      current = unsafe { current.add(size) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grow::Arena;
  use crate::tag::Tag;

  fn small_heap() -> Heap<Arena> {
    let mut heap = Heap::with_grow(Arena::with_capacity(16 * 1024));
    unsafe {
      let first = heap.allocate(100);
      heap.allocate(100);
      heap.release(first);
    }
    heap
  }

  #[test]
  fn a_fresh_heap_checks_out_empty() {
    let heap: Heap<Arena> = Heap::with_grow(Arena::with_capacity(1024));
    assert_eq!(Ok(HeapReport::default()), heap.check());
  }

  #[test]
  fn a_used_heap_checks_out_with_statistics() {
    let heap = small_heap();
    let report = heap.check().expect("consistent heap");
    assert_eq!(3, report.blocks);
    assert_eq!(2, report.free_blocks);
    assert_eq!(
      report.region_words,
      report.free_words + crate::block::fit(100)
    );
  }

  #[test]
  fn a_torn_footer_is_reported() {
    let heap = small_heap();
    let block = Block(heap.begin);
    unsafe {
      let size = block.size();
      *block.base().add(size - 4) = Tag::pack(size, true).raw();
    }
    assert!(matches!(heap.check(), Err(CheckError::TagMismatch { .. })));
  }

  #[test]
  fn an_undersized_block_is_reported() {
    let heap = small_heap();
    let block = Block(heap.begin);
    unsafe {
      *block.base().sub(1) = Tag::pack(2, false).raw();
    }
    // The first block is also the list head, so either walk may trip.
    assert!(matches!(
      heap.check(),
      Err(CheckError::BadSize { .. }) | Err(CheckError::BadListEntry { .. })
    ));
  }

  #[test]
  fn a_free_block_outside_the_list_is_reported() {
    let mut heap = small_heap();
    // Empty the list entry while the tags still show a free block.
    let head = heap.free.head().expect("has a free block");
    unsafe {
      heap.free.remove(head);
    }
    assert!(matches!(
      heap.check(),
      Err(CheckError::MissingFromList { .. }) | Err(CheckError::BadEndpoints)
    ));
  }

  #[test]
  fn an_allocated_block_in_the_list_is_reported() {
    let heap = small_heap();
    let head = heap.free.head().expect("has a free block");
    unsafe {
      head.set_allocated();
    }
    assert!(matches!(
      heap.check(),
      Err(CheckError::BadListEntry { .. })
    ));
  }

  #[test]
  fn a_broken_back_link_is_reported() {
    let heap = small_heap();
    let head = heap.free.head().expect("has a free block");
    unsafe {
      // Point the head's back link at itself.
      head.set_link_prev(Some(head));
    }
    assert!(matches!(
      heap.check(),
      Err(CheckError::BackLinkMismatch { .. })
    ));
  }

  #[test]
  fn log_blocks_survives_any_heap_state() {
    let heap: Heap<Arena> = Heap::with_grow(Arena::with_capacity(1024));
    heap.log_blocks();
    let heap = small_heap();
    heap.log_blocks();
  }
}
