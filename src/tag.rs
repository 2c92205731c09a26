//! Boundary tags.

/// A boundary tag: the block size in words with the allocated flag packed
/// into bit 0. Sizes are always even, so the bit is free to carry the flag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Tag(usize);

impl Tag {
  const ALLOC_BIT: usize = 1;

  pub(crate) fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert_eq!(size & Self::ALLOC_BIT, 0);
    Tag(size | (allocated as usize))
  }

  pub(crate) fn from_raw(word: usize) -> Self {
    Tag(word)
  }

  pub(crate) fn raw(self) -> usize {
    self.0
  }

  pub(crate) fn size(self) -> usize {
    self.0 & !Self::ALLOC_BIT
  }

  pub(crate) fn is_allocated(self) -> bool {
    self.0 & Self::ALLOC_BIT != 0
  }

  pub(crate) fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Tag::pack(self.size(), allocated)
  }
}
