//! Region header: placed at the aligned base of each donated memory span.

use crate::header::BlockHeader;
use boot_config::POLICY_COUNT;

/// Per-region traversal and placement rule a [`boot_config::Policy`] resolves
/// to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Strategy {
    /// Walk the ring starting at `first`, stop at the first fit.
    First,
    /// Start at `first.next`, wrap to `first`. The usual default: skipping
    /// the head avoids repeatedly splitting the same block.
    Second,
    /// Walk backwards from `first.prev`, placing the result at the high end
    /// of the fitting block.
    Last,
    /// This region does not participate in the policy.
    Skip,
}

/// Header placed at the aligned base of every registered region.
#[repr(C)]
pub(crate) struct RegionHeader {
    /// Entry point into the region's free-list ring. Not necessarily the
    /// lowest-addressed free block — just somewhere to start. Its `magic`
    /// reads `ALLOC_MAGIC` exactly when the region has no free space left.
    pub(crate) first: *mut BlockHeader,
    /// Byte address of the region's usable span, i.e. just past this header.
    pub(crate) addr: usize,
    /// Usable byte size of the region, excluding this header.
    pub(crate) size: usize,
    /// Strategy selected by each policy for this region.
    pub(crate) policies: [Strategy; POLICY_COUNT],
    /// Next region in the global, ascending-capacity-ordered list.
    pub(crate) next: *mut RegionHeader,
}

impl RegionHeader {
    /// Byte address one past the end of this region's usable span.
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.addr + self.size
    }

    /// Whether `addr` falls within this region's usable span.
    #[inline]
    pub(crate) fn contains(&self, addr: usize) -> bool {
        addr >= self.addr && addr < self.end()
    }
}
