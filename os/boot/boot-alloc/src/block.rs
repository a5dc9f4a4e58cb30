//! The block engine: per-region placement, splitting, coalescing, and the
//! magic-word checks that are this allocator's only defense against
//! use-after-free and double-free.
//!
//! Every function here operates on raw pointers into donated memory and
//! trusts the ring invariants documented on [`RegionHeader`] and
//! [`BlockHeader`]. Callers (in `heap.rs`) are responsible for holding the
//! global lock for the duration of any call into this module.

use crate::error::fatal;
use crate::header::{ALLOC_MAGIC, CELL, FREE_MAGIC, BlockHeader};
use crate::region::{RegionHeader, Strategy};
use core::ptr;

/// Try to satisfy an `n`-cell, `align_cells`-aligned request from a single
/// region under the given strategy. Returns the payload pointer on success.
pub(crate) fn allocate_in_region(
    region: *mut RegionHeader,
    n: usize,
    align_cells: usize,
    strategy: Strategy,
) -> *mut u8 {
    unsafe {
        let first = (*region).first;

        // Everything allocated: the side effect of the last allocation was
        // stamping this sentinel, meaning there is no room left here.
        if (*first).magic == ALLOC_MAGIC {
            return ptr::null_mut();
        }

        let (mut p, stop, backwards) = match strategy {
            Strategy::First => (first, (*first).prev, false),
            Strategy::Second => ((*first).next, first, false),
            Strategy::Last => ((*first).prev, first, true),
            Strategy::Skip => return ptr::null_mut(),
        };

        loop {
            if p.is_null() {
                fatal!("null header in free ring");
            }
            if (*p).magic != FREE_MAGIC {
                fatal!("free magic broken at {p:p}: {:#x}", (*p).magic);
            }

            let payload_addr = p as usize + CELL;
            let mut want = n + ((payload_addr / CELL) & (align_cells - 1));

            if matches!(strategy, Strategy::Last) && (*p).size >= want {
                want += ((*p).size - want) / align_cells * align_cells;
            }

            if (*p).size >= want {
                return carve(region, p, want, n);
            }

            if ptr::eq(p, stop) {
                return ptr::null_mut();
            }
            p = if backwards { (*p).prev } else { (*p).next };
        }
    }
}

/// Shrink `p` to `want` cells, inserting the remainder as a new free node
/// immediately after it in the ring. A no-op if `p` is already exactly
/// `want` cells (or smaller, which would be a caller bug).
unsafe fn split_chunk(p: *mut BlockHeader, want: usize) {
    unsafe {
        if (*p).size <= want {
            return;
        }
        let remainder = (p as usize + want * CELL) as *mut BlockHeader;
        (*remainder).magic = FREE_MAGIC;
        (*remainder).size = (*p).size - want;
        (*remainder).next = (*p).next;
        (*remainder).prev = p;
        (*p).next = remainder;
        (*(*remainder).next).prev = remainder;
        (*p).size = want;
    }
}

/// Carve `want` cells out of free block `p` and return `n` of them as an
/// allocation, reinserting any leftover padding.
unsafe fn carve(region: *mut RegionHeader, mut p: *mut BlockHeader, want: usize, n: usize) -> *mut u8 {
    unsafe {
        split_chunk(p, want);

        if want == n {
            // Exact fit (after any split above): unlink p outright and hand
            // it back as the allocation.
            if ptr::eq(p, (*region).first) {
                (*region).first = (*p).next;
            }
            (*(*p).prev).next = (*p).next;
            (*(*p).next).prev = (*p).prev;
            (*p).magic = ALLOC_MAGIC;
        } else {
            // Alignment padding was consumed: carve the allocation from the
            // tail of p's span. p shrinks but stays linked in place; the
            // tail is handed out without ever touching the ring.
            (*p).size -= n;
            let tail = (p as usize + (*p).size * CELL) as *mut BlockHeader;
            (*tail).size = n;
            (*tail).magic = ALLOC_MAGIC;
            p = tail;
        }

        BlockHeader::payload(p)
    }
}

/// Reinsert a freed block into its region's address-ordered ring, coalescing
/// with whichever neighbors are adjacent in address space.
pub(crate) fn free_in_region(region: *mut RegionHeader, p: *mut BlockHeader) {
    unsafe {
        if (*(*region).first).magic == ALLOC_MAGIC {
            // The region was entirely full; p becomes the sole free block.
            (*p).magic = FREE_MAGIC;
            (*p).prev = p;
            (*p).next = p;
            (*region).first = p;
            return;
        }

        // Walk the ring to find the free node after which p belongs,
        // keeping address order.
        let mut q = (*region).first;
        let last = (*(*region).first).prev;
        while p as usize >= q as usize && !ptr::eq(q, last) {
            if (*q).magic != FREE_MAGIC {
                fatal!("free magic broken at {q:p}: {:#x}", (*q).magic);
            }
            q = (*q).next;
        }
        if (p as usize) < q as usize {
            q = (*q).prev;
        }

        if ptr::eq((*region).first, (*q).next) && (p as usize) < (*q).next as usize {
            (*region).first = p;
        }

        (*p).magic = FREE_MAGIC;
        (*p).next = (*q).next;
        (*(*p).next).prev = p;
        (*q).next = p;
        (*p).prev = q;

        // Forward coalesce: p immediately precedes its ring successor.
        if p as usize + (*p).size * CELL == (*p).next as usize {
            (*(*p).next).magic = 0;
            (*p).size += (*(*p).next).size;
            (*p).next = (*(*p).next).next;
            (*(*p).next).prev = p;
        }

        // Backward coalesce: q immediately precedes p.
        if q as usize + (*q).size * CELL == p as usize {
            (*p).magic = 0;
            (*q).size += (*p).size;
            (*q).next = (*p).next;
            (*(*q).next).prev = q;

            // p may have just been made `first` above; it no longer exists
            // as a free node, so `first` must follow it to the surviving q.
            if ptr::eq((*region).first, p) {
                (*region).first = q;
            }
        }
    }
}

/// Try to grow `p` to `n` cells by consuming a following free neighbor.
/// Returns whether the grow happened; on success `p`'s address is unchanged.
pub(crate) fn try_grow_in_place(region: *mut RegionHeader, p: *mut BlockHeader, n: usize) -> bool {
    unsafe {
        if (*p).size >= n {
            return true;
        }

        let successor = (p as usize + (*p).size * CELL) as *mut BlockHeader;
        if successor as usize >= (*region).end()
            || (*successor).magic != FREE_MAGIC
            || (*p).size + (*successor).size < n
        {
            return false;
        }

        let want = n - (*p).size;
        split_chunk(successor, want);

        (*(*successor).next).prev = (*successor).prev;
        (*(*successor).prev).next = (*successor).next;

        if ptr::eq((*region).first, successor) {
            (*region).first = (*successor).next;
        }
        // The consumed successor may have been the ring's last free block.
        if ptr::eq((*region).first, successor) {
            (*region).first = p;
        }

        (*p).size = n;
        true
    }
}
