//! The heap registry: an ascending-capacity-ordered list of regions, and the
//! public allocation API built on top of the process-wide instance of it.

use crate::block;
use crate::error::{self, AllocError, fatal};
use crate::header::{ALLOC_MAGIC, CELL, BlockHeader, align_cells, align_up_cell, cells_for};
use crate::reclaim;
use crate::region::{RegionHeader, Strategy};
use boot_config::{POLICY_COUNT, Policy};
use boot_sync::{SpinLock, SyncOnceCell};
use core::ptr;

/// A region registry: the head of an ascending-capacity-ordered list of
/// regions.
///
/// Holds only that head pointer; every other field of the design lives
/// inside the donated memory itself, per the allocator's self-embedded-
/// metadata approach. Production code reaches this type only through the
/// process-wide singleton behind the free functions below; tests construct
/// their own instances to stay isolated from one another.
pub(crate) struct Heap {
    head: *mut RegionHeader,
}

// Safety: `head` and the memory it reaches are either confined to a single
// owner (tests) or serialized by the `SpinLock` the global instance lives
// behind.
unsafe impl Send for Heap {}

impl Heap {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    /// Install a memory span as a new region.
    ///
    /// # Safety
    /// `[base, base + size)` must be valid, writable memory not otherwise in
    /// use, and must remain so for as long as this `Heap` is in use.
    pub(crate) unsafe fn register_region(
        &mut self,
        base: usize,
        size: usize,
        policies: [Strategy; POLICY_COUNT],
    ) {
        let aligned_base = align_up_cell(base);
        let lost = aligned_base - base;
        if size <= lost {
            return;
        }
        let avail = size - lost;

        let header_bytes = align_up_cell(size_of::<RegionHeader>());
        if avail <= header_bytes {
            return;
        }
        let usable_bytes = avail - header_bytes;
        let usable_cells = usable_bytes / CELL;
        if usable_cells < 4 {
            // Too small to hold even a minimum split; drop it silently.
            return;
        }
        let usable_bytes = usable_cells * CELL;

        let region = aligned_base as *mut RegionHeader;
        let first_addr = aligned_base + header_bytes;
        let first = first_addr as *mut BlockHeader;

        unsafe {
            ptr::write(
                first,
                BlockHeader {
                    size: usable_cells,
                    magic: crate::header::FREE_MAGIC,
                    prev: first,
                    next: first,
                },
            );
            ptr::write(
                region,
                RegionHeader {
                    first,
                    addr: first_addr,
                    size: usable_bytes,
                    policies,
                    next: ptr::null_mut(),
                },
            );
            self.insert_region(region);
        }
    }

    /// Insert `region` before the first existing region of strictly greater
    /// size, preserving ascending-capacity order.
    unsafe fn insert_region(&mut self, region: *mut RegionHeader) {
        let mut prev: *mut RegionHeader = ptr::null_mut();
        let mut cur = self.head;
        unsafe {
            while !cur.is_null() && (*cur).size <= (*region).size {
                prev = cur;
                cur = (*cur).next;
            }
            (*region).next = cur;
        }
        if prev.is_null() {
            self.head = region;
        } else {
            unsafe {
                (*prev).next = region;
            }
        }
    }

    /// Find the region containing `addr`, if any.
    fn region_containing(&self, addr: usize) -> Option<*mut RegionHeader> {
        let mut cur = self.head;
        while !cur.is_null() {
            let contains = unsafe { (*cur).contains(addr) };
            if contains {
                return Some(cur);
            }
            cur = unsafe { (*cur).next };
        }
        None
    }

    /// Walk the region list, in ascending-capacity order, attempting an
    /// allocation in each one whose strategy for `policy` is not `Skip`.
    fn try_allocate(&self, n: usize, align_cells: usize, policy: Policy) -> *mut u8 {
        let mut cur = self.head;
        while !cur.is_null() {
            let strategy = unsafe { (*cur).policies[policy.index()] };
            if !matches!(strategy, Strategy::Skip) {
                let p = block::allocate_in_region(cur, n, align_cells, strategy);
                if !p.is_null() {
                    return p;
                }
            }
            cur = unsafe { (*cur).next };
        }
        ptr::null_mut()
    }

    /// Allocate `size` bytes aligned to `align` under `policy`, retrying
    /// through the reclamation sequence before reporting out-of-memory.
    ///
    /// Self-contained: holds no external lock, so it is only safe to call
    /// this on a `Heap` you own outright (as the unit tests in this module
    /// do). The process-wide singleton below does **not** call this method;
    /// it runs the same retry-then-reclaim sequence one region-scan at a
    /// time so the global lock is never held while `reclaim::run` executes
    /// (see the module-level `allocate_policy` for why).
    pub(crate) fn allocate_policy(&self, align: usize, size: usize, policy: Policy) -> *mut u8 {
        let n = cells_for(size);
        let align_cells = align_cells(align);

        let mut count = 0;
        loop {
            let p = self.try_allocate(n, align_cells, policy);
            if !p.is_null() {
                return p;
            }

            match reclaim::step(count) {
                Some(step) => {
                    reclaim::run(step);
                    count += 1;
                }
                None => {
                    error::report(AllocError::OutOfMemory);
                    return ptr::null_mut();
                }
            }
        }
    }

    /// Free a previously allocated block. `null` is a no-op.
    pub(crate) fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        if (p as usize) % CELL != 0 {
            fatal!("free of unaligned pointer {p:p}");
        }

        let header = BlockHeader::from_payload(p);
        let Some(region) = self.region_containing(header as usize) else {
            fatal!("free of pointer {p:p} outside all regions");
        };
        if unsafe { (*header).magic } != ALLOC_MAGIC {
            fatal!("free of pointer {p:p} with bad alloc magic");
        }
        block::free_in_region(region, header);
    }

    /// Resize an allocation to `size` bytes with alignment `align` under
    /// `policy`. See the free function [`resize_policy`] for the contract.
    ///
    /// Self-contained like [`Heap::allocate_policy`] above, for the same
    /// reason: fine for a `Heap` you own outright, but the wrong shape for
    /// the locked singleton, which instead calls [`Heap::resize_step`]
    /// directly and performs any fallback allocation/free through the
    /// module-level functions so the lock is dropped first.
    pub(crate) fn resize_policy(
        &mut self,
        p: *mut u8,
        align: usize,
        size: usize,
        policy: Policy,
    ) -> *mut u8 {
        if p.is_null() {
            return self.allocate_policy(align, size, policy);
        }
        if size == 0 {
            self.free(p);
            return ptr::null_mut();
        }

        match self.resize_step(p, size) {
            ResizeStep::Done(ptr) => ptr,
            ResizeStep::Realloc { copy_len } => {
                let new_p = self.allocate_policy(align, size, policy);
                if new_p.is_null() {
                    return ptr::null_mut();
                }
                unsafe {
                    ptr::copy_nonoverlapping(p, new_p, copy_len);
                }
                self.free(p);
                new_p
            }
        }
    }

    /// Validate `p` and either complete its resize in place (no-op shrink,
    /// or a successful grow-in-place) or report that the caller must
    /// allocate a fresh block and copy.
    ///
    /// Split out of [`Heap::resize_policy`] so the locked singleton's
    /// `resize_policy` free function can take the lock for just this one
    /// step and release it before allocating a replacement or freeing the
    /// original — both of which may themselves need the lock, and the
    /// allocation may in turn need to run the (non-allocating-safe, but
    /// potentially freeing) reclamation sequence.
    fn resize_step(&mut self, p: *mut u8, size: usize) -> ResizeStep {
        if (p as usize) % CELL != 0 {
            fatal!("resize of unaligned pointer {p:p}");
        }

        let n = cells_for(size);
        let header = BlockHeader::from_payload(p);

        let Some(region) = self.region_containing(header as usize) else {
            fatal!("resize of pointer {p:p} outside all regions");
        };
        if unsafe { (*header).magic } != ALLOC_MAGIC {
            fatal!("resize of pointer {p:p} with bad alloc magic");
        }

        let old_size = unsafe { (*header).size };
        if old_size >= n || block::try_grow_in_place(region, header, n) {
            return ResizeStep::Done(p);
        }
        let old_capacity_bytes = (old_size - 1) * CELL;
        ResizeStep::Realloc {
            copy_len: old_capacity_bytes.min(size),
        }
    }
}

/// Outcome of [`Heap::resize_step`]: either the resize is already finished,
/// or the caller needs to allocate a replacement of `size` bytes and copy
/// `copy_len` bytes of the old contents into it.
enum ResizeStep {
    Done(*mut u8),
    Realloc { copy_len: usize },
}

static HEAP: SyncOnceCell<SpinLock<Heap>> = SyncOnceCell::new();

fn heap() -> &'static SpinLock<Heap> {
    HEAP.get_or_init(|| SpinLock::new(Heap::new()))
}

/// Install a memory span as a new region, with a strategy per policy.
///
/// Aligns `base` up to a cell boundary and reserves space for the region
/// header; spans left with fewer than four usable cells afterward are
/// silently dropped. This is a best-effort bootstrap routine: it has no
/// error return because there is nothing a caller running before any
/// diagnostics exist could usefully do with one.
///
/// # Safety
/// `[base, base + size)` must be valid, writable memory, exclusively owned
/// by the allocator for the remainder of the program's lifetime.
pub unsafe fn register_region(base: usize, size: usize, policies: [Strategy; POLICY_COUNT]) {
    heap().with_lock(|h| unsafe { h.register_region(base, size, policies) });
}

/// Allocate `size` bytes with default policy and no special alignment. Null
/// on out-of-memory.
#[must_use]
pub fn allocate(size: usize) -> *mut u8 {
    allocate_policy(0, size, Policy::Default)
}

/// Allocate `size` bytes aligned to `align` (a power of two, or 0 treated as
/// 1), default policy. Null on out-of-memory.
#[must_use]
pub fn allocate_aligned(align: usize, size: usize) -> *mut u8 {
    allocate_policy(align, size, Policy::Default)
}

/// As [`allocate`], zero-filling the result on success.
#[must_use]
pub fn allocate_zeroed(size: usize) -> *mut u8 {
    let p = allocate(size);
    if !p.is_null() {
        unsafe {
            ptr::write_bytes(p, 0, size);
        }
    }
    p
}

/// Allocate `size` bytes aligned to `align` under the given placement
/// policy. Retries through the reclamation sequence before reporting
/// out-of-memory. Null on failure; see [`crate::error::last`] for the
/// reported cause.
///
/// The lock is held only for each single region-scan attempt, never while
/// `reclaim::run` executes: a `ReclaimHooks::unload_unneeded_modules`
/// implementation is contractually allowed to call [`free`], which takes the
/// same lock, and the lock is not reentrant.
#[must_use]
pub fn allocate_policy(align: usize, size: usize, policy: Policy) -> *mut u8 {
    let n = cells_for(size);
    let align_cells = align_cells(align);

    let mut count = 0;
    loop {
        let p = heap().with_lock(|h| h.try_allocate(n, align_cells, policy));
        if !p.is_null() {
            return p;
        }

        match reclaim::step(count) {
            Some(step) => {
                reclaim::run(step);
                count += 1;
            }
            None => {
                error::report(AllocError::OutOfMemory);
                return ptr::null_mut();
            }
        }
    }
}

/// Free a previously allocated block. `null` is a no-op.
///
/// # Panics / Fatal
/// Calls the fatal handler (never returns) if `p` is not cell-aligned,
/// belongs to no registered region, or the header reached by rewinding one
/// cell does not carry the allocated magic word.
pub fn free(p: *mut u8) {
    heap().with_lock(|h| h.free(p));
}

/// Resize an allocation under the default policy. See [`resize_policy`].
#[must_use]
pub fn resize(p: *mut u8, size: usize) -> *mut u8 {
    resize_policy(p, 1, size, Policy::Default)
}

/// Resize an allocation to `size` bytes with alignment `align` under
/// `policy`.
///
/// `p == null` delegates to [`allocate_policy`]. `size == 0` frees `p` and
/// returns null. Shrinking never moves the block. Growing tries an in-place
/// extension first; failing that, it allocates, copies, and frees the
/// original — but only once the new allocation has actually succeeded, so a
/// failed grow leaves the caller's original pointer untouched and valid.
///
/// The lock is held only for the validation-and-grow-in-place step; a
/// fallback allocation (which may run reclamation) and the subsequent free
/// of the original block both happen with no lock held, for the same reason
/// given on [`allocate_policy`].
#[must_use]
pub fn resize_policy(p: *mut u8, align: usize, size: usize, policy: Policy) -> *mut u8 {
    if p.is_null() {
        return allocate_policy(align, size, policy);
    }
    if size == 0 {
        free(p);
        return ptr::null_mut();
    }

    match heap().with_lock(|h| h.resize_step(p, size)) {
        ResizeStep::Done(ptr) => ptr,
        ResizeStep::Realloc { copy_len } => {
            let new_p = allocate_policy(align, size, policy);
            if new_p.is_null() {
                return ptr::null_mut();
            }
            unsafe {
                ptr::copy_nonoverlapping(p, new_p, copy_len);
            }
            free(p);
            new_p
        }
    }
}
