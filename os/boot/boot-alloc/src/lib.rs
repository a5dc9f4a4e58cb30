//! # Multi-region heap allocator
//!
//! A general-purpose dynamic memory manager for a freestanding bootloader:
//! aligned allocation, resizing, and freeing against a pool assembled from
//! several discontiguous memory regions, each carrying its own per-policy
//! placement strategy.
//!
//! There is no operating-system allocator underneath this one, no virtual
//! memory, and no unwinding machinery — this crate *is* the bottom of the
//! stack. Three pieces compose it:
//!
//! * [`heap`] — the process-wide region registry and the public allocation
//!   API ([`heap::allocate`], [`heap::free`], [`heap::resize`], ...).
//! * [`block`] — the per-region free-list engine: placement, splitting,
//!   coalescing, and the magic-word checks that catch corruption early.
//! * [`reclaim`] — externally supplied callbacks the allocator retries
//!   through once each before giving up with out-of-memory.
//!
//! Both the block header and the region header live directly inside the
//! memory they describe — there is no side table. That unsafe core is
//! confined to `header`, `region`, and `block`; everything in [`heap`] is a
//! safe surface over it, serialized by a [`boot_sync::SpinLock`].
//!
//! # Concurrency
//!
//! The bootloader this crate targets is single-threaded and non-preemptive.
//! The lock exists to encapsulate the global singleton safely, not to
//! provide real mutual exclusion under contention; no allocator entry point
//! may be called reentrantly from interrupt context.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod block;
pub mod error;
mod global_alloc;
mod header;
pub mod heap;
pub mod reclaim;
mod region;

pub use error::AllocError;
pub use global_alloc::KernelAllocator;
pub use heap::{
    allocate, allocate_aligned, allocate_policy, allocate_zeroed, free, register_region, resize,
    resize_policy,
};
pub use reclaim::ReclaimHooks;
pub use region::Strategy;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use boot_config::Policy;
    use std::vec::Vec;

    /// Leaks a `Vec<u8>` as region-donated memory; the backing allocation
    /// must outlive the process anyway (it's the host `std` heap), and
    /// leaking keeps the lifetime trivially `'static` for these tests.
    fn donate_region(size: usize) -> usize {
        let mut buf: Vec<u8> = Vec::with_capacity(size + 64);
        buf.resize(size + 64, 0);
        let addr = buf.as_mut_ptr() as usize;
        core::mem::forget(buf);
        addr
    }

    fn default_policies() -> [Strategy; boot_config::POLICY_COUNT] {
        [Strategy::Second, Strategy::Skip, Strategy::Skip]
    }

    /// A `Heap` instance private to one test, so parallel test threads never
    /// share region state (the real allocator has exactly one `Heap` for the
    /// life of the program; tests need one each).
    fn fresh_heap(size: usize) -> Heap {
        let mut heap = Heap::new();
        let addr = donate_region(size);
        unsafe {
            heap.register_region(addr, size, default_policies());
        }
        heap
    }

    #[test]
    fn round_trips_to_a_single_free_block() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 100, Policy::Default);
        let b = heap.allocate_policy(0, 200, Policy::Default);
        assert!(!a.is_null());
        assert!(!b.is_null());
        assert_ne!(a, b);

        heap.free(a);
        heap.free(b);

        // Further allocations up to roughly the region's capacity must still
        // succeed, which would not be true if the frees failed to coalesce
        // back into one block.
        let big = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(!big.is_null());
        heap.free(big);
    }

    #[test]
    fn aligned_allocation_is_aligned_and_reusable() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(256, 1, Policy::Default);
        assert!(!a.is_null());
        assert_eq!((a as usize) % 256, 0);

        heap.free(a);

        let b = heap.allocate_policy(1, 1, Policy::Default);
        assert!(!b.is_null());
        assert!((b as usize) <= (a as usize));
    }

    #[test]
    fn smaller_region_is_tried_first_then_falls_through() {
        // Two regions of very different capacity; the region list keeps
        // them in ascending order, so an 8 KiB request must fail against the
        // 1 KiB region before succeeding in the 16 KiB one.
        let mut heap = fresh_heap(1024);
        let addr = donate_region(16 * 1024);
        unsafe {
            heap.register_region(addr, 16 * 1024, default_policies());
        }

        let p = heap.allocate_policy(0, 8 * 1024, Policy::Default);
        assert!(!p.is_null());
        heap.free(p);
    }

    #[test]
    fn exhaustion_then_free_then_succeed() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 1024, Policy::Default);
        let b = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!a.is_null());
        assert!(!b.is_null());

        let c = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(c.is_null(), "region should be exhausted");

        heap.free(a);
        let d = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!d.is_null(), "freeing should make room again");

        heap.free(b);
        heap.free(d);
    }

    #[test]
    fn resize_grows_in_place_after_freeing_neighbor() {
        let mut heap = fresh_heap(8192);

        let a = heap.allocate_policy(0, 1024, Policy::Default);
        let b = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!a.is_null() && !b.is_null());

        heap.free(b);

        let grown = heap.resize_policy(a, 1, 1536, Policy::Default);
        assert_eq!(grown, a, "grow-in-place must not move the block");

        heap.free(grown);
    }

    #[test]
    fn resize_moves_and_preserves_contents_when_no_room() {
        let mut heap = fresh_heap(8192);

        let a = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!a.is_null());
        unsafe {
            core::ptr::write_bytes(a, 0xAB, 1024);
        }

        let b = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!b.is_null());

        let grown = heap.resize_policy(a, 1, 1536, Policy::Default);
        assert!(!grown.is_null());
        assert_ne!(grown, a, "no room to grow in place; block must move");

        let preserved = unsafe { core::slice::from_raw_parts(grown, 1024) };
        assert!(preserved.iter().all(|&b| b == 0xAB));

        heap.free(grown);
        heap.free(b);
    }

    #[test]
    fn free_of_null_is_a_no_op() {
        let mut heap = fresh_heap(4096);
        heap.free(core::ptr::null_mut());
    }

    /// Freeing three blocks in reverse address order must still converge on
    /// one fully-coalesced free block, exercising the `p < first` edge case
    /// in the ring-insertion walk that Design Note 9 calls out as subtle.
    #[test]
    fn reverse_order_frees_still_coalesce_fully() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 256, Policy::Default);
        let b = heap.allocate_policy(0, 256, Policy::Default);
        let c = heap.allocate_policy(0, 256, Policy::Default);
        assert!(!a.is_null() && !b.is_null() && !c.is_null());

        // Reverse order: the last allocation frees first, so each free
        // lands before the current `first` node.
        heap.free(c);
        heap.free(b);
        heap.free(a);

        let big = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(
            !big.is_null(),
            "reverse-order frees must coalesce back to one block"
        );
        heap.free(big);
    }

    /// Same three allocations, freed in a middle-first, then-low, then-high
    /// order, covering a different interleaving of the forward/backward
    /// coalesce checks than strict address or reverse-address order would.
    #[test]
    fn out_of_order_frees_still_coalesce_fully() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 256, Policy::Default);
        let b = heap.allocate_policy(0, 256, Policy::Default);
        let c = heap.allocate_policy(0, 256, Policy::Default);
        assert!(!a.is_null() && !b.is_null() && !c.is_null());

        heap.free(b);
        heap.free(a);
        heap.free(c);

        let big = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(
            !big.is_null(),
            "out-of-order frees must coalesce back to one block"
        );
        heap.free(big);
    }

    /// Freeing a block with an already-free neighbor on *both* sides in one
    /// call exercises the forward and backward coalesce branches together,
    /// which is also the shape that can leave `region.first` dangling if a
    /// backward coalesce absorbs whatever `first` was just repointed to.
    #[test]
    fn freeing_a_block_flanked_by_two_free_neighbors_fully_coalesces() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 256, Policy::Default);
        let b = heap.allocate_policy(0, 256, Policy::Default);
        let c = heap.allocate_policy(0, 256, Policy::Default);
        assert!(!a.is_null() && !b.is_null() && !c.is_null());

        // a and c become free, non-adjacent (b still separates them), then
        // freeing b in the middle must coalesce all three into one block.
        heap.free(a);
        heap.free(c);
        heap.free(b);

        let big = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(
            !big.is_null(),
            "freeing a block flanked by two free neighbors must coalesce all three \
             (region.first must not end up dangling from the backward coalesce)"
        );
        heap.free(big);

        // A second round trip confirms the ring (and `first`) are still
        // well-formed, not just the first allocation after the coalesce.
        let again = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(!again.is_null());
        heap.free(again);
    }

    /// Registering the same two region sizes in either order must leave the
    /// set of satisfiable requests unchanged, even though exact addresses
    /// may differ: the region list is kept in ascending-capacity order
    /// regardless of registration order.
    #[test]
    fn registration_order_does_not_affect_satisfiability() {
        let mut forward = Heap::new();
        let small_addr = donate_region(1024);
        let large_addr = donate_region(16 * 1024);
        unsafe {
            forward.register_region(small_addr, 1024, default_policies());
            forward.register_region(large_addr, 16 * 1024, default_policies());
        }

        let mut backward = Heap::new();
        let large_addr2 = donate_region(16 * 1024);
        let small_addr2 = donate_region(1024);
        unsafe {
            backward.register_region(large_addr2, 16 * 1024, default_policies());
            backward.register_region(small_addr2, 1024, default_policies());
        }

        let p1 = forward.allocate_policy(0, 8 * 1024, Policy::Default);
        let p2 = backward.allocate_policy(0, 8 * 1024, Policy::Default);
        assert!(!p1.is_null());
        assert!(!p2.is_null());
        forward.free(p1);
        backward.free(p2);
    }

    /// A region whose strategy vector marks a policy `Skip` must never be
    /// chosen for that policy, even when it is the only region installed.
    #[test]
    fn skip_policy_never_matches_a_region() {
        let mut heap = Heap::new();
        let addr = donate_region(4096);
        unsafe {
            // Only the default policy is usable here; Low and LowEnd are
            // both Skip, mirroring how a normal (non-low-memory) region is
            // configured in the demo bootloader.
            heap.register_region(addr, 4096, [Strategy::Second, Strategy::Skip, Strategy::Skip]);
        }

        let p = heap.allocate_policy(0, 256, Policy::Low);
        assert!(p.is_null(), "Skip policy must never be satisfied");

        let q = heap.allocate_policy(0, 256, Policy::Default);
        assert!(!q.is_null());
        heap.free(q);
    }

    /// A span too small to hold even a minimum split (fewer than four
    /// usable cells after alignment and the region header) is silently
    /// dropped; it must not end up in the region list at all.
    #[test]
    fn region_too_small_is_silently_dropped() {
        let mut heap = Heap::new();
        let addr = donate_region(64);
        unsafe {
            heap.register_region(addr, 1, default_policies());
        }

        // No region was installed, so even a tiny allocation must fail
        // rather than be served from whatever fragment `register_region`
        // almost accepted.
        let p = heap.allocate_policy(0, 1, Policy::Default);
        assert!(p.is_null());
    }

    #[test]
    fn resize_to_zero_frees_and_returns_null() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 256, Policy::Default);
        assert!(!a.is_null());

        let result = heap.resize_policy(a, 1, 0, Policy::Default);
        assert!(result.is_null());

        // The freed block must be available again in full.
        let big = heap.allocate_policy(0, 3000, Policy::Default);
        assert!(!big.is_null());
        heap.free(big);
    }

    #[test]
    fn resize_of_null_delegates_to_allocate() {
        let mut heap = fresh_heap(4096);

        let p = heap.resize_policy(core::ptr::null_mut(), 1, 256, Policy::Default);
        assert!(!p.is_null());
        heap.free(p);
    }

    #[test]
    fn resize_shrink_never_moves_the_block() {
        let mut heap = fresh_heap(4096);

        let a = heap.allocate_policy(0, 1024, Policy::Default);
        assert!(!a.is_null());

        let shrunk = heap.resize_policy(a, 1, 64, Policy::Default);
        assert_eq!(shrunk, a, "resize must never shrink by moving");

        heap.free(shrunk);
    }

    /// The only test exercising the process-wide singleton: reclamation
    /// hooks are themselves a process-wide registration (there is exactly
    /// one environment to reclaim from), so there is no isolated-instance
    /// equivalent to fall back to here.
    #[test]
    fn reclamation_hook_retried_once_then_succeeds() {
        use crate::reclaim::{ReclaimHooks, install};
        use boot_sync::SpinLock;

        struct Frees(&'static SpinLock<Option<*mut u8>>);
        unsafe impl Sync for Frees {}
        impl ReclaimHooks for Frees {
            fn invalidate_disk_caches(&self) {}
            fn unload_unneeded_modules(&self) {
                self.0.with_lock(|slot| {
                    if let Some(p) = slot.take() {
                        free(p);
                    }
                });
            }
        }

        static SLOT: SpinLock<Option<*mut u8>> = SpinLock::new(None);
        static HOOKS: Frees = Frees(&SLOT);
        install(&HOOKS);

        let addr = donate_region(4096);
        unsafe {
            register_region(addr, 4096, default_policies());
        }
        let a = allocate(1024);
        let b = allocate(1024);
        assert!(!a.is_null() && !b.is_null());
        assert!(allocate(1024).is_null(), "region should be exhausted");

        SLOT.with_lock(|slot| *slot = Some(b));

        let c = allocate_policy(1, 1024, Policy::Default);
        assert!(
            !c.is_null(),
            "unload hook should have freed enough for this to succeed"
        );

        free(a);
        free(c);
    }
}
