//! Minimal synchronization primitives for a single-threaded boot environment.
//!
//! The bootloader never runs more than one logical thread of control, but its
//! global allocator still needs a `Sync` wrapper to hold state behind a `static`,
//! and its lazily-initialized singletons still need to guarantee they run their
//! constructor exactly once. [`SpinLock`] and [`SyncOnceCell`] provide exactly
//! that much and nothing more: no fairness, no priority inheritance, no
//! interrupt masking.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::SpinLock;
pub use sync_once_cell::SyncOnceCell;
