//! # Boot configuration
//!
//! Shared, compile-time configuration for the bootloader's heap allocator:
//! the [`Policy`] ids that index a region's strategy vector, and the
//! statically-reserved region table the demo binary registers in place of a
//! real firmware memory map.
//!
//! Kept as its own crate so `boot-alloc` and the `bootloader` binary agree on
//! policy indices without either depending on the other.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod policy;
mod regions;

pub use policy::{POLICY_COUNT, Policy};
pub use regions::{DEMO_REGIONS, RegionDescriptor};
