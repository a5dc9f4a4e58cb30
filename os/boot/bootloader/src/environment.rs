//! The concrete bootloader environment: the one place this binary commits to
//! what "invalidate disk caches" and "unload unneeded modules" mean.
//!
//! A real firmware loader would drop sector caches backed by the disk
//! subsystem and unload dynamically loaded modules it no longer needs on the
//! current boot path; this demo binary has neither, so both hooks are
//! observable no-ops beyond a log line — the allocator only needs to know
//! they were tried.

use boot_alloc::ReclaimHooks;

pub struct Environment;

impl ReclaimHooks for Environment {
    fn invalidate_disk_caches(&self) {
        log::debug!("reclaim: no disk cache to invalidate in this environment");
    }

    fn unload_unneeded_modules(&self) {
        log::debug!("reclaim: no loaded modules to unload in this environment");
    }
}

pub static ENVIRONMENT: Environment = Environment;
