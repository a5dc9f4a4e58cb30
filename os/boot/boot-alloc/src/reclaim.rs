//! Reclamation hooks: externally supplied routines the allocator calls,
//! at most once each, when every region has refused an allocation.

use boot_sync::SyncOnceCell;

/// Black-box memory-reclaiming callbacks the embedding bootloader supplies.
///
/// The allocator has no knowledge of what these do internally — only that
/// calling them *might* free up blocks it can retry against. Implementations
/// must not themselves allocate; `unload_unneeded_modules` may free.
pub trait ReclaimHooks: Sync {
    /// Invalidate any disk caches the environment maintains. Must be
    /// idempotent and must not allocate.
    fn invalidate_disk_caches(&self);

    /// Unload dynamically loaded modules that are not currently needed. May
    /// free blocks; must not allocate.
    fn unload_unneeded_modules(&self);
}

static HOOKS: SyncOnceCell<&'static dyn ReclaimHooks> = SyncOnceCell::new();

/// Register the environment's reclamation hooks. Only the first call takes
/// effect; later calls are ignored, matching the one-time wiring a
/// bootloader does during early init.
pub fn install(hooks: &'static dyn ReclaimHooks) {
    HOOKS.get_or_init(|| hooks);
}

/// The reclamation steps available, in the order the allocator tries them.
/// `count` in the original source is this sequence's position.
pub(crate) enum Step {
    InvalidateDiskCaches,
    UnloadUnneededModules,
}

/// The next step after `count` attempts, or `None` once the sequence is
/// exhausted and the caller should report out-of-memory.
pub(crate) fn step(count: u32) -> Option<Step> {
    match count {
        0 => Some(Step::InvalidateDiskCaches),
        1 => Some(Step::UnloadUnneededModules),
        _ => None,
    }
}

/// Run one reclamation step. A no-op if nothing was ever installed — a
/// bootloader with no disk cache or dynamic loader has nothing to reclaim.
pub(crate) fn run(step: Step) {
    let Some(hooks) = HOOKS.get() else {
        return;
    };
    match step {
        Step::InvalidateDiskCaches => hooks.invalidate_disk_caches(),
        Step::UnloadUnneededModules => hooks.unload_unneeded_modules(),
    }
}
