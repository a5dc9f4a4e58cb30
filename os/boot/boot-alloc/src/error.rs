//! Error handling: a recoverable [`AllocError`] channel plus a fatal-corruption
//! escape hatch, mirroring the two failure classes the allocator can hit.

use boot_sync::SyncOnceCell;
use core::fmt::Arguments;
use core::sync::atomic::{AtomicBool, Ordering};

/// The one recoverable failure the allocator reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// No region, even after running the reclamation sequence, could
    /// satisfy the request.
    #[error("out of memory")]
    OutOfMemory,
}

static LAST_ERROR: AtomicBool = AtomicBool::new(false);

/// Record a recoverable error on the process-wide channel.
///
/// There is currently only one variant, so this is a flag rather than a full
/// slot; it exists as its own function so call sites read the same way a
/// richer error channel would.
pub(crate) fn report(err: AllocError) {
    log::warn!("allocator error: {err}");
    LAST_ERROR.store(true, Ordering::Release);
}

/// The most recently reported recoverable error, if any since the last
/// [`clear`].
#[must_use]
pub fn last() -> Option<AllocError> {
    if LAST_ERROR.load(Ordering::Acquire) {
        Some(AllocError::OutOfMemory)
    } else {
        None
    }
}

/// Clear the process-wide error channel.
pub fn clear() {
    LAST_ERROR.store(false, Ordering::Release);
}

/// Handler invoked when the allocator detects corruption it cannot recover
/// from. Never expected to return; the default handler spins forever.
pub trait FatalHandler: Sync {
    fn halt(&self, args: Arguments<'_>) -> !;
}

struct SpinForever;

impl FatalHandler for SpinForever {
    fn halt(&self, args: Arguments<'_>) -> ! {
        log::error!("{args}");
        loop {
            core::hint::spin_loop();
        }
    }
}

static FATAL_HANDLER: SyncOnceCell<&'static dyn FatalHandler> = SyncOnceCell::new();

/// Install a custom fatal handler, e.g. one that resets the firmware instead
/// of spinning. Only the first call has any effect.
pub fn install_fatal_handler(handler: &'static dyn FatalHandler) {
    FATAL_HANDLER.get_or_init(|| handler);
}

/// Report unrecoverable heap corruption and diverge.
///
/// Called whenever an internal consistency check fails: a wrong magic word,
/// a pointer outside every registered region, or a null encountered while
/// walking a ring. None of these are recoverable — they indicate a bug
/// elsewhere in the bootloader — so this never returns.
pub(crate) fn fatal(args: Arguments<'_>) -> ! {
    let handler = FATAL_HANDLER.get_or_init(|| &SpinForever);
    handler.halt(args)
}

macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::fatal(format_args!($($arg)*))
    };
}
pub(crate) use fatal;
