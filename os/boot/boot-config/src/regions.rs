//! Statically-reserved memory spans for the demo bootloader binary.
//!
//! Enumerating firmware memory maps is out of scope for this crate family; the
//! `bootloader` binary stands in for that step by registering a couple of
//! link-time-reserved spans instead of real firmware-donated memory. These
//! constants describe that fake layout, not anything the allocator core
//! depends on.

/// A span of statically-reserved memory along with the policies this
/// bootloader wants for it.
#[derive(Debug, Copy, Clone)]
pub struct RegionDescriptor {
    /// Human-readable label, useful in log output.
    pub name: &'static str,
    /// Byte size of the reserved span.
    pub size: usize,
    /// Whether this span should participate in the "prefer low memory"
    /// policies, mirroring firmware-reported low-memory spans.
    pub low_memory: bool,
}

/// The demo bootloader's reserved spans, smallest first.
///
/// Real firmware typically reports several discontiguous spans of varying
/// size; two is enough to exercise ascending-capacity region ordering without
/// pulling in a memory-map parser.
pub const DEMO_REGIONS: [RegionDescriptor; 2] = [
    RegionDescriptor {
        name: "low-reserve",
        size: 64 * 1024,
        low_memory: true,
    },
    RegionDescriptor {
        name: "main-reserve",
        size: 1024 * 1024,
        low_memory: false,
    },
];
