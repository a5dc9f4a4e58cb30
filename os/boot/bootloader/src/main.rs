//! # Demo bootloader entry point
//!
//! Exercises `boot-alloc` end to end: it wires the allocator up as the
//! `#[global_allocator]`, registers a couple of statically-reserved memory
//! spans as regions (standing in for a real firmware memory map), installs
//! the serial logger and reclamation hooks, and then runs the `alloc` crate
//! through its paces so the heap is provably live before handing off.
//!
//! There is no handoff to a kernel here — this binary is a harness for the
//! allocator, not a complete boot chain.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

extern crate alloc;

mod environment;
mod logger;
mod serial;

use alloc::boxed::Box;
use alloc::vec::Vec;
use boot_alloc::{KernelAllocator, Strategy};
use boot_config::{DEMO_REGIONS, POLICY_COUNT, Policy, RegionDescriptor};
use core::panic::PanicInfo;
use log::LevelFilter;

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

const STACK_SIZE: usize = 32 * 1024;

#[repr(align(16))]
struct Stack([u8; STACK_SIZE]);

#[unsafe(link_section = ".bss.boot_stack")]
static mut BOOT_STACK: Stack = Stack([0; STACK_SIZE]);

const LOW_SIZE: usize = DEMO_REGIONS[0].size;
const MAIN_SIZE: usize = DEMO_REGIONS[1].size;

#[repr(align(16))]
struct RegionMem<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.heap_low")]
static mut LOW_REGION: RegionMem<LOW_SIZE> = RegionMem([0; LOW_SIZE]);

#[unsafe(link_section = ".bss.heap_main")]
static mut MAIN_REGION: RegionMem<MAIN_SIZE> = RegionMem([0; MAIN_SIZE]);

/// Entry point jumped to by whatever stage loaded this binary into memory.
///
/// # Naked function & stack
/// A naked function avoids the prologue rustc would otherwise generate
/// against an assumed incoming stack; this binary has no guarantee its
/// loader left `rsp` anywhere sane, so it builds its own frame before
/// touching any Rust code.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start() {
    core::arch::naked_asm!(
        "cli",
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        "and rax, -16",
        "mov rsp, rax",
        "xor rbp, rbp",
        "call {rust_entry}",
        "2:",
        "hlt",
        "jmp 2b",
        stack_sym = sym BOOT_STACK,
        stack_size = const STACK_SIZE,
        rust_entry = sym boot_main,
    );
}

extern "C" fn boot_main() -> ! {
    static LOGGER: spin_once::OnceLogger = spin_once::OnceLogger::new();
    LOGGER.install(LevelFilter::Trace);

    log::info!("boot-alloc demo starting");

    for desc in &DEMO_REGIONS {
        register_demo_region(desc);
    }

    boot_alloc::reclaim::install(&environment::ENVIRONMENT);

    run_allocator_smoke_test();

    log::info!("boot-alloc demo finished; halting");
    halt()
}

fn policies_for(desc: &RegionDescriptor) -> [Strategy; POLICY_COUNT] {
    if desc.low_memory {
        // Conserve low memory: only requests explicitly asking for it may
        // draw from this span.
        [Strategy::Skip, Strategy::Last, Strategy::Last]
    } else {
        [Strategy::Second, Strategy::Skip, Strategy::Skip]
    }
}

fn register_demo_region(desc: &RegionDescriptor) {
    let (addr, size) = match desc.name {
        "low-reserve" => (
            unsafe { core::ptr::addr_of_mut!(LOW_REGION) }.cast::<u8>() as usize,
            LOW_SIZE,
        ),
        "main-reserve" => (
            unsafe { core::ptr::addr_of_mut!(MAIN_REGION) }.cast::<u8>() as usize,
            MAIN_SIZE,
        ),
        other => {
            log::warn!("unrecognized demo region {other:?}, skipping");
            return;
        }
    };
    log::info!("registering region {:?} ({} bytes)", desc.name, size);
    unsafe {
        boot_alloc::register_region(addr, size, policies_for(desc));
    }
}

fn run_allocator_smoke_test() {
    let boxed = Box::new(41u32);
    log::info!("allocated a Box<u32> at {:p}: {}", boxed, *boxed);

    let mut values: Vec<u32> = Vec::new();
    for i in 0..64 {
        values.push(i);
    }
    log::info!("grew a Vec<u32> to {} elements", values.len());

    let low_priority = boot_alloc::allocate_policy(0, 4096, Policy::Low);
    if low_priority.is_null() {
        log::warn!("low-memory allocation failed");
    } else {
        log::info!("allocated {} bytes from the low-memory region", 4096);
        boot_alloc::free(low_priority);
    }

    drop(values);
    drop(boxed);
}

fn halt() -> ! {
    loop {
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("panic: {info}");
    halt()
}

/// A logger that installs itself at most once, so `boot_main` can be a plain
/// function instead of threading initialization state through a trampoline.
mod spin_once {
    use crate::logger::SerialLogger;
    use boot_sync::SyncOnceCell;
    use log::LevelFilter;

    pub struct OnceLogger(SyncOnceCell<SerialLogger>);

    impl OnceLogger {
        pub const fn new() -> Self {
            Self(SyncOnceCell::new())
        }

        pub fn install(&'static self, max_level: LevelFilter) {
            let logger = self.0.get_or_init(|| unsafe { SerialLogger::new(max_level) });
            let _ = logger.install();
        }
    }
}
