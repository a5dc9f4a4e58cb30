use boot_sync::SpinLock;
use std::panic;

#[test]
fn with_lock_mutates_and_unlocks() {
    let l = SpinLock::new(0_u32);

    l.with_lock(|v| *v = 41);
    let got = l.with_lock(|v| {
        *v += 1;
        *v
    });
    assert_eq!(got, 42);
}

#[test]
fn with_lock_returns_closure_value() {
    let l = SpinLock::new(String::from("a"));
    let len = l.with_lock(|s| {
        s.push('b');
        s.len()
    });
    assert_eq!(len, 2);

    let got = l.with_lock(std::clone::Clone::clone);
    assert_eq!(got, "ab");
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    let threads = 8; // keep small for determinism
    let iters = 5_000;

    let lock = Arc::new(SpinLock::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                lock.with_lock(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let total = lock.with_lock(|v| *v);
    assert_eq!(total, threads * iters);
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    // The critical section's panic must not leave the lock held.
    let val = l.with_lock(|v| *v);
    assert_eq!(val, 123);
}

/// `SpinLock<T>` is `Sync` whenever `T: Send`.
fn _assert_sync_when_t_send<T: Send>() {
    fn assert_sync<S: Sync>(_s: &S) {}
    let l: SpinLock<T> =
        SpinLock::new(unsafe { core::mem::MaybeUninit::<T>::uninit().assume_init() });
    let _ = || assert_sync(&l);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0u8);
    takes_sync(&l);
}
