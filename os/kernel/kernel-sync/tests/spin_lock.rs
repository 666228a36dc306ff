use kernel_sync::SpinLock;
use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::named("counter", 0_u32);
    {
        let mut g = l.lock();
        *g = 41;
    }
    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
    assert_eq!(l.name(), "counter");
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock().expect("uncontended");
    assert_eq!(*g1, 1);
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn plain_lock_does_not_record_an_owner() {
    let l = SpinLock::new(());
    let _g = l.lock();
    assert!(!l.holding(0));
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(String::from("a"));
    let len = l.with_lock(|s| {
        s.push('b');
        s.len()
    });
    assert_eq!(len, 2);
    assert_eq!(l.into_inner(), "ab");
}

#[test]
fn get_mut_bypasses_the_lock() {
    let mut l = SpinLock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    const THREADS: usize = 8;
    const ITERS: usize = 5_000;

    let lock = SpinLock::new(0usize);
    let in_cs = AtomicUsize::new(0);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERS {
                    lock.with_lock(|v| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            });
        }
    });

    assert_eq!(lock.into_inner(), THREADS * ITERS);
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

    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0u8);
    takes_sync(&l);
}
