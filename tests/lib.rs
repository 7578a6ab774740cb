use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use nativeref::{
    config, reset_leak_sink, set_leak_sink, DisposeHandle, Error, GuardedHandle, LeakReport,
    NativeRef, TraceKind,
};

mod malloc;

use malloc::{MallocBlock, LIVE_BLOCKS};

/// Serialises tests that count leak reports or live allocations.
static TESTMTX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Reports(Mutex<Vec<LeakReport>>);

impl Reports {
    fn install() -> Arc<Reports> {
        let reports = Arc::new(Reports::default());
        let sink = reports.clone();
        set_leak_sink(Arc::new(move |report: LeakReport| {
            sink.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(report)
        }));
        reports
    }

    fn categories(&self) -> Vec<&'static str> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.category)
            .collect()
    }
}

#[test]
fn malloc_block_is_freed_once() {
    let _m = TESTMTX.lock();
    init_logging();
    let before = LIVE_BLOCKS.load(Ordering::SeqCst);

    let mut block = MallocBlock::alloc(64).unwrap();
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before + 1);

    block.get_mut().unwrap().as_mut_slice().fill(0xab);
    assert!(block.get().unwrap().as_slice().iter().all(|&b| b == 0xab));

    block.close().unwrap();
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before);

    for _ in 0..3 {
        let err = block.close().unwrap_err();
        assert!(matches!(err.untraced(), Error::DoubleRelease));
    }
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before);
    assert!(block.get().is_err());
}

#[test]
fn ownership_moves_between_wrappers() {
    let _m = TESTMTX.lock();
    init_logging();
    let before = LIVE_BLOCKS.load(Ordering::SeqCst);

    let mut block = MallocBlock::alloc(16).unwrap();
    block.get_mut().unwrap().as_mut_slice()[0] = 42;

    let (mut old, mut new) = block.transfer(MallocBlock::adopt).unwrap();
    assert!(!old.is_owning_handle());
    assert!(new.is_owning_handle());

    // Closing the disowned wrapper leaves the memory alone.
    old.close().unwrap();
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before + 1);
    assert_eq!(new.get().unwrap().as_slice()[0], 42);

    new.close().unwrap();
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before);
}

#[test]
fn disowned_wrapper_hands_memory_to_caller() {
    let _m = TESTMTX.lock();
    init_logging();
    let reports = Reports::install();
    let before = LIVE_BLOCKS.load(Ordering::SeqCst);

    let block = MallocBlock::alloc(8).unwrap();
    let ptr = block.get().unwrap().as_ptr();
    let disowned = block.disown_handle();
    drop(disowned);

    // Nobody reported, nothing freed: the caller owns the memory now.
    assert!(reports.categories().is_empty());
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before + 1);

    let mut adopted = GuardedHandle::owning(unsafe { MallocBlock::from_raw(ptr, 8) });
    adopted.close().unwrap();
    assert_eq!(LIVE_BLOCKS.load(Ordering::SeqCst), before);
    reset_leak_sink();
}

#[test]
fn leaked_block_is_reported() {
    let _m = TESTMTX.lock();
    init_logging();
    let reports = Reports::install();

    config::set_leak_detection_enabled(true);
    let mut block = MallocBlock::alloc(32).unwrap();
    config::set_leak_detection_enabled(false);
    block.touch(Some("filled by decoder"));

    let mut closed = MallocBlock::alloc(32).unwrap();
    closed.close().unwrap();
    drop(closed);
    assert!(reports.categories().is_empty());

    // Dropping the wrapper leaks the memory. Free it by hand after the report came in.
    let ptr = block.get().unwrap().as_ptr();
    drop(block);
    let categories = reports.categories();
    assert_eq!(categories.len(), 1);
    assert!(categories[0].ends_with("MallocBlock"));
    let mut cleanup = GuardedHandle::owning(unsafe { MallocBlock::from_raw(ptr, 32) });
    cleanup.close().unwrap();
    reset_leak_sink();
}

#[test]
fn leak_report_carries_trace() {
    let _m = TESTMTX.lock();
    init_logging();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    set_leak_sink(Arc::new(move |report: LeakReport| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report)
    }));

    struct Token;
    impl nativeref::Dispose for Token {
        fn dispose(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    let mut token = NativeRef::new(Token, true);
    token.acquire().unwrap();
    token.touch(Some("shared with reader"));
    token.close().unwrap();
    drop(token);

    let reports = reports.lock().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(reports.len(), 1);
    let kinds: Vec<_> = reports[0].trace.points().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        [TraceKind::Acquire, TraceKind::Touch, TraceKind::Close]
    );
    reset_leak_sink();
}

struct Flaky {
    attempts: Arc<AtomicUsize>,
}

impl DisposeHandle for Flaky {
    fn dispose_handle(&mut self, owning_handle: bool) -> Result<(), Error> {
        assert!(owning_handle);
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::disposal("native library refused to release"))
    }
}

#[test]
fn failed_release_is_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut handle = GuardedHandle::owning(Flaky {
        attempts: attempts.clone(),
    });

    let err = handle.close().unwrap_err();
    assert!(matches!(err.untraced(), Error::Disposal(_)));
    assert!(err.to_string().contains("native library refused to release"));
    assert!(!handle.is_accessible());

    let err = handle.close().unwrap_err();
    assert!(matches!(err.untraced(), Error::DoubleRelease));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
