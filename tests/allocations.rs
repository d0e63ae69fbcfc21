use sharedrop::{
    const_cast_pointer, dynamic_cast_pointer, make_shared, static_cast_pointer, SharedPointer,
    WeakPointer,
};

use std::alloc::{GlobalAlloc, Layout, System};
use std::any::Any;
use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Counts are kept per thread so that tests running in parallel, and the test
// harness itself, do not disturb each other.
thread_local! {
    static ALLOCS: Cell<usize> = const { Cell::new(0) };
    static DEALLOCS: Cell<usize> = const { Cell::new(0) };
    static FAIL_NEXT: Cell<bool> = const { Cell::new(false) };
}

struct Counting;

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if FAIL_NEXT.try_with(|fail| fail.replace(false)).unwrap_or(false) {
            return ptr::null_mut();
        }
        let _ = ALLOCS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = DEALLOCS.try_with(|count| count.set(count.get() + 1));
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

struct Counts {
    allocs: usize,
    deallocs: usize,
}

fn counted<R, F: FnOnce() -> R>(f: F) -> (R, Counts) {
    let allocs = ALLOCS.with(Cell::get);
    let deallocs = DEALLOCS.with(Cell::get);
    let result = f();
    let counts = Counts {
        allocs: ALLOCS.with(Cell::get) - allocs,
        deallocs: DEALLOCS.with(Cell::get) - deallocs,
    };

    (result, counts)
}

fn fail_next_allocation() {
    FAIL_NEXT.with(|fail| fail.set(true));
}

struct Test(Arc<AtomicUsize>);

impl Drop for Test {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct Pair<A, B> {
    first: A,
    second: B,
}

#[test]
fn make_shared_allocates_once() {
    let (pair, counts) = counted(|| make_shared(Pair { first: 1, second: 2 }));
    assert_eq!(counts.allocs, 1);
    assert_eq!(pair.first, 1);
    assert_eq!(pair.second, 2);

    let ((), counts) = counted(move || drop(pair));
    assert_eq!(counts.deallocs, 1);
}

#[test]
fn adopting_raw_pointer_allocates_twice() {
    let (pair, counts) = counted(|| {
        let raw = Box::into_raw(Box::new(Pair { first: 1, second: 2 }));
        unsafe { SharedPointer::from_raw(raw) }
    });
    assert_eq!(counts.allocs, 2);
    assert_eq!(pair.first + pair.second, 3);

    let ((), counts) = counted(move || drop(pair));
    assert_eq!(counts.deallocs, 2);
}

#[test]
fn in_place_block_outlives_value() {
    let ((), counts) = counted(|| {
        let shared = SharedPointer::new(String::from("value"));
        let weak = WeakPointer::new(&shared);

        let ((), on_last_strong) = counted(move || drop(shared));
        // The string's buffer is freed, the combined block is not.
        assert_eq!(on_last_strong.deallocs, 1);
        assert!(weak.expired());

        let ((), on_last_weak) = counted(move || drop(weak));
        assert_eq!(on_last_weak.deallocs, 1);
    });

    assert_eq!(counts.allocs, counts.deallocs);
}

#[test]
fn owning_block_outlives_value() {
    let ((), counts) = counted(|| {
        let shared = SharedPointer::from_box(Box::new(7u64));
        let weak = shared.downgrade();
        let weak2 = weak.clone();

        let ((), on_last_strong) = counted(move || drop(shared));
        assert_eq!(on_last_strong.deallocs, 1);

        drop(weak);
        let ((), on_last_weak) = counted(move || drop(weak2));
        assert_eq!(on_last_weak.deallocs, 1);
    });

    assert_eq!(counts.allocs, 2);
    assert_eq!(counts.deallocs, 2);
}

#[test]
fn handles_and_casts_do_not_allocate() {
    let shared = SharedPointer::new(5u32);
    let any: SharedPointer<dyn Any + Send + Sync> =
        SharedPointer::from_box(Box::new(String::from("a")));

    let ((), counts) = counted(|| {
        let copy = shared.clone();
        let weak = copy.downgrade();
        let locked = weak.lock();
        let view = static_cast_pointer(&locked, |v| v as &(dyn Any + Send + Sync));
        let back = dynamic_cast_pointer::<u32, _>(&view);
        let cell = const_cast_pointer(&back);
        let string = dynamic_cast_pointer::<String, _>(&any);

        assert_eq!(*back, 5);
        assert_eq!(shared.use_count(), 6);
        assert_eq!(string.len(), 1);
        drop((copy, weak, locked, view, back, cell, string));
    });

    assert_eq!(counts.allocs, 0);
    assert_eq!(counts.deallocs, 0);
    assert!(shared.unique());
}

#[test]
fn empty_pointers_do_not_allocate() {
    let ((), counts) = counted(|| {
        let empty = SharedPointer::<u8>::empty();
        let weak = WeakPointer::new(&empty);
        assert!(weak.lock().is_null());
        assert_eq!(weak.use_count(), 0);
    });

    assert_eq!(counts.allocs, 0);
}

#[test]
fn try_new_hands_value_back() {
    let drops = Arc::new(AtomicUsize::new(0));
    let value = (Test(drops.clone()), String::from("kept"));

    fail_next_allocation();
    let (result, counts) = counted(move || SharedPointer::try_new(value));
    assert_eq!(counts.allocs, 0);
    assert_eq!(counts.deallocs, 0);

    let error = match result {
        Ok(_) => panic!("allocation was expected to fail"),
        Err(error) => error,
    };
    assert_eq!(drops.load(Ordering::Relaxed), 0);

    // The block is three words of header followed by the value.
    let (expected, _) = Layout::new::<[usize; 3]>()
        .extend(Layout::new::<(Test, String)>())
        .unwrap();
    assert_eq!(error.layout(), expected.pad_to_align());
    assert!(error
        .to_string()
        .starts_with("failed to allocate control block"));

    let (guard, string) = error.into_inner();
    assert_eq!(string, "kept");
    assert_eq!(drops.load(Ordering::Relaxed), 0);

    let shared = SharedPointer::try_new((guard, string)).unwrap();
    assert_eq!(shared.1, "kept");
    drop(shared);
    assert_eq!(drops.load(Ordering::Relaxed), 1);
}
