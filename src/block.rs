use core::hint::spin_loop;
use core::ptr::NonNull;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Value of the weak count while [`BlockHeader::is_exclusive`] runs.
const WEAK_LOCKED: usize = usize::MAX;

/// The allocation strategy behind a control block.
///
/// Every [`SharedPointer`] that owns something points at exactly one control
/// block, and the block's kind is fixed when it is created.
///
/// [`SharedPointer`]: crate::SharedPointer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// The value was allocated separately and is freed with [`DefaultDelete`].
    ///
    /// [`DefaultDelete`]: crate::DefaultDelete
    Owning,
    /// The value was allocated separately and is released by a user-supplied
    /// [`Deleter`].
    ///
    /// [`Deleter`]: crate::Deleter
    OwningWithDeleter,
    /// The value lives inside the control block's own allocation.
    InPlace,
}

/// Function table shared by every control block of one concrete type.
pub(crate) struct BlockVtable {
    pub(crate) kind: BlockKind,
    /// Destroys the managed value. Runs once, when the strong count hits zero.
    pub(crate) dispose: unsafe fn(NonNull<BlockHeader>),
    /// Frees the control block. Runs once, when the weak count hits zero.
    pub(crate) destroy: unsafe fn(NonNull<BlockHeader>),
    pub(crate) value: unsafe fn(NonNull<BlockHeader>) -> *mut (),
}

/// The common prefix of every control block.
///
/// Concrete blocks are `#[repr(C)]` structs whose first field is a
/// `BlockHeader`, so a pointer to the block can be used as a pointer to its
/// header.
///
/// `weak` starts at one and that unit is held collectively by all strong
/// references, so the block outlives the dispose that follows the last strong
/// release.
#[repr(C)]
pub(crate) struct BlockHeader {
    strong: AtomicUsize,
    weak: AtomicUsize,
    vtable: &'static BlockVtable,
}

impl BlockHeader {
    pub(crate) const fn new(vtable: &'static BlockVtable) -> BlockHeader {
        BlockHeader {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            vtable,
        }
    }

    /// Adds a strong reference. The caller must already hold one.
    pub(crate) unsafe fn add_strong(block: NonNull<BlockHeader>) {
        let old = (*block.as_ptr()).strong.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// Drops a strong reference, disposing the value and giving up the bias
    /// weak reference if it was the last one.
    pub(crate) unsafe fn release_strong(block: NonNull<BlockHeader>) {
        if (*block.as_ptr()).strong.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        fence(Ordering::Acquire);
        let vtable = (*block.as_ptr()).vtable;
        log::trace!("disposing {:?} control block at {:p}", vtable.kind, block);
        (vtable.dispose)(block);

        BlockHeader::release_weak(block);
    }

    /// Adds a weak reference. The caller must hold a strong or weak one.
    ///
    /// Waits while [`is_exclusive`] holds the weak count locked.
    ///
    /// [`is_exclusive`]: BlockHeader::is_exclusive
    pub(crate) unsafe fn add_weak(block: NonNull<BlockHeader>) {
        let weak = &(*block.as_ptr()).weak;

        let mut n = weak.load(Ordering::Relaxed);
        loop {
            if n == WEAK_LOCKED {
                spin_loop();
                n = weak.load(Ordering::Relaxed);
                continue;
            }
            if n > MAX_REFCOUNT {
                refcount_overflow();
            }

            match weak.compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return,
                Err(observed) => n = observed,
            }
        }
    }

    /// Returns true if the caller's strong reference is the only reference of
    /// either kind. The caller must hold a strong reference.
    ///
    /// The weak count is locked while the strong count is read, so no weak
    /// reference can be promoted and then dropped between the two loads.
    pub(crate) unsafe fn is_exclusive(block: NonNull<BlockHeader>) -> bool {
        let header = &*block.as_ptr();

        if header
            .weak
            .compare_exchange(1, WEAK_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        let unique = header.strong.load(Ordering::Relaxed) == 1;
        header.weak.store(1, Ordering::Release);
        if !unique {
            return false;
        }

        // Pairs with the release decrement of the strong reference that was
        // dropped last.
        fence(Ordering::Acquire);
        true
    }

    /// Drops a weak reference, freeing the block if it was the last one. The
    /// block must not be touched afterwards.
    pub(crate) unsafe fn release_weak(block: NonNull<BlockHeader>) {
        if (*block.as_ptr()).weak.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        fence(Ordering::Acquire);
        let vtable = (*block.as_ptr()).vtable;
        log::trace!("destroying {:?} control block at {:p}", vtable.kind, block);
        (vtable.destroy)(block);
    }

    /// Attempts to add a strong reference on behalf of a weak one. Fails once
    /// the strong count has reached zero, since the value is then gone for
    /// good.
    ///
    /// The count may be dropped to zero by another thread between the load
    /// and the increment, so the increment is a compare-exchange that is
    /// retried against the freshly observed value.
    pub(crate) unsafe fn try_promote(block: NonNull<BlockHeader>) -> bool {
        let strong = &(*block.as_ptr()).strong;

        let mut n = strong.load(Ordering::Relaxed);
        loop {
            if n == 0 {
                log::trace!("promotion failed, control block at {:p} is expired", block);
                return false;
            }
            if n > MAX_REFCOUNT {
                refcount_overflow();
            }

            match strong.compare_exchange_weak(n, n + 1, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(observed) => n = observed,
            }
        }
    }

    pub(crate) unsafe fn strong_count(block: NonNull<BlockHeader>) -> usize {
        (*block.as_ptr()).strong.load(Ordering::Acquire)
    }

    pub(crate) unsafe fn weak_count(block: NonNull<BlockHeader>) -> usize {
        match (*block.as_ptr()).weak.load(Ordering::Acquire) {
            // Only the bias unit is left while the count is locked.
            WEAK_LOCKED => 1,
            n => n,
        }
    }

    /// Type-erased pointer to the managed value, as stored by the block.
    pub(crate) unsafe fn value(block: NonNull<BlockHeader>) -> *mut () {
        ((*block.as_ptr()).vtable.value)(block)
    }

    pub(crate) unsafe fn kind(block: NonNull<BlockHeader>) -> BlockKind {
        (*block.as_ptr()).vtable.kind
    }
}

#[cold]
fn refcount_overflow() -> ! {
    log::error!("reference count overflow");

    #[cfg(feature = "std")]
    std::process::abort();

    #[cfg(not(feature = "std"))]
    panic!("reference count overflow");
}
