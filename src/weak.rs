use crate::handle::{StrongHandle, WeakHandle};
use crate::shared::SharedPointer;

use core::fmt;
use core::ptr::NonNull;

/// A non-owning observer of a value managed by [`SharedPointer`]s.
///
/// A `WeakPointer` keeps the control block alive but not the value. To access
/// the value it must first be promoted with [`lock`], which fails once the
/// last `SharedPointer` has been dropped.
///
/// # Examples
/// ```
/// use sharedrop::{SharedPointer, WeakPointer};
///
/// let mut a = SharedPointer::new(7);
/// let w = WeakPointer::new(&a);
/// assert_eq!(*w.lock(), 7);
///
/// a.reset();
/// assert!(w.expired());
/// assert!(w.lock().is_null());
/// ```
///
/// [`lock`]: WeakPointer::lock
pub struct WeakPointer<T: ?Sized> {
    handle: WeakHandle,
    ptr: Option<NonNull<T>>,
    writable: bool,
}

unsafe impl<T: ?Sized + Send + Sync> Send for WeakPointer<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for WeakPointer<T> {}

impl<T: ?Sized> WeakPointer<T> {
    /// Creates a `WeakPointer` observing the value of `shared`.
    pub fn new(shared: &SharedPointer<T>) -> WeakPointer<T> {
        WeakPointer {
            handle: WeakHandle::new(&shared.handle),
            ptr: shared.ptr,
            writable: shared.writable,
        }
    }

    /// Constructs a `WeakPointer` that observes nothing. It is always expired.
    pub const fn empty() -> WeakPointer<T> {
        WeakPointer {
            handle: WeakHandle::empty(),
            ptr: None,
            writable: false,
        }
    }

    /// Attempts to obtain a [`SharedPointer`] to the value. Returns an empty
    /// `SharedPointer` if the value has already been dropped.
    pub fn lock(&self) -> SharedPointer<T> {
        let handle = StrongHandle::upgrade(&self.handle);
        if handle.is_empty() {
            return SharedPointer::empty();
        }

        SharedPointer::from_parts(handle, self.ptr, self.writable)
    }

    /// Returns true if the value has been dropped, or if this pointer never
    /// observed one.
    ///
    /// The result is only a snapshot: another thread may drop the last
    /// [`SharedPointer`] right after this returns false.
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// The number of [`SharedPointer`]s currently sharing the observed value.
    pub fn use_count(&self) -> usize {
        self.handle.use_count()
    }

    /// Releases this pointer's weak reference, leaving it empty.
    pub fn reset(&mut self) {
        *self = WeakPointer::empty();
    }

    /// Exchanges the contents of two pointers without touching the counts.
    pub fn swap(&mut self, other: &mut WeakPointer<T>) {
        core::mem::swap(self, other);
    }

    /// Returns true if this pointer has never observed a value or was reset.
    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }
}

impl<T: ?Sized> Clone for WeakPointer<T> {
    fn clone(&self) -> Self {
        WeakPointer {
            handle: self.handle.clone(),
            ptr: self.ptr,
            writable: self.writable,
        }
    }
}

impl<T: ?Sized> Default for WeakPointer<T> {
    fn default() -> Self {
        WeakPointer::empty()
    }
}

impl<T: ?Sized> From<&SharedPointer<T>> for WeakPointer<T> {
    fn from(shared: &SharedPointer<T>) -> Self {
        WeakPointer::new(shared)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for WeakPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("WeakPointer");
        let strong = self.lock();
        if let Some(value) = strong.get() {
            f.field(&value);
        }
        f.finish()
    }
}
