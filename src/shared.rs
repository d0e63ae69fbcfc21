use crate::block::BlockKind;
use crate::error::AllocError;
use crate::handle::StrongHandle;
use crate::in_place::InPlaceBlock;
use crate::owning::{DefaultDelete, Deleter, OwningBlock};
use crate::weak::WeakPointer;

use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

extern crate alloc;
use alloc::boxed::Box;

/// A thread-safe reference-counted pointer.
///
/// A `SharedPointer` is a strong reference to a control block plus a typed
/// pointer to the value it exposes. The value is dropped when the last
/// `SharedPointer` sharing the block goes away; the block itself is freed
/// once the last [`WeakPointer`] is gone as well.
///
/// The typed pointer usually points at the managed value, but it may also
/// point into it (see [`SharedPointer::map`]). Lifetime is always tracked by
/// the block, never by the typed pointer.
///
/// A `SharedPointer` can be empty (no block, [`use_count`] is 0) or null (no
/// typed pointer, [`is_null`] is true). Dereferencing a null `SharedPointer`
/// panics; use [`get`] to check first.
///
/// # Examples
/// ```
/// use sharedrop::SharedPointer;
///
/// let a = SharedPointer::new(42);
/// assert_eq!(a.use_count(), 1);
///
/// let mut b = a.clone();
/// assert_eq!(a.use_count(), 2);
/// assert_eq!(*b, 42);
///
/// b.reset();
/// assert_eq!(a.use_count(), 1);
/// ```
///
/// [`use_count`]: SharedPointer::use_count
/// [`is_null`]: SharedPointer::is_null
/// [`get`]: SharedPointer::get
pub struct SharedPointer<T: ?Sized> {
    pub(crate) handle: StrongHandle,
    pub(crate) ptr: Option<NonNull<T>>,
    /// Set when `ptr` came from the block or a raw pointer rather than from
    /// a shared reference, which is what `get_mut` needs to write through it.
    pub(crate) writable: bool,
    marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for SharedPointer<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for SharedPointer<T> {}

/// Allocates `value` together with its control block in a single
/// allocation. Same as [`SharedPointer::new`].
///
/// # Examples
/// ```
/// use sharedrop::{make_shared, BlockKind};
///
/// let pair = make_shared((1, 2));
/// assert_eq!(pair.0, 1);
/// assert_eq!(pair.block_kind(), Some(BlockKind::InPlace));
/// ```
pub fn make_shared<T: 'static>(value: T) -> SharedPointer<T> {
    SharedPointer::new(value)
}

impl<T: 'static> SharedPointer<T> {
    /// Allocates `value` together with its control block in a single
    /// allocation.
    pub fn new(value: T) -> SharedPointer<T> {
        unsafe { SharedPointer::from_in_place(InPlaceBlock::alloc(value)) }
    }

    /// Like [`new`], constructing the value with `constructor`.
    ///
    /// [`new`]: SharedPointer::new
    pub fn new_with<F: FnOnce() -> T>(constructor: F) -> SharedPointer<T> {
        SharedPointer::new(constructor())
    }

    /// Like [`new`], but returns the value inside an [`AllocError`] instead
    /// of aborting if the allocation fails.
    ///
    /// # Examples
    /// ```
    /// use sharedrop::SharedPointer;
    ///
    /// let shared = SharedPointer::try_new(String::from("a")).unwrap();
    /// assert_eq!(*shared, "a");
    /// ```
    ///
    /// [`new`]: SharedPointer::new
    pub fn try_new(value: T) -> Result<SharedPointer<T>, AllocError<T>> {
        match InPlaceBlock::try_alloc(value) {
            Ok(block) => Ok(unsafe { SharedPointer::from_in_place(block) }),
            Err((value, layout)) => Err(AllocError::new(value, layout)),
        }
    }

    unsafe fn from_in_place(block: NonNull<crate::block::BlockHeader>) -> SharedPointer<T> {
        let handle = StrongHandle::adopt(block);
        let ptr = NonNull::new(handle.value() as *mut T);

        SharedPointer {
            handle,
            ptr,
            writable: true,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static> SharedPointer<T> {
    /// Takes ownership of a boxed value. The box stays a separate allocation
    /// from the control block.
    ///
    /// # Examples
    /// ```
    /// use sharedrop::{BlockKind, SharedPointer};
    ///
    /// let slice: SharedPointer<[u32]> = SharedPointer::from_box(vec![1, 2, 3].into_boxed_slice());
    /// assert_eq!(slice.len(), 3);
    /// assert_eq!(slice.block_kind(), Some(BlockKind::Owning));
    /// ```
    pub fn from_box(value: Box<T>) -> SharedPointer<T> {
        unsafe { SharedPointer::from_raw(Box::into_raw(value)) }
    }

    /// Takes ownership of a raw pointer.
    ///
    /// A null pointer still gets a control block: the result has a use count
    /// of 1 but [`is_null`] returns true, and nothing is freed when it is
    /// dropped.
    ///
    /// # Safety
    /// `raw` must be null or come from [`Box::into_raw`], and must not be
    /// owned by anything else.
    ///
    /// [`is_null`]: SharedPointer::is_null
    pub unsafe fn from_raw(raw: *mut T) -> SharedPointer<T> {
        SharedPointer::from_raw_with_deleter(raw, DefaultDelete)
    }

    /// Takes ownership of a raw pointer that will be released by `deleter`.
    /// The deleter is not called if `raw` is null.
    ///
    /// # Safety
    /// `raw` must be null or valid for reads until `deleter` is called, and
    /// must not be released by anything else.
    pub unsafe fn from_raw_with_deleter<D>(raw: *mut T, deleter: D) -> SharedPointer<T>
    where
        D: Deleter<T> + Send + 'static,
    {
        let ptr = NonNull::new(raw);

        SharedPointer {
            handle: StrongHandle::adopt(OwningBlock::alloc(ptr, deleter)),
            ptr,
            writable: true,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> SharedPointer<T> {
    /// Constructs an empty `SharedPointer` that owns nothing.
    pub const fn empty() -> SharedPointer<T> {
        SharedPointer {
            handle: StrongHandle::empty(),
            ptr: None,
            writable: false,
            marker: PhantomData,
        }
    }

    /// Constructs a `SharedPointer` that shares ownership with `owner` but
    /// points at `ptr`.
    ///
    /// # Safety
    /// `ptr` must be null or stay valid for as long as the value managed by
    /// `owner` is alive. If `T` is `Send + Sync`, the value managed by
    /// `owner` must be safe to drop from another thread.
    ///
    /// [`get_mut`] writes through `ptr` once the result is the only reference
    /// to the block, so `ptr` must allow writes: it must not be derived from a
    /// shared reference.
    ///
    /// [`get_mut`]: SharedPointer::get_mut
    pub unsafe fn aliasing<U: ?Sized>(owner: &SharedPointer<U>, ptr: *const T) -> SharedPointer<T> {
        SharedPointer {
            handle: owner.handle.clone(),
            ptr: NonNull::new(ptr as *mut T),
            writable: true,
            marker: PhantomData,
        }
    }

    /// Constructs a `SharedPointer` to a part of the value, sharing ownership
    /// of the whole. Returns an empty pointer if `this` is null.
    ///
    /// # Examples
    /// ```
    /// use sharedrop::SharedPointer;
    ///
    /// let pair = SharedPointer::new((String::from("a"), 2));
    /// let first = SharedPointer::map(&pair, |pair| &pair.0);
    /// drop(pair);
    ///
    /// assert_eq!(*first, "a");
    /// assert_eq!(first.use_count(), 1);
    /// ```
    pub fn map<U, F>(this: &SharedPointer<T>, f: F) -> SharedPointer<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        match this.get() {
            Some(value) => SharedPointer {
                handle: this.handle.clone(),
                ptr: Some(NonNull::from(f(value))),
                writable: false,
                marker: PhantomData,
            },
            None => SharedPointer::empty(),
        }
    }

    /// Like [`map`], but returns an empty pointer if `f` returns `None`.
    ///
    /// [`map`]: SharedPointer::map
    pub fn filter_map<U, F>(this: &SharedPointer<T>, f: F) -> SharedPointer<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> Option<&U>,
    {
        match this.get().and_then(f) {
            Some(view) => SharedPointer {
                handle: this.handle.clone(),
                ptr: Some(NonNull::from(view)),
                writable: false,
                marker: PhantomData,
            },
            None => SharedPointer::empty(),
        }
    }

    /// Gets a reference to the value, or `None` if this pointer is null.
    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Gets a mutable reference to the value if this is the only
    /// `SharedPointer` to it and no [`WeakPointer`]s exist.
    ///
    /// Views made by [`map`] and [`filter_map`] borrow the value immutably
    /// and always return `None`.
    ///
    /// # Examples
    /// ```
    /// use sharedrop::SharedPointer;
    ///
    /// let mut a = SharedPointer::new(1);
    /// *a.get_mut().unwrap() += 1;
    ///
    /// let b = a.clone();
    /// assert!(a.get_mut().is_none());
    /// drop(b);
    ///
    /// let w = a.downgrade();
    /// assert!(a.get_mut().is_none());
    /// drop(w);
    ///
    /// assert_eq!(*a, 2);
    /// ```
    ///
    /// [`map`]: SharedPointer::map
    /// [`filter_map`]: SharedPointer::filter_map
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.writable && self.handle.is_exclusive() {
            self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
        } else {
            None
        }
    }

    /// Returns true if there is no value to dereference.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// The number of `SharedPointer`s sharing this pointer's control block,
    /// or 0 if it is empty.
    pub fn use_count(&self) -> usize {
        self.handle.use_count()
    }

    /// The number of [`WeakPointer`]s to this pointer's control block.
    pub fn weak_count(&self) -> usize {
        self.handle.weak_count()
    }

    /// Returns true if [`use_count`] is 1.
    ///
    /// [`use_count`]: SharedPointer::use_count
    pub fn unique(&self) -> bool {
        self.handle.unique()
    }

    /// The allocation strategy of the control block, or `None` if empty.
    pub fn block_kind(&self) -> Option<BlockKind> {
        self.handle.kind()
    }

    /// Releases this pointer's reference, leaving it empty.
    pub fn reset(&mut self) {
        *self = SharedPointer::empty();
    }

    /// Exchanges the contents of two pointers without touching the counts.
    pub fn swap(&mut self, other: &mut SharedPointer<T>) {
        core::mem::swap(self, other);
    }

    /// Creates a [`WeakPointer`] observing the same value.
    pub fn downgrade(&self) -> WeakPointer<T> {
        WeakPointer::new(self)
    }

    /// Returns true if both pointers share a control block and point at the
    /// same address.
    pub fn ptr_eq(this: &SharedPointer<T>, other: &SharedPointer<T>) -> bool {
        let this_ptr = this.ptr.map(|ptr| ptr.as_ptr() as *const u8);
        let other_ptr = other.ptr.map(|ptr| ptr.as_ptr() as *const u8);
        this.handle.same_block(&other.handle) && this_ptr == other_ptr
    }

    pub(crate) fn from_parts(
        handle: StrongHandle,
        ptr: Option<NonNull<T>>,
        writable: bool,
    ) -> SharedPointer<T> {
        SharedPointer {
            handle,
            ptr,
            writable,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for SharedPointer<T> {
    fn clone(&self) -> Self {
        SharedPointer {
            handle: self.handle.clone(),
            ptr: self.ptr,
            writable: self.writable,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Default for SharedPointer<T> {
    fn default() -> Self {
        SharedPointer::empty()
    }
}

impl<T: ?Sized> Deref for SharedPointer<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null SharedPointer"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SharedPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("SharedPointer(null)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for SharedPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(ptr) => fmt::Pointer::fmt(&ptr, f),
            None => fmt::Pointer::fmt(&core::ptr::null::<u8>(), f),
        }
    }
}

impl<T: 'static> From<T> for SharedPointer<T> {
    fn from(value: T) -> Self {
        SharedPointer::new(value)
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for SharedPointer<T> {
    fn from(value: Box<T>) -> Self {
        SharedPointer::from_box(value)
    }
}

impl<T: ?Sized> From<&WeakPointer<T>> for SharedPointer<T> {
    fn from(weak: &WeakPointer<T>) -> Self {
        weak.lock()
    }
}

#[cfg(feature = "stable_deref_trait")]
unsafe impl<T: ?Sized> stable_deref_trait::StableDeref for SharedPointer<T> {}

#[cfg(feature = "stable_deref_trait")]
unsafe impl<T: ?Sized> stable_deref_trait::CloneStableDeref for SharedPointer<T> {}
