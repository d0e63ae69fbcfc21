use crate::block::{BlockHeader, BlockKind, BlockVtable};

use core::ptr::NonNull;

extern crate alloc;
use alloc::boxed::Box;

/// Releases a value that was allocated outside of its control block.
///
/// A deleter is handed the managed pointer exactly once, when the last
/// [`SharedPointer`] to it goes away. It is never called for a null pointer.
/// Any `FnOnce(NonNull<T>)` closure is a deleter.
///
/// # Examples
/// ```
/// use core::ptr::NonNull;
/// use sharedrop::SharedPointer;
///
/// let raw = Box::into_raw(Box::new(5));
/// let shared = unsafe {
///     SharedPointer::from_raw_with_deleter(raw, |ptr: NonNull<i32>| {
///         drop(unsafe { Box::from_raw(ptr.as_ptr()) });
///     })
/// };
/// assert_eq!(*shared, 5);
/// ```
///
/// [`SharedPointer`]: crate::SharedPointer
pub trait Deleter<T: ?Sized> {
    /// The [`BlockKind`] reported for blocks using this deleter.
    const KIND: BlockKind = BlockKind::OwningWithDeleter;

    /// Releases the value behind `ptr`.
    fn delete(self, ptr: NonNull<T>);
}

impl<T: ?Sized, F: FnOnce(NonNull<T>)> Deleter<T> for F {
    fn delete(self, ptr: NonNull<T>) {
        self(ptr)
    }
}

/// The deleter for pointers obtained from [`Box::into_raw`].
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    const KIND: BlockKind = BlockKind::Owning;

    fn delete(self, ptr: NonNull<T>) {
        // Blocks using `DefaultDelete` are only built from boxed pointers.
        let _ = unsafe { Box::from_raw(ptr.as_ptr()) };
    }
}

/// A control block for a value that lives in its own allocation.
#[repr(C)]
pub(crate) struct OwningBlock<T: ?Sized, D> {
    header: BlockHeader,
    ptr: Option<NonNull<T>>,
    deleter: Option<D>,
}

unsafe fn dispose<T: ?Sized, D: Deleter<T>>(block: NonNull<BlockHeader>) {
    let block = block.cast::<OwningBlock<T, D>>().as_ptr();
    if let Some(ptr) = (*block).ptr {
        if let Some(deleter) = (*block).deleter.take() {
            deleter.delete(ptr);
        }
    }
}

unsafe fn destroy<T: ?Sized, D>(block: NonNull<BlockHeader>) {
    let _ = Box::from_raw(block.cast::<OwningBlock<T, D>>().as_ptr());
}

unsafe fn value<T: ?Sized, D>(block: NonNull<BlockHeader>) -> *mut () {
    let block = block.cast::<OwningBlock<T, D>>().as_ptr();
    match (*block).ptr {
        Some(ptr) => ptr.cast::<()>().as_ptr(),
        None => core::ptr::null_mut(),
    }
}

impl<T: ?Sized, D: Deleter<T>> OwningBlock<T, D> {
    const VTABLE: BlockVtable = BlockVtable {
        kind: D::KIND,
        dispose: dispose::<T, D>,
        destroy: destroy::<T, D>,
        value: value::<T, D>,
    };

    /// Allocates a block taking ownership of `ptr`, which may be null. The
    /// returned block holds one strong reference.
    pub(crate) fn alloc(ptr: Option<NonNull<T>>, deleter: D) -> NonNull<BlockHeader> {
        let block = Box::into_raw(Box::new(OwningBlock {
            header: BlockHeader::new(&Self::VTABLE),
            ptr,
            deleter: Some(deleter),
        }));

        log::trace!("allocated {:?} control block at {:p}", D::KIND, block);

        unsafe { NonNull::new_unchecked(block).cast() }
    }
}
