use crate::block::{BlockHeader, BlockKind, BlockVtable};

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

extern crate alloc;

/// A control block that stores its value inline, so the counters and the
/// value share one allocation.
///
/// Disposing drops the value but leaves the memory in place; the whole
/// allocation is returned in one piece by `destroy`, once the last weak
/// reference (including the bias held by the strong references) is gone.
#[repr(C)]
pub(crate) struct InPlaceBlock<T> {
    header: BlockHeader,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe fn dispose<T>(block: NonNull<BlockHeader>) {
    ptr::drop_in_place(value::<T>(block) as *mut T);
}

unsafe fn destroy<T>(block: NonNull<BlockHeader>) {
    alloc::alloc::dealloc(block.as_ptr() as *mut u8, Layout::new::<InPlaceBlock<T>>());
}

unsafe fn value<T>(block: NonNull<BlockHeader>) -> *mut () {
    let block = block.cast::<InPlaceBlock<T>>().as_ptr();
    UnsafeCell::raw_get(ptr::addr_of!((*block).value)) as *mut ()
}

impl<T> InPlaceBlock<T> {
    const VTABLE: BlockVtable = BlockVtable {
        kind: BlockKind::InPlace,
        dispose: dispose::<T>,
        destroy: destroy::<T>,
        value: value::<T>,
    };

    /// Allocates a block and moves `data` into it. The returned block holds
    /// one strong reference. On allocation failure `data` is handed back
    /// together with the layout that could not be satisfied.
    pub(crate) fn try_alloc(data: T) -> Result<NonNull<BlockHeader>, (T, Layout)> {
        let layout = Layout::new::<InPlaceBlock<T>>();

        let block = unsafe { alloc::alloc::alloc(layout) } as *mut InPlaceBlock<T>;
        let block = match NonNull::new(block) {
            Some(block) => block,
            None => return Err((data, layout)),
        };

        unsafe {
            let raw = block.as_ptr();
            ptr::addr_of_mut!((*raw).header).write(BlockHeader::new(&Self::VTABLE));
            UnsafeCell::raw_get(ptr::addr_of!((*raw).value)).write(MaybeUninit::new(data));
        }

        log::trace!("allocated {:?} control block at {:p}", BlockKind::InPlace, block);

        Ok(block.cast())
    }

    /// Like [`try_alloc`], but diverts to the global allocation error handler
    /// on failure.
    ///
    /// [`try_alloc`]: InPlaceBlock::try_alloc
    pub(crate) fn alloc(data: T) -> NonNull<BlockHeader> {
        match Self::try_alloc(data) {
            Ok(block) => block,
            Err((_, layout)) => alloc::alloc::handle_alloc_error(layout),
        }
    }
}
