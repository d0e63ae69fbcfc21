use crate::block::{BlockHeader, BlockKind};

use core::ptr::NonNull;

/// Owns one strong reference to a control block, or nothing.
pub(crate) struct StrongHandle {
    block: Option<NonNull<BlockHeader>>,
}

// The counters are atomic; whether the managed value may cross threads is
// decided by the typed pointers built on top of the handle.
unsafe impl Send for StrongHandle {}
unsafe impl Sync for StrongHandle {}

impl StrongHandle {
    pub(crate) const fn empty() -> StrongHandle {
        StrongHandle { block: None }
    }

    /// Takes over the strong reference a freshly allocated block starts with.
    pub(crate) unsafe fn adopt(block: NonNull<BlockHeader>) -> StrongHandle {
        StrongHandle { block: Some(block) }
    }

    /// Promotes a weak reference. The result is empty if the value has
    /// already been disposed.
    pub(crate) fn upgrade(weak: &WeakHandle) -> StrongHandle {
        match weak.block {
            Some(block) if unsafe { BlockHeader::try_promote(block) } => {
                StrongHandle { block: Some(block) }
            }
            _ => StrongHandle::empty(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    pub(crate) fn use_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { BlockHeader::strong_count(block) },
            None => 0,
        }
    }

    /// Number of weak references, not counting the one held on behalf of the
    /// strong references.
    pub(crate) fn weak_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { BlockHeader::weak_count(block) - 1 },
            None => 0,
        }
    }

    pub(crate) fn unique(&self) -> bool {
        self.use_count() == 1
    }

    /// True if no other strong or weak reference to the block exists, checked
    /// as one step so a weak reference cannot slip in a promotion.
    pub(crate) fn is_exclusive(&mut self) -> bool {
        match self.block {
            Some(block) => unsafe { BlockHeader::is_exclusive(block) },
            None => false,
        }
    }

    pub(crate) fn kind(&self) -> Option<BlockKind> {
        self.block.map(|block| unsafe { BlockHeader::kind(block) })
    }

    /// Type-erased pointer to the managed value as recorded by the block.
    pub(crate) fn value(&self) -> *mut () {
        match self.block {
            Some(block) => unsafe { BlockHeader::value(block) },
            None => core::ptr::null_mut(),
        }
    }

    pub(crate) fn same_block(&self, other: &StrongHandle) -> bool {
        self.block == other.block
    }
}

impl Clone for StrongHandle {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { BlockHeader::add_strong(block) };
        }

        StrongHandle { block: self.block }
    }
}

impl Drop for StrongHandle {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { BlockHeader::release_strong(block) };
        }
    }
}

/// Owns one weak reference to a control block, or nothing.
pub(crate) struct WeakHandle {
    block: Option<NonNull<BlockHeader>>,
}

unsafe impl Send for WeakHandle {}
unsafe impl Sync for WeakHandle {}

impl WeakHandle {
    pub(crate) const fn empty() -> WeakHandle {
        WeakHandle { block: None }
    }

    pub(crate) fn new(strong: &StrongHandle) -> WeakHandle {
        if let Some(block) = strong.block {
            unsafe { BlockHeader::add_weak(block) };
        }

        WeakHandle { block: strong.block }
    }

    /// Snapshot of the strong count. Zero once the value has been disposed.
    pub(crate) fn use_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { BlockHeader::strong_count(block) },
            None => 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.block.is_none()
    }
}

impl Clone for WeakHandle {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { BlockHeader::add_weak(block) };
        }

        WeakHandle { block: self.block }
    }
}

impl Drop for WeakHandle {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { BlockHeader::release_weak(block) };
        }
    }
}
