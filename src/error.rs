//! Allocation errors.

use core::alloc::Layout;
use core::fmt;

/// Returned by [`SharedPointer::try_new`] when the control block could not be
/// allocated. Carries the value that was to be stored.
///
/// [`SharedPointer::try_new`]: crate::SharedPointer::try_new
pub struct AllocError<T> {
    value: T,
    layout: Layout,
}

impl<T> AllocError<T> {
    pub(crate) fn new(value: T, layout: Layout) -> AllocError<T> {
        AllocError { value, layout }
    }

    /// The layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Gives back the value that could not be stored.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocError")
            .field("layout", &self.layout)
            .finish()
    }
}

impl<T> fmt::Display for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to allocate control block: {} bytes, alignment {}",
            self.layout.size(),
            self.layout.align()
        )
    }
}

#[cfg(feature = "std")]
impl<T> std::error::Error for AllocError<T> {}
