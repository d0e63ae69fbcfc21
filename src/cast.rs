//! Conversions between `SharedPointer` views of the same value.
//!
//! Each cast shares the source's control block and never allocates.

use crate::shared::SharedPointer;

use core::any::Any;
use core::cell::UnsafeCell;
use core::ptr::NonNull;

mod sealed {
    use core::any::Any;

    pub trait Sealed {}

    impl Sealed for dyn Any {}
    impl Sealed for dyn Any + Send {}
    impl Sealed for dyn Any + Send + Sync {}
}

/// Trait objects that can be checked for a concrete type at runtime.
///
/// This trait is sealed: it is implemented for `dyn Any`, `dyn Any + Send`
/// and `dyn Any + Send + Sync` only.
pub trait Downcast: sealed::Sealed {
    fn downcast_ref<T: Any>(&self) -> Option<&T>;
}

impl Downcast for dyn Any {
    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        <dyn Any>::downcast_ref(self)
    }
}

impl Downcast for dyn Any + Send {
    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        <dyn Any + Send>::downcast_ref(self)
    }
}

impl Downcast for dyn Any + Send + Sync {
    fn downcast_ref<T: Any>(&self) -> Option<&T> {
        <dyn Any + Send + Sync>::downcast_ref(self)
    }
}

/// Converts a pointer to another view of the same value, typically an
/// unsizing coercion to a trait object.
///
/// # Examples
/// ```
/// use core::fmt::Display;
/// use sharedrop::{static_cast_pointer, SharedPointer};
///
/// let value = SharedPointer::new(3);
/// let display: SharedPointer<dyn Display + Send + Sync> =
///     static_cast_pointer(&value, |v| v as &(dyn Display + Send + Sync));
///
/// assert_eq!(display.to_string(), "3");
/// assert_eq!(value.use_count(), 2);
/// ```
pub fn static_cast_pointer<T, U, F>(pointer: &SharedPointer<T>, cast: F) -> SharedPointer<U>
where
    T: ?Sized + Send + Sync,
    U: ?Sized,
    F: FnOnce(&T) -> &U,
{
    SharedPointer::map(pointer, cast)
}

/// Converts a pointer to a trait object into a pointer to its concrete type.
/// Returns an empty pointer if the value is not a `T`.
///
/// # Examples
/// ```
/// use core::any::Any;
/// use sharedrop::{dynamic_cast_pointer, SharedPointer};
///
/// let any: SharedPointer<dyn Any> = SharedPointer::from_box(Box::new(5u8));
///
/// assert_eq!(*dynamic_cast_pointer::<u8, _>(&any), 5);
/// assert!(dynamic_cast_pointer::<u16, _>(&any).is_null());
/// ```
pub fn dynamic_cast_pointer<T, U>(pointer: &SharedPointer<U>) -> SharedPointer<T>
where
    T: Any,
    U: ?Sized + Downcast,
{
    let ptr = match pointer.ptr {
        Some(ptr) => ptr,
        None => return SharedPointer::empty(),
    };

    let found = match pointer.get().and_then(|value| value.downcast_ref::<T>()) {
        Some(found) => NonNull::from(found),
        None => return SharedPointer::empty(),
    };

    // `ptr` is kept over `found` for its write access, and only at the
    // address `downcast_ref` vouched for. The view is the whole value the
    // block manages, so no thread-safety is gained or lost.
    let view = ptr.cast::<T>();
    if view != found {
        return SharedPointer::empty();
    }

    SharedPointer::from_parts(pointer.handle.clone(), Some(view), pointer.writable)
}

/// Converts a pointer into a view that permits mutation through
/// [`UnsafeCell::get`]. The result is neither `Send` nor `Sync`.
///
/// Writing through the view while any other reference to the value is in use
/// is undefined behavior.
///
/// # Examples
/// ```
/// use sharedrop::{const_cast_pointer, SharedPointer};
///
/// let value = SharedPointer::new(1);
/// let cell = const_cast_pointer(&value);
/// unsafe { *(*cell).get() = 2 };
///
/// assert_eq!(*value, 2);
/// ```
pub fn const_cast_pointer<T>(pointer: &SharedPointer<T>) -> SharedPointer<UnsafeCell<T>> {
    match pointer.ptr {
        // `UnsafeCell<T>` has the same in-memory representation as `T`.
        Some(ptr) => SharedPointer::from_parts(
            pointer.handle.clone(),
            Some(ptr.cast::<UnsafeCell<T>>()),
            pointer.writable,
        ),
        None => SharedPointer::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;

    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct Test(Arc<AtomicUsize>);

    impl Drop for Test {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    trait Base {
        fn hello(&self) -> &'static str;
    }

    struct Derived {
        _guard: Test,
    }

    impl Base for Derived {
        fn hello(&self) -> &'static str {
            "Derived::hello"
        }
    }

    #[test]
    fn upcast_keeps_derived_alive() {
        let counter = Arc::new(AtomicUsize::new(0));

        let derived = SharedPointer::new(Derived {
            _guard: Test(counter.clone()),
        });
        let base: SharedPointer<dyn Base> = static_cast_pointer(&derived, |d| d as &dyn Base);
        assert_eq!(derived.use_count(), 2);

        drop(derived);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert_eq!(base.hello(), "Derived::hello");

        drop(base);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn downcast() {
        let any: SharedPointer<dyn Any + Send + Sync> =
            SharedPointer::from_box(Box::new(String::from("a")));

        let string = dynamic_cast_pointer::<String, _>(&any);
        assert_eq!(*string, "a");
        assert_eq!(any.use_count(), 2);

        let number = dynamic_cast_pointer::<u32, _>(&any);
        assert!(number.is_null());
        assert_eq!(number.use_count(), 0);
        assert_eq!(any.use_count(), 2);

        let empty = SharedPointer::<dyn Any>::empty();
        assert!(dynamic_cast_pointer::<String, _>(&empty).is_null());
    }

    #[test]
    fn downcast_round_trip() {
        let value = SharedPointer::new(9u64);
        let any = static_cast_pointer(&value, |v| v as &(dyn Any + Send + Sync));
        let back = dynamic_cast_pointer::<u64, _>(&any);

        assert!(SharedPointer::ptr_eq(&value, &back));
        assert_eq!(value.use_count(), 3);
    }

    #[test]
    fn downcast_points_where_downcast_ref_does() {
        let any: SharedPointer<dyn Any + Send + Sync> = SharedPointer::from_box(Box::new(11u16));
        let found = Downcast::downcast_ref::<u16>(&*any).unwrap() as *const u16;

        let view = dynamic_cast_pointer::<u16, _>(&any);
        assert_eq!(view.get().map(|v| v as *const u16), Some(found));
        assert_eq!(*view, 11);
    }

    #[test]
    fn downcast_of_sole_owner_is_writable() {
        let any: SharedPointer<dyn Any + Send + Sync> = SharedPointer::from_box(Box::new(1u32));
        let mut number = dynamic_cast_pointer::<u32, _>(&any);
        assert!(number.get_mut().is_none());

        drop(any);
        *number.get_mut().unwrap() = 2;
        assert_eq!(*number, 2);
    }

    #[test]
    fn const_cast_writes_through() {
        let value = SharedPointer::new(1);
        let cell = const_cast_pointer(&value);
        assert_eq!(value.use_count(), 2);

        unsafe { *(*cell).get() += 41 };
        assert_eq!(*value, 42);

        drop(value);
        assert_eq!(unsafe { *(*cell).get() }, 42);
    }
}
