//! Thread-safe reference-counted pointers with pluggable control blocks.
//!
//! A [`SharedPointer`] owns one strong reference to a control block, which
//! holds the strong and weak counts and knows how to destroy the managed
//! value. A [`WeakPointer`] observes the same block without keeping the value
//! alive, and can be promoted back to a `SharedPointer` for as long as the
//! value exists.
//!
//! Control blocks come in two layouts:
//!
//! - [`SharedPointer::new`] and [`make_shared`] store the value inside the
//!   control block, using a single allocation for both.
//! - [`SharedPointer::from_box`], [`SharedPointer::from_raw`] and
//!   [`SharedPointer::from_raw_with_deleter`] adopt a value allocated
//!   elsewhere and release it with a [`Deleter`].
//!
//! The value is dropped exactly once, when the last `SharedPointer` goes
//! away, and the control block is freed exactly once, when the last
//! `WeakPointer` goes away as well. Reference cycles made of
//! `SharedPointer`s are never collected.
//!
//! # Examples
//! ```
//! use sharedrop::{make_shared, WeakPointer};
//!
//! let a = make_shared(42);
//! let b = a.clone();
//! assert_eq!(a.use_count(), 2);
//!
//! let w = WeakPointer::new(&a);
//! drop(a);
//! drop(b);
//!
//! assert!(w.expired());
//! assert!(w.lock().is_null());
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod block;
mod cast;
mod error;
mod handle;
mod in_place;
mod owning;
mod shared;
mod weak;

pub use block::BlockKind;
pub use cast::{const_cast_pointer, dynamic_cast_pointer, static_cast_pointer, Downcast};
pub use error::AllocError;
pub use owning::{DefaultDelete, Deleter};
pub use shared::{make_shared, SharedPointer};
pub use weak::WeakPointer;
