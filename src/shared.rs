//! Atomically reference-counted shared-ownership handle.
//!
//! Every [`Shared`] that refers to the same value points at one heap
//! control block holding the live-handle count. The value is owned by the
//! control block and destroyed, together with the block, by whichever handle
//! takes the count from 1 to 0.
//!
//! There is no weak handle: a cycle of `Shared` values is never freed.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};

use crate::sync::{AtomicUsize, Ordering};

/// Counts above this abort the process instead of wrapping.
const MAX_REFCOUNT: usize = isize::MAX as usize;

struct ControlBlock<T> {
    count: AtomicUsize,
    value: NonNull<T>,
}

impl<T> Drop for ControlBlock<T> {
    fn drop(&mut self) {
        // SAFETY: `value` came from `Box::into_raw` and the block is the only
        // owner; it is dropped exactly once, with the block.
        drop(unsafe { Box::from_raw(self.value.as_ptr()) });
    }
}

/// A shared-ownership handle to a heap value, or an empty handle.
///
/// Cloning shares the value and bumps the count; dropping, [`reset`] and
/// reassignment release one reference. Equality is identity: two handles are
/// equal when they point at the same allocation.
///
/// [`reset`]: Shared::reset
pub struct Shared<T> {
    /// `None` when empty.
    ptr: Option<NonNull<T>>,
    block: Option<NonNull<ControlBlock<T>>>,
    _owns: PhantomData<T>,
}

// SAFETY: like `Arc`, handing a `Shared` to another thread shares `&T` and may
// move the final drop there, so both bounds are needed.
unsafe impl<T: Send + Sync> Send for Shared<T> {}
// SAFETY: `&Shared<T>` only allows `&T` access and cloning, see above.
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Allocates `value` and a control block; the handle starts with count 1.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// A handle that owns nothing.
    pub const fn empty() -> Self {
        Shared {
            ptr: None,
            block: None,
            _owns: PhantomData,
        }
    }

    /// Takes ownership of an existing allocation.
    pub fn from_box(value: Box<T>) -> Self {
        let value = NonNull::from(Box::leak(value));
        let block = Box::new(ControlBlock {
            count: AtomicUsize::new(1),
            value,
        });
        Shared {
            ptr: Some(value),
            block: Some(NonNull::from(Box::leak(block))),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn control(&self) -> Option<&ControlBlock<T>> {
        // SAFETY: while this handle holds its reference the block stays alive.
        self.block.map(|block| unsafe { &*block.as_ptr() })
    }

    /// Raw pointer to the value, null for an empty handle.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |value| value.as_ptr().cast_const())
    }

    /// Borrows the value, `None` for an empty handle.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a present `ptr` is owned by a block we hold a count on.
        self.ptr.map(|value| unsafe { value.as_ref() })
    }

    /// Borrows the value without checking for emptiness.
    ///
    /// # Safety
    ///
    /// The handle must not be empty.
    #[inline]
    pub unsafe fn get_unchecked(&self) -> &T {
        // SAFETY: the caller guarantees `ptr` is present.
        unsafe { self.ptr.unwrap_unchecked().as_ref() }
    }

    /// `true` when the handle owns nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Number of live handles sharing this value; 0 for an empty handle.
    ///
    /// Other threads may clone or drop concurrently, so this is a snapshot.
    pub fn use_count(&self) -> usize {
        self.control()
            .map_or(0, |block| block.count.load(Ordering::Acquire))
    }

    /// `true` when this is the only handle to its value.
    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }

    /// `true` when both handles point at the same value (or both are empty).
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Releases this handle's reference and leaves it empty.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Releases this handle's reference and starts owning `value` alone.
    ///
    /// Other handles to the previous value keep it alive and are unaffected.
    pub fn reset_to(&mut self, value: T) {
        *self = Shared::new(value);
    }

    /// Like [`reset_to`](Self::reset_to), adopting an existing allocation.
    pub fn reset_with(&mut self, value: Box<T>) {
        *self = Shared::from_box(value);
    }

    /// Moves the reference out, leaving this handle empty. No atomic op.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Shared::empty())
    }

    /// Exchanges the values two handles point at. Counts are unchanged.
    pub fn swap(&mut self, other: &mut Shared<T>) {
        mem::swap(self, other);
    }

    fn release(&mut self) {
        self.ptr = None;
        let Some(block) = self.block.take() else {
            return;
        };
        // SAFETY: our reference kept the block alive up to this decrement.
        let prior = unsafe { block.as_ref() }
            .count
            .fetch_sub(1, Ordering::AcqRel);
        if prior != 1 {
            return;
        }
        // SAFETY: we took the count to zero, so no other handle exists and
        // none can be created; AcqRel made every other handle's writes
        // visible before this point.
        drop(unsafe { Box::from_raw(block.as_ptr()) });
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(block) = self.control() {
            // Relaxed: a new reference can only come from an existing one,
            // which already keeps the block alive.
            let prior = block.count.fetch_add(1, Ordering::Relaxed);
            if prior > MAX_REFCOUNT {
                tracing::error!(count = prior, "shared handle count overflow");
                std::process::abort();
            }
        }
        Shared {
            ptr: self.ptr,
            block: self.block,
            _owns: PhantomData,
        }
    }

    /// Assigning a handle that already shares our value is a no-op, so the
    /// count never passes through zero.
    fn clone_from(&mut self, source: &Self) {
        if self.block == source.block {
            return;
        }
        *self = source.clone();
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Shared::empty()
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics on an empty handle.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared handle"),
        }
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Shared::new(value)
    }
}

impl<T> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Shared::from_box(value)
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(self, other)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("Shared")
                .field("value", value)
                .field("use_count", &self.use_count())
                .finish(),
            None => f.write_str("Shared(Empty)"),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::atomic::Ordering as StdOrdering;

    #[derive(Debug)]
    struct Tracked<'a>(&'a StdAtomicUsize);

    impl Drop for Tracked<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, StdOrdering::Relaxed);
        }
    }

    #[test]
    fn empty_handle() {
        let s: Shared<u32> = Shared::empty();
        assert!(s.is_empty());
        assert!(s.as_ptr().is_null());
        assert_eq!(s.get(), None);
        assert_eq!(s.use_count(), 0);
        assert_eq!(s, Shared::default());
    }

    #[test]
    fn clone_counts() {
        let a = Shared::new(5);
        let b = a.clone();
        let c = b.clone();
        assert_eq!(a.use_count(), 3);
        assert_eq!(c.use_count(), 3);
        drop(b);
        assert_eq!(a.use_count(), 2);
        assert_eq!(*c, 5);
    }

    #[test]
    fn drops_value_once() {
        let drops = StdAtomicUsize::new(0);
        let a = Shared::new(Tracked(&drops));
        let b = a.clone();
        drop(a);
        assert_eq!(drops.load(StdOrdering::Relaxed), 0);
        drop(b);
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
    }

    #[test]
    fn clone_from_same_block_is_noop() {
        let drops = StdAtomicUsize::new(0);
        let mut a = Shared::new(Tracked(&drops));
        let b = a.clone();
        a.clone_from(&b);
        assert_eq!(a.use_count(), 2);
        assert_eq!(drops.load(StdOrdering::Relaxed), 0);
    }

    #[test]
    fn clone_from_other_releases_old() {
        let drops = StdAtomicUsize::new(0);
        let mut a = Shared::new(Tracked(&drops));
        let b = Shared::new(Tracked(&drops));
        a.clone_from(&b);
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
        assert_eq!(a, b);
        assert_eq!(b.use_count(), 2);
    }

    #[test]
    fn identity_equality_and_hash() {
        let a = Shared::new(1);
        let b = Shared::new(1);
        assert_ne!(a, b);
        let set: HashSet<_> = [a.clone(), a.clone(), b.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    #[should_panic(expected = "dereferenced an empty Shared handle")]
    fn deref_empty_panics() {
        let s: Shared<i32> = Shared::empty();
        let _value: i32 = *s;
    }

    #[test]
    fn covariant_in_value_type() {
        fn shorten<'a>(s: Shared<&'static str>) -> Shared<&'a str> {
            s
        }
        let local = String::from("local");
        let mut handle = shorten(Shared::new("static"));
        assert_eq!(*handle, "static");
        handle.reset_to(local.as_str());
        assert_eq!(*handle, "local");
    }

    #[test]
    fn debug_output() {
        let s = Shared::new(7);
        assert_eq!(format!("{s:?}"), "Shared { value: 7, use_count: 1 }");
        assert_eq!(format!("{:?}", Shared::<i32>::empty()), "Shared(Empty)");
    }
}
