//! Tagged pointer pairs updated with double-word compare-and-swap.
//!
//! A `TaggedPtr` bundles a raw pointer with a monotonically increasing
//! tag; `TaggedAtomic` stores the pair packed in one `AtomicU128` so
//! that loads, stores and compare-exchanges always observe and replace
//! both halves as a unit. Comparing the halves through two separate
//! atomics would reintroduce the ABA hazard the tag exists to defeat.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering;

use portable_atomic::AtomicU128;

/// A raw pointer paired with a monotonically increasing tag.
///
/// Two tagged pointers compare equal only when pointer AND tag match.
/// A location that went A -> B -> A still fails the comparison because
/// its tag moved on with every update.
pub struct TaggedPtr<T> {
    ptr: *mut T,
    tag: u64,
}

impl<T> TaggedPtr<T> {
    /// Creates a tagged pointer from its parts.
    #[inline]
    pub fn new(ptr: *mut T, tag: u64) -> Self {
        Self { ptr, tag }
    }

    /// A null pointer carrying the given tag.
    #[inline]
    pub fn null(tag: u64) -> Self {
        Self::new(ptr::null_mut(), tag)
    }

    /// Returns the pointer half.
    #[inline]
    pub fn ptr(&self) -> *mut T {
        self.ptr
    }

    /// Returns the tag half.
    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns `true` if the pointer half is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Packs the pair into one 128-bit word: pointer low, tag high.
    #[inline]
    fn pack(self) -> u128 {
        (self.ptr as usize as u128) | ((self.tag as u128) << 64)
    }

    /// Unpacks a 128-bit word back into the pair.
    #[inline]
    fn unpack(raw: u128) -> Self {
        Self {
            ptr: raw as usize as *mut T,
            tag: (raw >> 64) as u64,
        }
    }
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.tag == other.tag
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> fmt::Debug for TaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedPtr({:p}, tag={})", self.ptr, self.tag)
    }
}

/// A tagged pointer held in a single 128-bit atomic.
///
/// On targets with a native double-word CAS (`cmpxchg16b`, `casp`) the
/// operations compile down to it; elsewhere `portable-atomic` falls
/// back to its global-lock shim, which keeps the pair-as-a-unit
/// semantics intact at the cost of lock freedom.
#[repr(align(16))]
pub struct TaggedAtomic<T> {
    data: AtomicU128,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for TaggedAtomic<T> {}
unsafe impl<T: Send + Sync> Sync for TaggedAtomic<T> {}

impl<T> TaggedAtomic<T> {
    /// Creates an atomic holding the given pair.
    #[inline]
    pub fn new(ptr: TaggedPtr<T>) -> Self {
        Self {
            data: AtomicU128::new(ptr.pack()),
            _marker: PhantomData,
        }
    }

    /// Creates an atomic holding a null pointer with the given tag.
    #[inline]
    pub fn null(tag: u64) -> Self {
        Self::new(TaggedPtr::null(tag))
    }

    /// Loads the pair.
    #[inline]
    pub fn load(&self, order: Ordering) -> TaggedPtr<T> {
        TaggedPtr::unpack(self.data.load(order))
    }

    /// Stores a pair, replacing both halves at once.
    #[inline]
    pub fn store(&self, ptr: TaggedPtr<T>, order: Ordering) {
        self.data.store(ptr.pack(), order);
    }

    /// Compares and exchanges the full pair.
    ///
    /// Succeeds only when both the pointer and the tag of `current`
    /// match the stored pair. Returns the previously stored pair
    /// either way.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        match self
            .data
            .compare_exchange(current.pack(), new.pack(), success, failure)
        {
            Ok(prev) => Ok(TaggedPtr::unpack(prev)),
            Err(prev) => Err(TaggedPtr::unpack(prev)),
        }
    }

    /// Compares and exchanges the full pair (weak version).
    ///
    /// May spuriously fail even when the comparison succeeds.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        match self
            .data
            .compare_exchange_weak(current.pack(), new.pack(), success, failure)
        {
            Ok(prev) => Ok(TaggedPtr::unpack(prev)),
            Err(prev) => Err(TaggedPtr::unpack(prev)),
        }
    }

    /// Nulls the pointer half while keeping the tag.
    ///
    /// Only valid on a location with no concurrent writers (a node the
    /// caller exclusively owns). Preserving the tag is what keeps the
    /// per-location monotonicity alive when a pooled node is recycled.
    #[inline]
    pub(crate) fn clear_ptr(&self) {
        let cur = self.load(Ordering::Relaxed);
        self.store(TaggedPtr::null(cur.tag()), Ordering::Relaxed);
    }
}

impl<T> fmt::Debug for TaggedAtomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedAtomic({:?})", self.load(Ordering::Relaxed))
    }
}
