//! Unbounded lock-free MPMC FIFO queue over tagged-pointer CAS.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

use crate::tagged::{TaggedAtomic, TaggedPtr};
use crate::utils::CacheAligned;

/// An intrusive queue node: a value slot plus a tagged link to the
/// successor.
///
/// Custom allocators produce and consume `*mut Node<T>`. The queue
/// writes the slot and the link itself; an allocator only has to hand
/// back memory holding a valid `Node` (a recycled node with stale
/// contents is fine, the queue resets what it needs on reuse).
pub struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: TaggedAtomic<Node<T>>,
}

impl<T> Node<T> {
    /// Creates a vacant node with a null, zero-tag successor link.
    pub fn empty() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: TaggedAtomic::null(0),
        }
    }
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// Michael-Scott linked list: `head` points at a sentinel whose
/// successors are the queued values in order; `tail` points at the
/// last node, or lags it by at most one link while an enqueue is
/// mid-publish. Both words are (pointer, tag) pairs updated with a
/// single 128-bit CAS, so a recycled node address can never satisfy a
/// stale comparison.
///
/// Progress is lock-free, not wait-free: a retry loop can in theory be
/// starved by contending peers, but some operation always completes.
///
/// # Reclamation
///
/// `pop` hands the retired sentinel to the deallocator exactly once,
/// immediately after its unlinking CAS succeeds. There is no hazard
/// pointer or epoch quarantine: a concurrent loser of the race may
/// still read through the old pointer before its consistency check
/// fails. With the default heap allocator that read is a
/// use-after-free window. Callers who need the stronger guarantee
/// inject a pool via [`TaggedQueue::with_allocator`] that keeps
/// returned blocks mapped and node-shaped; the tags make recycling
/// safe against ABA.
///
/// # Teardown
///
/// Dropping the queue frees only the resident sentinel. Values still
/// queued are neither dropped nor freed — drain with [`TaggedQueue::pop`]
/// first if cleanup matters.
pub struct TaggedQueue<T> {
    head: CacheAligned<TaggedAtomic<Node<T>>>,
    tail: CacheAligned<TaggedAtomic<Node<T>>>,
    alloc: Box<dyn Fn() -> *mut Node<T> + Send + Sync>,
    free: Box<dyn Fn(*mut Node<T>) + Send + Sync>,
}

unsafe impl<T: Send> Send for TaggedQueue<T> {}
unsafe impl<T: Send> Sync for TaggedQueue<T> {}

impl<T> Default for TaggedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaggedQueue<T> {
    /// Creates a new unbounded queue backed by the heap.
    pub fn new() -> TaggedQueue<T> {
        Self::with_allocator(
            || Box::into_raw(Box::new(Node::empty())),
            // Dropping the box never drops a value: the slot is
            // `MaybeUninit` and retired sentinels are always vacant.
            |node| unsafe { drop(Box::from_raw(node)) },
        )
    }

    /// Creates a new unbounded queue with an injected allocator pair.
    ///
    /// `alloc` and `free` may be called concurrently from any thread
    /// that touches the queue, hence the `Send + Sync` bounds. Each
    /// node obtained from `alloc` is handed back to `free` exactly
    /// once, at the instant the pop that retires it succeeds (plus the
    /// one resident sentinel at drop time).
    pub fn with_allocator<A, F>(alloc: A, free: F) -> TaggedQueue<T>
    where
        A: Fn() -> *mut Node<T> + Send + Sync + 'static,
        F: Fn(*mut Node<T>) + Send + Sync + 'static,
    {
        let sentinel = alloc();
        // A pooled node can come back with a stale successor link.
        unsafe { (*sentinel).next.clear_ptr() };

        TaggedQueue {
            head: CacheAligned::new(TaggedAtomic::new(TaggedPtr::new(sentinel, 0))),
            tail: CacheAligned::new(TaggedAtomic::new(TaggedPtr::new(sentinel, 0))),
            alloc: Box::new(alloc),
            free: Box::new(free),
        }
    }

    /// Pushes an element onto the back of the queue.
    ///
    /// Allocates one node. Never fails; allocator exhaustion
    /// propagates however the injected allocator fails.
    pub fn push(&self, value: T) {
        let node = (self.alloc)();
        unsafe {
            (*node).value.get().write(MaybeUninit::new(value));
            // Null the link but keep its tag: on a recycled node the
            // tag must keep rising across reuses of this location.
            (*node).next.clear_ptr();
        }

        let backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let tail_node = unsafe { &*tail.ptr() };
            let next = tail_node.next.load(Ordering::Acquire);

            // The snapshot must still be current, or `next` was read
            // off a node that has since been retired.
            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                // Tail really is last: announce the node on its link.
                let link = TaggedPtr::new(node, next.tag().wrapping_add(1));
                if tail_node
                    .next
                    .compare_exchange(next, link, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    // Linked; the value is now reachable from head.
                    // Publishing tail is best-effort: a helping peer
                    // may already have advanced it past us.
                    let _ = self.tail.compare_exchange(
                        tail,
                        TaggedPtr::new(node, tail.tag().wrapping_add(1)),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    );
                    return;
                }
            } else {
                // Tail lags behind a completed link; help it forward
                // before retrying.
                let _ = self.tail.compare_exchange(
                    tail,
                    TaggedPtr::new(next.ptr(), tail.tag().wrapping_add(1)),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                );
            }
            backoff.snooze();
        }
    }

    /// Pops the element at the front of the queue.
    ///
    /// Returns `None` when the queue was observed empty. Each
    /// successful pop retires exactly one node to the deallocator.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let head_node = unsafe { &*head.ptr() };
            let next = head_node.next.load(Ordering::Acquire);

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if head.ptr() == tail.ptr() {
                if next.is_null() {
                    return None;
                }
                // An enqueue linked its node but has not published
                // tail yet; help it forward before retrying.
                let _ = self.tail.compare_exchange(
                    tail,
                    TaggedPtr::new(next.ptr(), tail.tag().wrapping_add(1)),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                );
            } else {
                // Copy the value out BEFORE the unlink: once the CAS
                // succeeds the old sentinel goes to the deallocator
                // and must never be read again.
                let value = unsafe { (*next.ptr()).value.get().read() };
                if self
                    .head
                    .compare_exchange(
                        head,
                        TaggedPtr::new(next.ptr(), head.tag().wrapping_add(1)),
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // The old sentinel is exclusively ours now; its
                    // successor becomes the new sentinel, its slot
                    // already copied out above.
                    (self.free)(head.ptr());
                    return Some(unsafe { value.assume_init() });
                }
                // Lost the race: the copied bits are stale. They are
                // discarded as `MaybeUninit`, so nothing is dropped.
            }
            backoff.snooze();
        }
    }

    /// Best-effort emptiness hint.
    ///
    /// Compares the head and tail pairs loaded one after the other;
    /// mutators may run between the two loads, so the answer is not a
    /// linearizable fact and must not be used as one.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        head == tail
    }
}

impl<T> Drop for TaggedQueue<T> {
    fn drop(&mut self) {
        // Only the resident sentinel goes back to the allocator.
        // Anything still queued is the caller's to drain beforehand.
        let head = self.head.load(Ordering::Relaxed);
        if !head.is_null() {
            (self.free)(head.ptr());
        }
    }
}
