//! Unbounded lock-free MPMC FIFO queue built on tagged-pointer CAS.
//!
//! The queue is a Michael-Scott style linked list whose `head`/`tail`
//! coordination words are (pointer, tag) pairs packed into a single
//! 128-bit atomic. Every successful update bumps the tag, so a
//! compare-exchange can never be fooled by a node address that was
//! freed and recycled in the meantime (the ABA hazard).
//!
//! ## Features
//!
//! - `TaggedQueue`: Unbounded MPMC queue (intrusive node based).
//! - `TaggedAtomic` / `TaggedPtr`: The double-word CAS pair it runs on.
//! - Injectable node allocator pair for pooling and recycling.
//!
//! ## Usage
//!
//! ```rust
//! use tagged_queue::TaggedQueue;
//!
//! let q = TaggedQueue::new();
//! q.push(1);
//! q.push(2);
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.pop(), Some(2));
//! assert_eq!(q.pop(), None);
//! ```
//!
//! ## Reclamation contract
//!
//! A retired node is handed to the deallocator exactly once, at the
//! instant the unlinking CAS succeeds, with no quarantine. Concurrent
//! callers that lost the race may still be holding the old pointer and
//! will read through it before their consistency check fails. The
//! default heap allocator therefore carries a use-after-free window
//! under contention; deployments that care should inject a pool that
//! keeps returned blocks mapped and node-shaped (the tag defeats ABA
//! on recycled addresses). Hazard pointers and epochs are out of scope
//! on purpose — see [`TaggedQueue`] for the full contract.

pub mod queue;
pub mod tagged;
pub mod utils;

pub use queue::{Node, TaggedQueue};
pub use tagged::{TaggedAtomic, TaggedPtr};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
