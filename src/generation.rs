//! Generation-based publication of immutable snapshots.
//!
//! A [`GenerationHandler`] publishes one immutable state per generation.
//! Readers call [`GenerationHandler::take_guard`] and receive a
//! [`GenerationGuard`] that pins the state current at that moment; the state
//! stays alive and unchanged until the last guard on it is dropped, however
//! many generations are published in the meantime.
//!
//! ```text
//!            publish(s1)          publish(s2)
//! gen 0 (s0) ───────────> gen 1 ───────────> gen 2 (current)
//!   ▲                       ▲
//!   guard A                 guard B, guard C
//! ```
//!
//! Above, `s0` and `s1` are retired but still reachable through their guards;
//! the oldest used generation is 0. Once A is dropped it becomes 1.
//!
//! The current-hold pointer is swapped under `crossbeam-epoch` protection, so
//! `take_guard` never blocks on a publisher; a reader pins the epoch only for
//! the few instructions needed to clone the hold's `Arc`.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use parking_lot::Mutex;

pub type Generation = u64;

struct GenerationHold<T> {
    generation: Generation,
    guards: AtomicUsize,
    state: T,
}

impl<T> GenerationHold<T> {
    fn new(generation: Generation, state: T) -> Self {
        Self {
            generation,
            guards: AtomicUsize::new(0),
            state,
        }
    }
}

/// Publishes immutable states and hands out guards pinning them.
pub struct GenerationHandler<T> {
    current: Atomic<Arc<GenerationHold<T>>>,
    generation: AtomicU64,
    /// Holds replaced by `publish`; also serializes publishers.
    retired: Mutex<VecDeque<Weak<GenerationHold<T>>>>,
}

impl<T> GenerationHandler<T> {
    /// Create a handler whose generation 0 is `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            current: Atomic::new(Arc::new(GenerationHold::new(0, initial))),
            generation: AtomicU64::new(0),
            retired: Mutex::new(VecDeque::new()),
        }
    }

    /// Pin the current generation.
    pub fn take_guard(&self) -> GenerationGuard<T> {
        let epoch_guard = epoch::pin();
        let current = self.current.load(Ordering::Acquire, &epoch_guard);
        // SAFETY: `current` is never null. A replaced pointer is destroyed only
        // through `defer_destroy`, which cannot run while this thread is pinned.
        let hold = unsafe { current.deref() };
        hold.guards.fetch_add(1, Ordering::AcqRel);
        GenerationGuard {
            hold: Arc::clone(hold),
        }
    }

    /// Make `state` the current state and return its generation.
    ///
    /// States pinned by outstanding guards are unaffected.
    pub fn publish(&self, state: T) -> Generation {
        let mut retired = self.retired.lock();

        let generation = self.generation.load(Ordering::Acquire) + 1;
        let hold = Arc::new(GenerationHold::new(generation, state));
        let epoch_guard = epoch::pin();
        let previous = self
            .current
            .swap(Owned::new(hold), Ordering::AcqRel, &epoch_guard);
        self.generation.store(generation, Ordering::Release);

        // SAFETY: `previous` was installed by `new` or `publish` and is non-null.
        let previous_hold = unsafe { previous.deref() };
        retired.push_back(Arc::downgrade(previous_hold));
        // SAFETY: `previous` is unreachable from `current` now. Readers pinned
        // before the swap may still dereference it, so destruction is deferred
        // until every such reader has unpinned.
        unsafe { epoch_guard.defer_destroy(previous) };

        retired.retain(|hold| hold.strong_count() > 0);
        generation
    }

    pub fn current_generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    /// The oldest generation pinned by a live guard, or the current generation
    /// if no retired generation is pinned.
    ///
    /// The value is advisory: a reader that loaded the previous hold just
    /// before a publish may register its guard a moment after this call.
    pub fn oldest_used_generation(&self) -> Generation {
        let retired = self.retired.lock();
        retired
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|hold| hold.guards.load(Ordering::Acquire) > 0)
            .map(|hold| hold.generation)
            .min()
            .unwrap_or_else(|| self.current_generation())
    }

    /// Number of retired generations whose state is still allocated.
    pub fn num_held_generations(&self) -> usize {
        let mut retired = self.retired.lock();
        retired.retain(|hold| hold.strong_count() > 0);
        retired.len()
    }

    /// Forget retired generations whose state has been freed.
    pub fn reclaim(&self) {
        self.retired
            .lock()
            .retain(|hold| hold.strong_count() > 0);
    }
}

impl<T> Drop for GenerationHandler<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out a concurrent `take_guard`. Guards own
        // their holds through `Arc`, so freeing this pointer only releases the
        // handler's own reference.
        unsafe {
            let current = self
                .current
                .load(Ordering::Acquire, epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}

impl<T> fmt::Debug for GenerationHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationHandler")
            .field("current_generation", &self.current_generation())
            .finish()
    }
}

/// A pinned view of one generation's state.
///
/// The state is reachable through `Deref` for as long as the guard lives.
/// Cloning a guard pins the same generation again.
pub struct GenerationGuard<T> {
    hold: Arc<GenerationHold<T>>,
}

impl<T> GenerationGuard<T> {
    pub fn generation(&self) -> Generation {
        self.hold.generation
    }
}

impl<T> Deref for GenerationGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.hold.state
    }
}

impl<T> Clone for GenerationGuard<T> {
    fn clone(&self) -> Self {
        self.hold.guards.fetch_add(1, Ordering::AcqRel);
        Self {
            hold: Arc::clone(&self.hold),
        }
    }
}

impl<T> Drop for GenerationGuard<T> {
    fn drop(&mut self) {
        self.hold.guards.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> fmt::Debug for GenerationGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationGuard")
            .field("generation", &self.hold.generation)
            .finish()
    }
}
