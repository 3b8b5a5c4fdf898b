//! Unique-by-construction numeric IDs.
//!
//! Candidates, lambda arguments, call sites and declared type parameters all
//! need an identity that survives cloning: a candidate is copied into an
//! [`Arc`] when it is attached to a resolved reference, a lambda argument is
//! shared between every candidate that postpones it, and so on. A [`Uid`] is
//! that identity. If two [`Uid`] values are equal then one is a copy of the
//! other; both came from the same call to [`Uid::fresh`].
//!
//! # Threads
//! The counter is a process-wide atomic, so resolvers running on different
//! threads never hand out the same id. Ids are therefore not deterministic
//! across runs (or across threads), and nothing that is compared for
//! structural equality (see [`ResolvedReference`]) may depend on their values.
//!
//! # Exhaustion
//! With `u32` ids we get a little over four billion of them per process. A
//! single resolution creates a handful of ids per candidate, so a run would
//! need to see on the order of a billion candidates before the counter wraps.
//! We treat that as unreachable and check it with a debug assertion.
//!
//! [`Arc`]: std::sync::Arc
//! [`ResolvedReference`]: crate::resolve::reference::ResolvedReference

use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};

static COUNTER: AtomicU32 = AtomicU32::new(1);

/// A unique-by-construction numeric identifier.
#[derive(Hash, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Uid(NonZeroU32);

impl std::fmt::Debug for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "⟨{}⟩", self.0)
    }
}

impl From<Uid> for u32 {
    fn from(value: Uid) -> Self {
        value.0.into()
    }
}

impl Uid {
    /// Returns a new unique [`Uid`].
    pub fn fresh() -> Uid {
        let raw_id = COUNTER.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(raw_id, 0, "the Uid counter wrapped around");

        // SAFETY: COUNTER is initialized to 1 and only ever incremented; the
        // assertion above covers the (unreachable) wrap-around case
        let uid = unsafe { NonZeroU32::new_unchecked(raw_id) };
        Uid(uid)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::Uid;

    #[test]
    fn id_uniqueness() {
        let a = Uid::fresh();
        let b = Uid::fresh();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let ids = std::thread::scope(|s| {
            let handles = (0..4)
                .map(|_| {
                    s.spawn(|| (0..256).map(|_| Uid::fresh()).collect::<Vec<_>>())
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        let distinct = ids.iter().copied().collect::<HashSet<_>>();
        assert_eq!(distinct.len(), ids.len());
    }
}
