use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counter type id for the election state counter.
pub const ELECTION_STATE_TYPE_ID: i32 = 207;

/// Counter type id for the commit position counter.
pub const COMMIT_POSITION_TYPE_ID: i32 = 203;

/// A process-visible counter updated with ordered stores.
///
/// Clones share the same underlying value, so the host can hand one handle to
/// the election and keep another for observers. A reader pairing
/// [`AtomicCounter::get`] with the writer's [`AtomicCounter::set_ordered`]
/// sees values in store order.
#[derive(Clone, Debug)]
pub struct AtomicCounter {
    type_id: i32,
    value: Arc<AtomicU64>,
}

impl AtomicCounter {
    pub fn new(type_id: i32) -> Self {
        Self {
            type_id,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Store with release ordering so that state mutated before the store is
    /// visible to a reader that acquires the new value.
    pub fn set_ordered(&self, value: u64) {
        self.value.store(value, Ordering::Release);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Read without ordering, for hot-path polling where staleness is fine.
    pub fn get_weak(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl fmt::Display for AtomicCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "counter(type_id={}, value={})", self.type_id, self.get())
    }
}
