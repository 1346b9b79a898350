//! The bus connects every core's cache to main memory. All coherence traffic
//! goes through it, and it is the only thing that changes a cache's state.

use std::fmt;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::main_memory::MainMemory;
use crate::memory_cache::{self, Intent, MemoryCacheId, MesiState};

/// The transactions a cache can put on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMessage {
    /// A read miss, filled from main memory. A peer holding `x` Modified
    /// snoops the fill and drops to Shared.
    ReadFill {
        /// Which memory cache missed.
        who: MemoryCacheId,
    },

    /// A broadcast taking exclusive ownership of `x` ahead of a write. Every
    /// other cache drops to Invalid.
    Invalidate {
        /// Which memory cache is about to write.
        who: MemoryCacheId,
    },
}

/// Whether a write from the cache that already holds `x` Modified goes on
/// the bus again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BroadcastPolicy {
    /// Every write broadcasts an invalidation, owner or not.
    #[default]
    Always,
    /// An owner writes silently, as textbook MESI does.
    SkipWhenOwner,
}

/// Hooks called from inside the bus lock, so they see every cache's state
/// exactly as it was at that step and never interleaved with another access.
pub trait BusObserver: Send + Sync {
    /// Called after each message's state transitions have been applied.
    fn on_message(&self, msg: BusMessage, caches: &[MesiState]);

    /// Called once an access has fully completed.
    fn on_access(&self, _who: MemoryCacheId, _intent: Intent, _access: &Access, _caches: &[MesiState]) {}
}

/// What a single access did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Access {
    /// The access missed and issued a `ReadFill`.
    pub filled: bool,
    /// The access issued an `Invalidate` broadcast.
    pub invalidated: bool,
    /// The value written to main memory, for writes.
    pub written: Option<u64>,
}

impl Access {
    /// Number of bus messages this access cost.
    pub fn messages(&self) -> u64 {
        self.filled as u64 + self.invalidated as u64
    }

    /// Did the access find a valid line in its cache?
    pub fn is_hit(&self) -> bool {
        !self.filled
    }
}

struct BusState {
    caches: Vec<MesiState>,
    messages: u64,
}

/// The coherence bus. A single lock covers every cache's state, the message
/// counter, and coherent writes to main memory.
pub struct Bus {
    state: Mutex<BusState>,
    policy: BroadcastPolicy,
    observer: Option<Arc<dyn BusObserver>>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bus")
            .field("caches", &self.snapshot())
            .field("messages", &self.messages())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Bus {
    /// Create a bus with `number_of_caches` caches, all Invalid.
    pub fn new(number_of_caches: usize, policy: BroadcastPolicy) -> Bus {
        Bus {
            state: Mutex::new(BusState {
                caches: vec![MesiState::Invalid; number_of_caches],
                messages: 0,
            }),
            policy: policy,
            observer: None,
        }
    }

    /// Attach an observer that sees every transition.
    pub fn with_observer(mut self, observer: Arc<dyn BusObserver>) -> Bus {
        self.observer = Some(observer);
        self
    }

    /// Perform one access to `x` by cache `who`.
    ///
    /// A miss fills the line in Shared. A write then broadcasts an
    /// invalidation, takes the line Modified and increments `x` in
    /// `memory`. Everything happens under one lock acquisition, so two
    /// writers can never both hold Modified.
    pub fn access(&self, memory: &MainMemory, who: MemoryCacheId, intent: Intent) -> Access {
        let mut guard = self.state.lock();
        let BusState { caches, messages } = &mut *guard;
        assert!(who < caches.len(), "no memory cache {} on a bus of {}", who, caches.len());

        let mut access = Access::default();

        if caches[who] == MesiState::Invalid {
            for (id, cache) in caches.iter_mut().enumerate() {
                if id != who && *cache == MesiState::Modified {
                    *cache = MesiState::Shared;
                }
            }
            caches[who] = MesiState::Shared;
            *messages += 1;
            access.filled = true;
            self.emit(BusMessage::ReadFill { who: who }, caches);
        }

        match intent {
            Intent::Read => {}
            Intent::Write => {
                let owner = caches[who] == MesiState::Modified;
                if !owner || self.policy == BroadcastPolicy::Always {
                    for (id, cache) in caches.iter_mut().enumerate() {
                        *cache = if id == who { MesiState::Modified } else { MesiState::Invalid };
                    }
                    *messages += 1;
                    access.invalidated = true;
                    self.emit(BusMessage::Invalidate { who: who }, caches);
                }

                let value = memory.read() + 1;
                memory.write(value);
                access.written = Some(value);
            }
        }

        debug_assert!(memory_cache::is_exclusive(caches), "coherence lost: {:?}", caches);

        if let Some(ref observer) = self.observer {
            observer.on_access(who, intent, &access, caches);
        }

        access
    }

    fn emit(&self, msg: BusMessage, caches: &[MesiState]) {
        trace!("{:?} -> {:?}", msg, caches);
        if let Some(ref observer) = self.observer {
            observer.on_message(msg, caches);
        }
    }

    /// Total messages sent on this bus.
    pub fn messages(&self) -> u64 {
        self.state.lock().messages
    }

    /// A copy of every cache's current state.
    pub fn snapshot(&self) -> Vec<MesiState> {
        self.state.lock().caches.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_cache::MesiState::*;

    fn bus(n: usize) -> (Bus, MainMemory) {
        (Bus::new(n, BroadcastPolicy::Always), MainMemory::new())
    }

    #[test]
    fn read_miss_fills_shared() {
        let (bus, memory) = bus(2);
        let access = bus.access(&memory, 0, Intent::Read);
        assert!(access.filled && !access.invalidated);
        assert_eq!(access.written, None);
        assert_eq!(bus.snapshot(), vec![Shared, Invalid]);
        assert_eq!(bus.messages(), 1);
        assert_eq!(memory.read(), 0);
    }

    #[test]
    fn read_hit_is_free() {
        let (bus, memory) = bus(2);
        bus.access(&memory, 0, Intent::Read);
        let access = bus.access(&memory, 0, Intent::Read);
        assert!(access.is_hit());
        assert_eq!(access.messages(), 0);
        assert_eq!(bus.messages(), 1);
    }

    #[test]
    fn write_from_invalid_costs_two() {
        let (bus, memory) = bus(3);
        bus.access(&memory, 1, Intent::Read);
        bus.access(&memory, 2, Intent::Read);
        let access = bus.access(&memory, 0, Intent::Write);
        assert_eq!(access.messages(), 2);
        assert_eq!(access.written, Some(1));
        assert_eq!(bus.snapshot(), vec![Modified, Invalid, Invalid]);
        assert_eq!(memory.read(), 1);
    }

    #[test]
    fn write_from_shared_costs_one() {
        let (bus, memory) = bus(2);
        bus.access(&memory, 0, Intent::Read);
        bus.access(&memory, 1, Intent::Read);
        assert_eq!(bus.snapshot(), vec![Shared, Shared]);
        let access = bus.access(&memory, 1, Intent::Write);
        assert_eq!(access.messages(), 1);
        assert_eq!(bus.snapshot(), vec![Invalid, Modified]);
    }

    #[test]
    fn owner_rebroadcasts_by_default() {
        let (bus, memory) = bus(2);
        bus.access(&memory, 0, Intent::Write);
        let access = bus.access(&memory, 0, Intent::Write);
        assert!(access.invalidated);
        assert_eq!(bus.messages(), 3);
        assert_eq!(memory.read(), 2);
    }

    #[test]
    fn owner_writes_silently_when_skipping() {
        let bus = Bus::new(2, BroadcastPolicy::SkipWhenOwner);
        let memory = MainMemory::new();
        bus.access(&memory, 0, Intent::Write);
        let access = bus.access(&memory, 0, Intent::Write);
        assert_eq!(access.messages(), 0);
        assert_eq!(access.written, Some(2));
        assert_eq!(bus.snapshot(), vec![Modified, Invalid]);
        assert_eq!(bus.messages(), 2);
    }

    #[test]
    fn read_miss_demotes_owner() {
        let (bus, memory) = bus(2);
        bus.access(&memory, 0, Intent::Write);
        let access = bus.access(&memory, 1, Intent::Read);
        assert!(access.filled);
        assert_eq!(bus.snapshot(), vec![Shared, Shared]);
        assert!(memory_cache::is_exclusive(&bus.snapshot()));
    }

    #[test]
    fn ping_pong_costs_two_per_write() {
        let (bus, memory) = bus(2);
        for i in 0..10 {
            let access = bus.access(&memory, i % 2, Intent::Write);
            assert_eq!(access.messages(), 2);
        }
        assert_eq!(bus.messages(), 20);
        assert_eq!(memory.read(), 10);
    }

    #[test]
    #[should_panic(expected = "no memory cache 2")]
    fn unknown_cache_panics() {
        let (bus, memory) = bus(2);
        bus.access(&memory, 2, Intent::Read);
    }
}
