//! Reading and writing `x` with no coherence protocol at all.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::main_memory::MainMemory;
use crate::memory_cache::MemoryCacheId;
use crate::workload::Decider;

/// How long a core lingers between reading `x` and writing it back. The
/// longer the window, the more often another core's write lands inside it
/// and gets lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceWindow {
    /// Write back immediately.
    Immediate,
    /// Give up the rest of the time slice.
    Yield,
    /// Sleep for a fixed time.
    Sleep(Duration),
    /// Every core waits for all the others between its read and its write.
    /// Each round then loses every concurrent write but one.
    Lockstep,
}

impl Default for RaceWindow {
    fn default() -> RaceWindow {
        RaceWindow::Sleep(Duration::from_millis(1))
    }
}

#[derive(Debug)]
struct GateState {
    waiting: usize,
    generation: u64,
    broken: bool,
}

/// A reusable rendezvous for `RaceWindow::Lockstep`. Every core waits at the
/// gate until all `parties` have arrived, then all are released together.
///
/// Unlike `std::sync::Barrier` the gate can be broken: once a core dies or
/// never starts, `break_gate` releases everyone waiting now and every later
/// `wait` returns at once.
#[derive(Debug)]
pub struct LockstepGate {
    parties: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

impl LockstepGate {
    /// Create a gate for `parties` cores.
    pub fn new(parties: usize) -> LockstepGate {
        LockstepGate {
            parties: parties,
            state: Mutex::new(GateState { waiting: 0, generation: 0, broken: false }),
            released: Condvar::new(),
        }
    }

    /// Block until every party has arrived. Returns `false` if the gate was
    /// broken instead.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.broken {
            return false;
        }

        let generation = state.generation;
        state.waiting += 1;
        if state.waiting == self.parties {
            state.waiting = 0;
            state.generation += 1;
            self.released.notify_all();
            return true;
        }

        while state.generation == generation && !state.broken {
            self.released.wait(&mut state);
        }
        state.generation != generation
    }

    /// Release every waiter and make every later `wait` return immediately.
    pub fn break_gate(&self) {
        let mut state = self.state.lock();
        if !state.broken {
            debug!("lockstep gate broken with {} of {} cores waiting", state.waiting, self.parties);
        }
        state.broken = true;
        self.released.notify_all();
    }

    /// Has `break_gate` been called?
    pub fn is_broken(&self) -> bool {
        self.state.lock().broken
    }
}

/// Performs read, pause, maybe-write accesses on main memory.
///
/// Nothing here excludes other cores: the read and the write are separate
/// atomic operations, and any number of cores can be between them at once.
#[derive(Debug)]
pub struct UncoordinatedAccessor<'a> {
    memory: &'a MainMemory,
    conflicts: &'a AtomicU64,
    window: RaceWindow,
    lockstep: Option<&'a LockstepGate>,
}

impl<'a> UncoordinatedAccessor<'a> {
    /// `lockstep` must be shared by exactly the cores that will access, and
    /// is required when `window` is `RaceWindow::Lockstep`.
    pub fn new(memory: &'a MainMemory,
               conflicts: &'a AtomicU64,
               window: RaceWindow,
               lockstep: Option<&'a LockstepGate>)
               -> UncoordinatedAccessor<'a>
    {
        assert!(window != RaceWindow::Lockstep || lockstep.is_some(),
                "lockstep race window without a gate");
        UncoordinatedAccessor {
            memory: memory,
            conflicts: conflicts,
            window: window,
            lockstep: lockstep,
        }
    }

    /// One access by core `who`. Returns the value written, or `None` if the
    /// core dropped its update and counted a conflict instead.
    pub fn on_access(&self, who: MemoryCacheId, decider: &mut Decider) -> Option<u64> {
        let snapshot = self.memory.read();

        self.pause();

        if decider.decide() {
            let value = snapshot + 1;
            self.memory.write(value);
            trace!("core {} wrote {} over a read of {}", who, value, snapshot);
            Some(value)
        } else {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            trace!("core {} dropped its update", who);
            None
        }
    }

    fn pause(&self) {
        match self.window {
            RaceWindow::Immediate => {}
            RaceWindow::Yield => thread::yield_now(),
            RaceWindow::Sleep(d) => thread::sleep(d),
            RaceWindow::Lockstep => {
                if let Some(gate) = self.lockstep {
                    gate.wait();
                }
            }
        }
    }
}
