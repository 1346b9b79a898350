//! Knobs for a simulation run.

use std::fmt;
use std::sync::Arc;

use crate::bus::{BroadcastPolicy, BusObserver};
use crate::error::{SimError, SimResult};
use crate::uncoordinated::RaceWindow;
use crate::workload::WritePattern;

/// The number of cores (and so caches) to simulate by default.
pub const DEFAULT_CORES: usize = 2;

/// The number of accesses each core performs by default.
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Everything a trial needs to know before it starts. Build one from
/// `Default` and the chained setters.
#[derive(Clone)]
pub struct SimConfig {
    /// Number of simulated cores, one worker thread each.
    pub cores: usize,
    /// Accesses each core performs.
    pub iterations: usize,
    /// Where each core's write decisions come from.
    pub pattern: WritePattern,
    /// Only used by uncoordinated runs. Coherent runs never pause.
    pub race_window: RaceWindow,
    /// Whether an owner's write costs a message. Only used by coherent runs.
    pub broadcast: BroadcastPolicy,
    /// Sees every bus transition of coherent runs.
    pub observer: Option<Arc<dyn BusObserver>>,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            cores: DEFAULT_CORES,
            iterations: DEFAULT_ITERATIONS,
            pattern: WritePattern::default(),
            race_window: RaceWindow::default(),
            broadcast: BroadcastPolicy::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SimConfig")
            .field("cores", &self.cores)
            .field("iterations", &self.iterations)
            .field("pattern", &self.pattern)
            .field("race_window", &self.race_window)
            .field("broadcast", &self.broadcast)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl SimConfig {
    /// Set the number of cores.
    pub fn cores(mut self, cores: usize) -> SimConfig {
        self.cores = cores;
        self
    }

    /// Set the accesses per core.
    pub fn iterations(mut self, iterations: usize) -> SimConfig {
        self.iterations = iterations;
        self
    }

    /// Set the write decisions.
    pub fn pattern(mut self, pattern: WritePattern) -> SimConfig {
        self.pattern = pattern;
        self
    }

    /// Set the uncoordinated race window.
    pub fn race_window(mut self, race_window: RaceWindow) -> SimConfig {
        self.race_window = race_window;
        self
    }

    /// Set the owner broadcast policy.
    pub fn broadcast(mut self, broadcast: BroadcastPolicy) -> SimConfig {
        self.broadcast = broadcast;
        self
    }

    /// Attach a bus observer.
    pub fn observer(mut self, observer: Arc<dyn BusObserver>) -> SimConfig {
        self.observer = Some(observer);
        self
    }

    /// Reject configurations no trial can run: no cores, or a write
    /// probability outside `[0, 1]`.
    pub fn validate(&self) -> SimResult<()> {
        if self.cores == 0 {
            return Err(SimError::InvalidConfig("at least one core is required"));
        }
        self.pattern.validate()
    }
}
