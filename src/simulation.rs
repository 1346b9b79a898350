//! Runs one trial: a worker thread per core hammering `x`, either through
//! the coherence bus or with no protocol at all.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::bus::Bus;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::main_memory::MainMemory;
use crate::memory_cache::{Intent, MemoryCacheId};
use crate::uncoordinated::{LockstepGate, RaceWindow, UncoordinatedAccessor};

/// Which access discipline the workers use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Read, pause, maybe write back, with nothing stopping other cores.
    Uncoordinated,
    /// Every access goes through the MESI bus.
    Coherent,
}

impl Mode {
    /// The heading printed above this mode's results.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Uncoordinated => "Without coherence",
            Mode::Coherent => "With MESI",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The counter that matters for a trial's mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeCounter {
    /// Bus messages sent during a coherent trial.
    Messages(u64),
    /// Updates dropped during an uncoordinated trial.
    Conflicts(u64),
}

/// The outcome of one trial.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialReport {
    /// Which discipline the workers used.
    pub mode: Mode,
    /// Number of worker threads.
    pub cores: usize,
    /// Accesses per worker.
    pub iterations: usize,
    /// When the first worker was about to be spawned.
    pub started_at: DateTime<Utc>,
    /// Time from `started_at` until the last worker was joined.
    pub elapsed: Duration,
    /// Final value of `x`.
    pub final_value: u64,
    /// How many accesses decided to write, summed over every core.
    pub writes: u64,
    /// Messages or conflicts, depending on `mode`.
    pub counter: ModeCounter,
}

impl TrialReport {
    /// Wall-clock duration of the trial in fractional seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
    }

    /// Bus messages, for coherent trials.
    pub fn messages(&self) -> Option<u64> {
        match self.counter {
            ModeCounter::Messages(n) => Some(n),
            ModeCounter::Conflicts(_) => None,
        }
    }

    /// Dropped updates, for uncoordinated trials.
    pub fn conflicts(&self) -> Option<u64> {
        match self.counter {
            ModeCounter::Conflicts(n) => Some(n),
            ModeCounter::Messages(_) => None,
        }
    }

    /// Writes that did not survive into the final value.
    pub fn lost_updates(&self) -> u64 {
        self.writes.saturating_sub(self.final_value)
    }
}

/// Everything a single trial mutates. Built fresh for every run, so no
/// trial can see another's leftovers.
#[derive(Debug)]
pub struct SimulationState {
    memory: MainMemory,
    bus: Bus,
    conflicts: AtomicU64,
    lockstep: Option<LockstepGate>,
}

impl SimulationState {
    /// Zeroed memory and counters, every cache Invalid.
    pub fn new(config: &SimConfig) -> SimulationState {
        let mut bus = Bus::new(config.cores, config.broadcast);
        if let Some(ref observer) = config.observer {
            bus = bus.with_observer(observer.clone());
        }

        SimulationState {
            memory: MainMemory::new(),
            bus: bus,
            conflicts: AtomicU64::new(0),
            lockstep: match config.race_window {
                RaceWindow::Lockstep => Some(LockstepGate::new(config.cores)),
                _ => None,
            },
        }
    }

    /// The shared word.
    pub fn memory(&self) -> &MainMemory {
        &self.memory
    }

    /// The coherence bus and every cache's state.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Updates dropped so far by uncoordinated cores.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// A coherent access by core `who`, through the bus.
    pub fn coherent_access(&self, who: MemoryCacheId, intent: Intent) {
        self.bus.access(&self.memory, who, intent);
    }

    /// An accessor that reads and writes `x` with no protocol.
    pub fn uncoordinated(&self, window: RaceWindow) -> UncoordinatedAccessor<'_> {
        UncoordinatedAccessor::new(&self.memory, &self.conflicts, window, self.lockstep.as_ref())
    }

    /// Release any core waiting in lockstep, because some core will never
    /// arrive.
    pub fn abort(&self) {
        if let Some(ref gate) = self.lockstep {
            gate.break_gate();
        }
    }
}

/// Breaks the lockstep gate if its worker unwinds, so the other workers
/// finish and the runner can report the panic.
struct AbortOnPanic<'a>(&'a SimulationState);

impl<'a> Drop for AbortOnPanic<'a> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// Runs trials. Holds nothing but its configuration between runs.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
}

impl Simulation {
    /// Validate `config` and build a runner for it.
    pub fn new(config: SimConfig) -> SimResult<Simulation> {
        config.validate()?;
        Ok(Simulation { config: config })
    }

    /// The configuration every trial runs with.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run the uncoordinated trial, then the coherent one.
    pub fn run_both(&self) -> SimResult<Vec<TrialReport>> {
        Ok(vec![self.run(Mode::Uncoordinated)?, self.run(Mode::Coherent)?])
    }

    /// Run one trial and block until every worker has finished. A panic in
    /// any worker fails the whole trial.
    pub fn run(&self, mode: Mode) -> SimResult<TrialReport> {
        let config = &self.config;
        let state = SimulationState::new(config);

        info!("{}: {} cores x {} iterations", mode, config.cores, config.iterations);
        let started_at = Utc::now();

        let writes = thread::scope(|s| -> SimResult<u64> {
            let mut handles = Vec::with_capacity(config.cores);
            let mut spawn_error = None;

            for id in 0..config.cores {
                let state = &state;
                let spawned = thread::Builder::new()
                    .name(format!("core {}", id))
                    .spawn_scoped(s, move || work(state, config, mode, id));
                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        state.abort();
                        spawn_error = Some(SimError::Spawn(e));
                        break;
                    }
                }
            }

            // Join every worker before reporting a failure, so no panic is
            // left for the scope to rethrow.
            let mut writes = 0;
            let mut failure = None;
            for (id, handle) in handles {
                match handle.join() {
                    Ok(n) => writes += n,
                    Err(payload) => {
                        if failure.is_none() {
                            failure = Some(SimError::worker_panicked(id, payload));
                        }
                    }
                }
            }

            match spawn_error.or(failure) {
                Some(err) => Err(err),
                None => Ok(writes),
            }
        })?;

        let elapsed = Utc::now() - started_at;

        let counter = match mode {
            Mode::Coherent => ModeCounter::Messages(state.bus().messages()),
            Mode::Uncoordinated => ModeCounter::Conflicts(state.conflicts()),
        };

        let report = TrialReport {
            mode: mode,
            cores: config.cores,
            iterations: config.iterations,
            started_at: started_at,
            elapsed: elapsed,
            final_value: state.memory().read(),
            writes: writes,
            counter: counter,
        };
        info!("{}: x = {}, {} writes, {:?}", mode, report.final_value, report.writes, report.counter);

        Ok(report)
    }
}

/// The body of core `id`'s worker thread. Returns how many writes it issued.
fn work(state: &SimulationState, config: &SimConfig, mode: Mode, id: MemoryCacheId) -> u64 {
    let _abort = AbortOnPanic(state);
    let mut decider = config.pattern.stream(id);
    let mut writes = 0;

    match mode {
        Mode::Coherent => {
            for _ in 0..config.iterations {
                let intent = decider.next_intent();
                if intent == Intent::Write {
                    writes += 1;
                }
                state.coherent_access(id, intent);
            }
        }
        Mode::Uncoordinated => {
            let accessor = state.uncoordinated(config.race_window);
            for _ in 0..config.iterations {
                if accessor.on_access(id, &mut decider).is_some() {
                    writes += 1;
                }
            }
        }
    }

    debug!("core {} finished: {} iterations, {} writes", id, config.iterations, writes);
    writes
}
