//! Simulates many cores incrementing one shared word, once with no coherence
//! protocol at all (and so losing updates), and once through a simplified
//! MESI protocol whose bus serializes ownership of the word.

#![deny(missing_debug_implementations)]
#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod error;
pub mod main_memory;
pub mod memory_cache;
pub mod report;
pub mod simulation;
pub mod uncoordinated;
pub mod workload;

pub use bus::{Access, BroadcastPolicy, Bus, BusMessage, BusObserver};
pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use main_memory::MainMemory;
pub use memory_cache::{Intent, MemoryCacheId, MesiState};
pub use report::{ConsoleSink, MemorySink, ReportSink};
pub use simulation::{Mode, ModeCounter, Simulation, SimulationState, TrialReport};
pub use uncoordinated::{LockstepGate, RaceWindow, UncoordinatedAccessor};
pub use workload::{Decider, WritePattern};
