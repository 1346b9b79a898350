//! Where each core's per-iteration write decisions come from.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{SimError, SimResult};
use crate::memory_cache::{Intent, MemoryCacheId};

type ScriptFn = dyn Fn(MemoryCacheId, usize) -> bool + Send + Sync;

/// Decides, for each core and iteration, whether the core writes.
///
/// Uncoordinated workers skip (and count a conflict) when the answer is no;
/// coherent workers read instead.
#[derive(Clone)]
pub enum WritePattern {
    /// Independent coin flips. With a seed, every core gets its own
    /// generator derived from the seed and its id, so each core's stream is
    /// reproducible however the threads interleave.
    Random {
        /// Chance of a write, within `[0, 1]`.
        probability: f64,
        /// `None` draws from OS entropy.
        seed: Option<u64>,
    },
    /// Every access writes.
    Always,
    /// No access writes.
    Never,
    /// Write on even iterations.
    Alternating,
    /// Any forced sequence.
    Script(Arc<ScriptFn>),
}

impl Default for WritePattern {
    fn default() -> WritePattern {
        WritePattern::Random { probability: 0.5, seed: None }
    }
}

impl fmt::Debug for WritePattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            WritePattern::Random { probability, seed } => f
                .debug_struct("Random")
                .field("probability", &probability)
                .field("seed", &seed)
                .finish(),
            WritePattern::Always => f.write_str("Always"),
            WritePattern::Never => f.write_str("Never"),
            WritePattern::Alternating => f.write_str("Alternating"),
            WritePattern::Script(_) => f.write_str("Script(..)"),
        }
    }
}

impl WritePattern {
    /// Wrap `f(core, iteration)` as a `Script` pattern.
    pub fn script<F>(f: F) -> WritePattern
        where F: Fn(MemoryCacheId, usize) -> bool + Send + Sync + 'static
    {
        WritePattern::Script(Arc::new(f))
    }

    pub(crate) fn validate(&self) -> SimResult<()> {
        if let WritePattern::Random { probability, .. } = *self {
            if !(0.0..=1.0).contains(&probability) {
                return Err(SimError::InvalidConfig("write probability must be within [0, 1]"));
            }
        }
        Ok(())
    }

    /// The decision stream for `core`, starting at iteration 0. Fails if
    /// the pattern's probability is out of range.
    pub fn decider(&self, core: MemoryCacheId) -> SimResult<Decider> {
        self.validate()?;
        Ok(self.stream(core))
    }

    /// `decider` without validation, for patterns already checked by
    /// `SimConfig::validate`.
    pub(crate) fn stream(&self, core: MemoryCacheId) -> Decider {
        let source = match *self {
            WritePattern::Random { probability, seed } => {
                let rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(core_seed(seed, core)),
                    None => StdRng::from_entropy(),
                };
                Source::Random { rng, probability }
            }
            WritePattern::Always => Source::Constant(true),
            WritePattern::Never => Source::Constant(false),
            WritePattern::Alternating => Source::Alternating,
            WritePattern::Script(ref f) => Source::Script(f.clone()),
        };
        Decider { core, iteration: 0, source }
    }
}

fn core_seed(seed: u64, core: MemoryCacheId) -> u64 {
    seed ^ (core as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

enum Source {
    Random { rng: StdRng, probability: f64 },
    Constant(bool),
    Alternating,
    Script(Arc<ScriptFn>),
}

/// One core's endless stream of write decisions.
pub struct Decider {
    core: MemoryCacheId,
    iteration: usize,
    source: Source,
}

impl fmt::Debug for Decider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Decider")
            .field("core", &self.core)
            .field("iteration", &self.iteration)
            .finish()
    }
}

impl Decider {
    /// The next decision, as a coherent access intent.
    pub fn next_intent(&mut self) -> Intent {
        if self.decide() { Intent::Write } else { Intent::Read }
    }

    /// The next decision: `true` to write.
    pub fn decide(&mut self) -> bool {
        let iteration = self.iteration;
        self.iteration += 1;
        match self.source {
            Source::Random { ref mut rng, probability } => rng.gen_bool(probability),
            Source::Constant(write) => write,
            Source::Alternating => iteration % 2 == 0,
            Source::Script(ref f) => f(self.core, iteration),
        }
    }
}

impl Iterator for Decider {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        Some(self.decide())
    }
}
