//! Per-core cache state for the tracked word.

use std::fmt;

/// The id of a memory cache. Core `n` owns cache `n`.
pub type MemoryCacheId = usize;

/// The MESI state of a core's copy of `x`.
///
/// Exclusive is folded into Shared: a fill always lands in Shared, and a
/// write always goes through an invalidation broadcast.
///
/// Which pairs of states may coexist in two different caches:
///
/// <pre>
///   M S I
/// M ✗ ✗ ✓
/// S ✗ ✓ ✓
/// I ✓ ✓ ✓
/// </pre>
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MesiState {
    /// This cache holds the only valid copy and has written to it.
    Modified,

    /// This cache holds a clean copy that other caches may share.
    Shared,

    /// This cache holds no usable copy. Every cache starts here.
    #[default]
    Invalid,
}

impl MesiState {
    /// Can a read be served from this state without going to the bus?
    pub fn is_valid(self) -> bool {
        match self {
            MesiState::Modified | MesiState::Shared => true,
            MesiState::Invalid => false,
        }
    }
}

impl fmt::Display for MesiState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let c = match *self {
            MesiState::Modified => "M",
            MesiState::Shared => "S",
            MesiState::Invalid => "I",
        };
        f.write_str(c)
    }
}

/// What a core intends to do with `x` on a single access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Use the value; a valid line hits.
    Read,
    /// Increment the value; always takes the line Modified.
    Write,
}

/// Check the single-writer invariant over every cache's state: at most one
/// cache is Modified, and if one is, every other cache is Invalid.
pub fn is_exclusive(states: &[MesiState]) -> bool {
    let modified = states.iter().filter(|&&s| s == MesiState::Modified).count();
    match modified {
        0 => true,
        1 => states.iter().all(|&s| s != MesiState::Shared),
        _ => false,
    }
}
