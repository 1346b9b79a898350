//! Main memory implementation: the single tracked word `x`.

use std::sync::atomic::{AtomicU64, Ordering};

/// The main memory, holding the one simulated location.
///
/// The word is atomic only so that unsynchronized access is well defined.
/// `read` and `write` are deliberately separate operations: a caller that
/// reads, pauses and then writes back has no protection against another
/// core's write landing in between. Coherent callers only touch the word
/// while holding the bus lock.
#[derive(Debug, Default)]
pub struct MainMemory {
    x: AtomicU64,
}

impl MainMemory {
    /// Create main memory with `x = 0`.
    pub fn new() -> MainMemory {
        MainMemory::default()
    }

    /// Read the current value of `x`.
    pub fn read(&self) -> u64 {
        self.x.load(Ordering::SeqCst)
    }

    /// Overwrite `x` with `value`.
    pub fn write(&self, value: u64) {
        self.x.store(value, Ordering::SeqCst);
    }
}
