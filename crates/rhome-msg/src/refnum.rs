//! ---
//! rhome_section: "02-messaging"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Line protocol codec, message variants and queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reference number used to correlate requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefNum(u64);

impl RefNum {
    /// Wrap a raw reference value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw reference value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RefNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RefNum {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Process-wide source of increasing reference numbers.
///
/// Values are never reused within a process lifetime; nothing is persisted
/// across restarts.
#[derive(Debug)]
pub struct RefNumGenerator {
    next: AtomicU64,
}

impl RefNumGenerator {
    /// First value handed out by [`RefNumGenerator::new`].
    pub const DEFAULT_START: u64 = 100;

    /// Generator starting at [`Self::DEFAULT_START`].
    pub fn new() -> Self {
        Self::starting_at(Self::DEFAULT_START)
    }

    /// Generator whose first value is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Allocate the next reference number.
    pub fn next(&self) -> RefNum {
        RefNum(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RefNumGenerator {
    fn default() -> Self {
        Self::new()
    }
}
