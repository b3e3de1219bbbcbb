use std::fmt;
use serde::{Serialize, Deserialize};

/// Half-open position interval `[low, high)`, never empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub low: u64,
    pub high: u64,
}

impl Span {
    /// Degenerate or inverted bounds are widened to one unit
    pub fn widened(low: u64, high: u64) -> Self {
        let high = if high <= low { low + 1 } else { high };
        Span { low, high }
    }

    pub fn len(&self) -> u64 {
        self.high - self.low
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.low <= other.low && other.high <= self.high
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.low < other.high && other.low < self.high
    }
}

// PostgreSQL range literal
impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{},{})", self.low, self.high)
    }
}
