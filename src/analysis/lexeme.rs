use std::fmt;
use serde::{Serialize, Deserialize};

/// One weighted lexeme of a segment's search vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexeme {
    pub rank: usize,      // 1-based attribute rank, prefixed to the text
    pub text: String,
    pub position: u32,    // 1-based token position in the segment
}

impl Lexeme {
    pub fn new(rank: usize, text: &str, position: u32) -> Self {
        Lexeme {
            rank,
            text: text.to_string(),
            position,
        }
    }
}

// tsvector literal: single quotes are doubled
impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}{}':{}", self.rank, self.text.replace('\'', "''"), self.position)
    }
}
