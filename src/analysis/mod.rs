pub mod lexeme;
pub mod fts;

pub use fts::{FtsSource, FtsVectorBuilder};
pub use lexeme::Lexeme;
