pub mod token_schema;
pub mod document;
pub mod verticalizer;

pub use verticalizer::{TableNames, Verticalizer};
