pub mod nested_set;
pub mod linearizer;

pub use linearizer::{DependencyLinearizer, DependencyRow, LinearizerState, DEPENDENCY_COLUMNS};
pub use nested_set::{NestedSetForest, NestedSetNode};
