pub mod tracker;

pub use tracker::RangeTracker;
