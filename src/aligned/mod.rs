pub mod reference;
pub mod aggregator;

pub use aggregator::SpanAggregator;
pub use reference::ReferenceFile;
