pub mod attribute;
pub mod record;

pub use attribute::{Attribute, AttributeValue};
pub use record::{Document, Record, Segment, Token};
