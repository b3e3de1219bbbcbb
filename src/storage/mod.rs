pub mod layout;
pub mod labels;
pub mod table;
pub mod registry;

pub use layout::OutputLayout;
pub use registry::TableRegistry;
pub use table::{Table, TableId, TableKind};
