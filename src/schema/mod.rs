pub mod schema;

pub use schema::{
    AttributeSpec, AttributeType, Anchoring, CorpusMeta, CorpusSchema, FirstClass, LayerSpec,
    MediaSlot,
};
