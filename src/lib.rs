pub mod core;
pub mod model;
pub mod schema;
pub mod range;
pub mod storage;
pub mod deps;
pub mod aligned;
pub mod analysis;
pub mod writer;

pub use crate::core::config::{AlignedEntitySource, Config, FtsMode};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::stats::{RunSummary, TableSummary};
pub use crate::core::types::Span;
pub use crate::model::{Attribute, AttributeValue, Document, Record, Segment, Token};
pub use crate::schema::CorpusSchema;
pub use crate::writer::Verticalizer;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                        CORPUSVERT PIPELINE                                   │
└──────────────────────────────────────────────────────────────────────────────┘

  records (Result<Record>) ──► Verticalizer::push
                                  │
        ┌─────────────────────────┼───────────────────────────────┐
        │                         │                               │
  OpenDocument              per segment                     per token
  DocumentWriter            ├─ SpanAggregator (segment)     ├─ TokenSchema columns
  (document.csv)            ├─ tokens ─────────────────────►├─ LookupTable get_id
                            ├─ segment row                  ├─ DependencyLinearizer
                            └─ FtsVectorBuilder             ├─ SpanAggregator (token)
                               (fts_vector.csv)             └─ RangeTracker advance
                                  │
                                  ▼
                      Verticalizer::finish
                      ├─ flush linearizers     (nested-set rows)
                      ├─ close aligned entities
                      ├─ last / fallback document
                      ├─ TableRegistry::finalize
                      │    ├─ {table}_labels.csv + label padding (atomic rename)
                      │    └─ categorical values ─► CorpusSchema
                      └─ manifest.json (RunSummary, CRC32 per table)

  Shared state: RangeTracker (char cursor from 1, frame cursor from 0),
                TableRegistry (arena of tables addressed by TableId)
*/
