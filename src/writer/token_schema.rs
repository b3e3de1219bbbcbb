use std::collections::HashSet;
use crate::analysis::{FtsSource, FtsVectorBuilder};
use crate::core::error::Result;
use crate::model::{AttributeValue, Segment};
use crate::schema::{AttributeType, CorpusSchema};
use crate::storage::{TableId, TableRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Categorical,                    // Written as-is, value domain recorded
    Labels,                         // Bitstring over the token table's vocabulary
    Lookup { table: TableId },      // Text and meta values, interned
    Relation { relation: usize },   // Dependency edges, no column
}

#[derive(Debug, Clone)]
pub struct TokenColumn {
    pub attribute: String,
    pub kind: ColumnKind,
}

impl TokenColumn {
    /// Header name, `None` when the attribute is not written to the token table
    pub fn header(&self) -> Option<String> {
        match self.kind {
            ColumnKind::Lookup { .. } => Some(format!("{}_id", self.attribute)),
            ColumnKind::Relation { .. } => None,
            _ => Some(self.attribute.clone()),
        }
    }
}

/// Token table layout, frozen from the first non-empty segment of the run.
///
/// Attributes first seen after the freeze are dropped.
#[derive(Debug, Clone)]
pub struct TokenSchema {
    pub columns: Vec<TokenColumn>,
    pub relations: Vec<String>,
    pub has_frames: bool,
    pub fts: FtsVectorBuilder,
}

impl TokenSchema {
    /// Scan `segment` for every attribute that is non-null on at least one token.
    /// Aligned-entity references are left out; they feed the span aggregator.
    pub fn freeze(
        segment: &Segment,
        token_layer: &str,
        schema: &CorpusSchema,
        aligned: &[String],
        registry: &mut TableRegistry,
    ) -> Result<Self> {
        let mut token_schema = TokenSchema {
            columns: Vec::new(),
            relations: Vec::new(),
            has_frames: segment.tokens.iter().any(|t| t.frame_range.is_some()),
            fts: FtsVectorBuilder::new(),
        };
        let mut seen = HashSet::new();

        for token in &segment.tokens {
            for attribute in &token.attributes {
                if attribute.is_null() || seen.contains(&attribute.name) {
                    continue;
                }
                seen.insert(attribute.name.clone());
                if aligned.contains(&attribute.name.to_lowercase()) {
                    continue;
                }

                let declared = schema
                    .attribute(token_layer, &attribute.name)
                    .and_then(|spec| spec.kind);
                let (kind, fts) = match &attribute.value {
                    AttributeValue::Dependency { .. } => {
                        token_schema.relations.push(attribute.name.clone());
                        let relation = token_schema.relations.len() - 1;
                        (ColumnKind::Relation { relation }, Some(FtsSource::Edge))
                    }
                    AttributeValue::Text(_) => {
                        let table = registry.get_or_create_lookup(token_layer, &attribute.name)?;
                        (ColumnKind::Lookup { table }, Some(FtsSource::Value))
                    }
                    AttributeValue::Meta(_) => {
                        let table = registry.get_or_create_lookup(token_layer, &attribute.name)?;
                        (ColumnKind::Lookup { table }, None)
                    }
                    AttributeValue::Categorical(_) if declared == Some(AttributeType::Labels) => {
                        (ColumnKind::Labels, Some(FtsSource::Value))
                    }
                    AttributeValue::Categorical(_) => (ColumnKind::Categorical, Some(FtsSource::Value)),
                };
                if let Some(source) = fts {
                    token_schema.fts = token_schema.fts.add_field(&attribute.name, source);
                }
                token_schema.columns.push(TokenColumn {
                    attribute: attribute.name.clone(),
                    kind,
                });
            }
        }
        Ok(token_schema)
    }

    /// `{token}_id`, attribute columns, `char_range`, `frame_range`, `{segment}_id`,
    /// along with the positions of label columns
    pub fn header(&self, token_table: &str, segment_table: &str) -> (Vec<String>, Vec<usize>) {
        let mut header = vec![format!("{}_id", token_table)];
        let mut label_columns = Vec::new();
        for column in &self.columns {
            let Some(name) = column.header() else {
                continue;
            };
            if column.kind == ColumnKind::Labels {
                label_columns.push(header.len());
            }
            header.push(name);
        }
        header.push("char_range".to_string());
        if self.has_frames {
            header.push("frame_range".to_string());
        }
        header.push(format!("{}_id", segment_table));
        (header, label_columns)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.columns.iter().any(|c| c.attribute == attribute)
    }
}
