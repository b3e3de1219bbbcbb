use crate::analysis::lexeme::Lexeme;
use crate::model::{AttributeValue, Segment};

/// How a frozen token attribute feeds the search vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtsSource {
    Value,   // Categorical or text value, one rank
    Edge,    // Dependency label, indexed as inbound and outbound: two ranks
}

#[derive(Debug, Clone)]
struct FtsField {
    attribute: String,
    source: FtsSource,
    rank: usize,
}

/// Builds the per-segment lexeme vector.
///
/// Ranks are fixed from the frozen token attributes, so an attribute keeps
/// the same rank on every token even when another attribute is missing.
#[derive(Debug, Clone, Default)]
pub struct FtsVectorBuilder {
    fields: Vec<FtsField>,
}

impl FtsVectorBuilder {
    pub fn new() -> Self {
        FtsVectorBuilder::default()
    }

    pub fn add_field(mut self, attribute: &str, source: FtsSource) -> Self {
        let rank = match self.fields.last() {
            Some(FtsField { source: FtsSource::Edge, rank, .. }) => rank + 2,
            Some(FtsField { rank, .. }) => rank + 1,
            None => 1,
        };
        self.fields.push(FtsField {
            attribute: attribute.to_string(),
            source,
            rank,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn lexemes(&self, segment: &Segment) -> Vec<Lexeme> {
        let mut lexemes = Vec::new();
        for (n, token) in segment.tokens.iter().enumerate() {
            let position = (n + 1) as u32;
            for field in &self.fields {
                let Some(attribute) = token.attribute(&field.attribute) else {
                    continue;
                };
                match (&field.source, &attribute.value) {
                    (FtsSource::Value, AttributeValue::Categorical(v))
                    | (FtsSource::Value, AttributeValue::Text(v)) => {
                        if !v.is_empty() {
                            lexemes.push(Lexeme::new(field.rank, v, position));
                        }
                    }
                    (FtsSource::Edge, AttributeValue::Dependency { label, .. }) => {
                        lexemes.push(Lexeme::new(field.rank, label, position));
                        lexemes.push(Lexeme::new(field.rank + 1, label, position));
                    }
                    _ => {}
                }
            }
        }
        lexemes
    }

    /// Space-joined `'{rank}{value}':{position}` vector
    pub fn build(&self, segment: &Segment) -> String {
        self.lexemes(segment)
            .iter()
            .map(Lexeme::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
