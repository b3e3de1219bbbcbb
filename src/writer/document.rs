use std::collections::HashSet;
use std::sync::Arc;
use serde_json::{Map, Value};
use crate::core::error::{Error, Result};
use crate::core::types::Span;
use crate::model::{Attribute, AttributeValue, Document};
use crate::range::RangeTracker;
use crate::schema::CorpusSchema;
use crate::storage::{TableId, TableRegistry};

/// Document currently receiving segments.
/// `document` is `None` for the implicit document of a stream without markers.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub document: Option<Arc<Document>>,
    pub char_start: u64,
    pub frame_offset: u64,            // Global frame cursor when the document opened
    pub frame_end: Option<u64>,
}

impl OpenDocument {
    pub fn open(document: Option<Arc<Document>>, tracker: &RangeTracker) -> Self {
        OpenDocument {
            document,
            char_start: tracker.char_cursor(),
            frame_offset: tracker.frame_cursor(),
            frame_end: None,
        }
    }

    pub fn is(&self, other: &Arc<Document>) -> bool {
        self.document.as_ref().is_some_and(|d| Arc::ptr_eq(d, other))
    }

    pub fn track_frames(&mut self, high: u64) {
        self.frame_end = Some(self.frame_end.map_or(high, |end| end.max(high)));
    }

    fn attributes(&self) -> &[Attribute] {
        match &self.document {
            Some(document) => &document.attributes,
            None => &[],
        }
    }

    fn id(&self) -> &str {
        self.document.as_deref().map_or("", |d| d.id.as_str())
    }
}

/// Writes one row per closed document
pub struct DocumentWriter {
    table: TableId,
    columns: Option<Vec<String>>,    // Attribute columns frozen by the first document
    has_frames: bool,
    named: bool,
    dropped: HashSet<String>,
}

impl DocumentWriter {
    pub fn new(table: TableId) -> Self {
        DocumentWriter {
            table,
            columns: None,
            has_frames: false,
            named: false,
            dropped: HashSet::new(),
        }
    }

    /// Write the row of `open`, returning its frame key and global frame
    /// range when any of its tokens carried frames
    pub fn write(
        &mut self,
        open: &OpenDocument,
        registry: &mut TableRegistry,
        tracker: &RangeTracker,
        schema: &CorpusSchema,
        frames_enabled: bool,
        default_meta: Option<&Map<String, Value>>,
    ) -> Result<Option<(String, Span)>> {
        check_media_slots(open, schema)?;

        let meta = match &open.document {
            Some(document) => document.meta().cloned().unwrap_or_default(),
            None => default_meta.cloned().unwrap_or_default(),
        };
        let others: Vec<&Attribute> = open
            .attributes()
            .iter()
            .filter(|a| a.name != "meta")
            .collect();

        let table = registry.table_mut(self.table);
        if !table.is_frozen() {
            let columns: Vec<String> = others.iter().map(|a| a.name.to_lowercase()).collect();
            self.has_frames = frames_enabled;
            self.named = schema.has_time_based_media();

            let mut header = vec![format!("{}_id", table.name), "char_range".to_string()];
            if self.has_frames {
                header.push("frame_range".to_string());
            }
            header.push("meta".to_string());
            header.extend(columns.iter().cloned());
            if self.named {
                header.push("name".to_string());
            }
            table.write_header(header)?;
            self.columns = Some(columns);
        }

        let row_id = table.cursor;
        let frames = Span::widened(open.frame_offset, open.frame_end.unwrap_or(open.frame_offset));
        let mut fields = vec![
            row_id.to_string(),
            Span::widened(open.char_start, tracker.last_char_high()).to_string(),
        ];
        if self.has_frames {
            fields.push(frames.to_string());
        }
        fields.push(Value::Object(meta.clone()).to_string());

        let columns = self.columns.as_deref().unwrap_or(&[]);
        for column in columns {
            let value = others
                .iter()
                .find(|a| a.name.to_lowercase() == *column)
                .map(|a| a.render().trim().to_string())
                .unwrap_or_default();
            fields.push(value);
        }
        for attribute in &others {
            let name = attribute.name.to_lowercase();
            if !columns.contains(&name) && self.dropped.insert(name) {
                tracing::warn!(
                    document = open.id(),
                    attribute = %attribute.name,
                    "document attribute not in the frozen document columns, dropped"
                );
            }
        }

        let meta_name = meta.get("name").map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        // The `name` column falls back to the row id, while frame ranges
        // are keyed by the upstream document id whenever there is one
        if self.named {
            fields.push(meta_name.clone().unwrap_or_else(|| row_id.to_string()));
        }
        table.write_row(fields)?;

        let frame_key = match meta_name {
            Some(name) => name,
            None if !open.id().is_empty() => open.id().to_string(),
            None => row_id.to_string(),
        };
        Ok(open.frame_end.map(|_| (frame_key, frames)))
    }
}

/// A slot declared with `isOptional: false` needs a file name in the `media` meta
fn check_media_slots(open: &OpenDocument, schema: &CorpusSchema) -> Result<()> {
    let media = open
        .attributes()
        .iter()
        .find(|a| a.name == "media")
        .and_then(|a| match &a.value {
            AttributeValue::Meta(m) => Some(m),
            _ => None,
        });
    for (slot, spec) in &schema.meta.media_slots {
        if spec.is_required() && !media.is_some_and(|m| m.contains_key(slot)) {
            return Err(Error::schema(format!(
                "Filename missing for required media '{}' from document {}",
                slot,
                open.id()
            )));
        }
    }
    Ok(())
}
