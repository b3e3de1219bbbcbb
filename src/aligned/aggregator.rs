use std::collections::{BTreeMap, HashMap};
use crate::aligned::reference::ReferenceFile;
use crate::core::config::AlignedEntitySource;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Span;
use crate::model::Attribute;
use crate::range::RangeTracker;
use crate::schema::{AttributeType, CorpusSchema};
use crate::storage::{TableId, TableRegistry};

/// Placeholder key meaning "no entity here"
const EMPTY_KEY: &str = "_";

#[derive(Debug, Clone)]
enum EntityColumn {
    Text { lookup: TableId },
    Labels,
    Categorical { attribute: String },
    Plain,
}

#[derive(Debug, Clone)]
struct OpenEntity {
    key: String,
    fields: Vec<String>,
    char_start: u64,
    frame_start: u64,
}

/// Output state of one aligned entity type
struct EntityTable {
    name: String,
    table: TableId,
    columns: Vec<EntityColumn>,
    has_frames: bool,
    reference: ReferenceFile,
    open: Option<OpenEntity>,
}

/// Collapses runs of tokens or segments that reference the same aligned
/// entity into one row spanning the whole run.
pub struct SpanAggregator {
    sources: BTreeMap<String, AlignedEntitySource>,
    entities: HashMap<String, EntityTable>,
    cache_size: usize,
    pub rows: u64,
}

impl SpanAggregator {
    pub fn new(sources: BTreeMap<String, AlignedEntitySource>, cache_size: usize) -> Self {
        let sources = sources
            .into_iter()
            .map(|(name, source)| (name.to_lowercase(), source))
            .collect();
        SpanAggregator {
            sources,
            entities: HashMap::new(),
            cache_size,
            rows: 0,
        }
    }

    pub fn is_aligned(&self, attribute: &str) -> bool {
        self.sources.contains_key(&attribute.to_lowercase())
    }

    /// Entity names whose runs are made of units of `layer`
    pub fn names_contained_in(&self, layer: &str) -> Vec<String> {
        let layer = layer.to_lowercase();
        self.sources
            .iter()
            .filter(|(_, s)| s.contains.to_lowercase() == layer)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Feed one occurrence of a foreign-key attribute.
    ///
    /// The same key as the open entity only extends it; any other key closes
    /// the open entity and opens the new one at the current cursor.
    pub fn observe(
        &mut self,
        attribute: &Attribute,
        registry: &mut TableRegistry,
        schema: &CorpusSchema,
        tracker: &RangeTracker,
    ) -> Result<()> {
        let name = attribute.name.to_lowercase();
        let fk = attribute
            .as_text()
            .ok_or_else(|| {
                Error::type_mismatch(format!(
                    "Foreign key '{}' should be a simple text",
                    attribute.name
                ))
            })?
            .trim();

        self.ensure_entity(&name, registry, schema)?;
        let Some(entity) = self.entities.get_mut(&name) else {
            return Ok(());
        };
        if entity.open.as_ref().is_some_and(|e| e.key == fk) {
            return Ok(());
        }

        if close_entity(entity, registry, tracker)? {
            self.rows += 1;
        }
        if fk.is_empty() || fk == EMPTY_KEY {
            return Ok(());
        }
        open_entity(entity, fk, registry, tracker)
    }

    /// Close the open entity of type `name`, if any
    pub fn close(&mut self, name: &str, registry: &mut TableRegistry, tracker: &RangeTracker) -> Result<()> {
        if let Some(entity) = self.entities.get_mut(&name.to_lowercase()) {
            if close_entity(entity, registry, tracker)? {
                self.rows += 1;
            }
        }
        Ok(())
    }

    pub fn close_all(&mut self, registry: &mut TableRegistry, tracker: &RangeTracker) -> Result<()> {
        let names: Vec<String> = self.sources.keys().cloned().collect();
        for name in names {
            self.close(&name, registry, tracker)?;
        }
        Ok(())
    }

    /// Create the entity table on first reference
    fn ensure_entity(&mut self, name: &str, registry: &mut TableRegistry, schema: &CorpusSchema) -> Result<()> {
        if self.entities.contains_key(name) {
            return Ok(());
        }
        let source = self.sources.get(name).ok_or_else(|| {
            Error::schema(format!("'{}' is not a declared aligned entity", name))
        })?;
        let reference = ReferenceFile::open(&source.reference, self.cache_size)?;
        let layer_name = schema.layer_name(name).map(str::to_string);
        let layer = layer_name.as_deref().and_then(|l| schema.layer.get(l));
        let has_frames = schema.is_time_anchored(&source.contains);

        let mut header = vec![format!("{}_id", name)];
        let mut columns = Vec::with_capacity(reference.columns.len());
        let mut label_columns = Vec::new();
        for column in &reference.columns {
            let (attribute, spec) = layer
                .and_then(|l| l.attribute_for_column(column))
                .ok_or_else(|| {
                    Error::schema(format!("Attribute {} not found for entity {}", column, name))
                })?;
            let kind = match spec.kind {
                Some(AttributeType::Text) => {
                    header.push(format!("{}_id", column.to_lowercase()));
                    let lookup = registry.get_or_create_lookup(name, &column.to_lowercase())?;
                    EntityColumn::Text { lookup }
                }
                Some(AttributeType::Labels) => {
                    label_columns.push(header.len());
                    header.push(column.clone());
                    EntityColumn::Labels
                }
                Some(AttributeType::Categorical) => {
                    header.push(column.clone());
                    EntityColumn::Categorical { attribute: attribute.clone() }
                }
                _ => {
                    header.push(column.clone());
                    EntityColumn::Plain
                }
            };
            columns.push(kind);
        }
        header.push("char_range".to_string());
        if has_frames {
            header.push("frame_range".to_string());
        }

        let table = registry.get_or_create(name)?;
        let out = registry.table_mut(table);
        out.layer = layer_name;
        out.freeze(header, label_columns)?;

        self.entities.insert(
            name.to_string(),
            EntityTable {
                name: name.to_string(),
                table,
                columns,
                has_frames,
                reference,
                open: None,
            },
        );
        Ok(())
    }
}

fn open_entity(
    entity: &mut EntityTable,
    key: &str,
    registry: &mut TableRegistry,
    tracker: &RangeTracker,
) -> Result<()> {
    let row = entity.reference.row(key)?.ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!(
                "Entity '{}' not found in reference file {} of '{}'",
                key,
                entity.reference.path.display(),
                entity.name
            ),
        )
    })?;

    let mut fields = Vec::with_capacity(entity.columns.len());
    for (n, column) in entity.columns.iter().enumerate() {
        let value = row.get(n).map(String::as_str).unwrap_or("");
        let field = match column {
            EntityColumn::Text { lookup } if !value.is_empty() => {
                registry.table_mut(*lookup).get_id(value)?.to_string()
            }
            EntityColumn::Text { .. } => String::new(),
            EntityColumn::Labels => registry.table_mut(entity.table).encode_labels(value),
            EntityColumn::Categorical { attribute } => {
                registry.table_mut(entity.table).record_categorical(attribute, value);
                value.to_string()
            }
            EntityColumn::Plain => value.to_string(),
        };
        fields.push(field);
    }

    entity.open = Some(OpenEntity {
        key: key.to_string(),
        fields,
        char_start: tracker.char_cursor(),
        frame_start: tracker.frame_cursor(),
    });
    Ok(())
}

/// Write the open entity, ending just before the current cursor
fn close_entity(entity: &mut EntityTable, registry: &mut TableRegistry, tracker: &RangeTracker) -> Result<bool> {
    let Some(open) = entity.open.take() else {
        return Ok(false);
    };
    let table = registry.table_mut(entity.table);
    let mut row = Vec::with_capacity(open.fields.len() + 3);
    row.push(table.cursor.to_string());
    row.extend(open.fields);
    row.push(Span::widened(open.char_start, tracker.last_char_high()).to_string());
    if entity.has_frames {
        row.push(tracker.frame_span_since(open.frame_start).to_string());
    }
    table.write_row(row)?;
    Ok(true)
}
