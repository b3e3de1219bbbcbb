use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use chrono::Utc;
use crate::aligned::SpanAggregator;
use crate::core::config::{Config, FtsMode};
use crate::core::error::{Error, Result};
use crate::core::stats::RunSummary;
use crate::core::types::Span;
use crate::deps::{DependencyLinearizer, DependencyRow, DEPENDENCY_COLUMNS};
use crate::model::{Attribute, AttributeValue, Document, Record, Segment, Token};
use crate::range::RangeTracker;
use crate::schema::{AttributeType, CorpusSchema};
use crate::storage::{OutputLayout, TableId, TableRegistry};
use crate::writer::document::{DocumentWriter, OpenDocument};
use crate::writer::token_schema::{ColumnKind, TokenSchema};

const FTS_TABLE: &str = "fts_vector";

/// Lower-cased first-class table names
#[derive(Debug, Clone)]
pub struct TableNames {
    pub document: String,
    pub segment: String,
    pub token: String,
}

#[derive(Debug, Clone)]
struct SegmentColumn {
    attribute: String,
    labels: bool,
}

struct DependencyRelation {
    table: TableId,
    linearizer: DependencyLinearizer,
}

/// Per-segment scratch state
#[derive(Debug, Default)]
struct SegmentProgress {
    frame_start: Option<u64>,
    has_edges: bool,
}

/// Single-pass verticalization of a record stream into output tables.
///
/// Records are consumed in order; every cursor (characters, frames, row ids,
/// dependency anchors) is shared across the whole run, so a `Verticalizer`
/// handles exactly one stream and is finished once.
pub struct Verticalizer {
    schema: CorpusSchema,
    config: Config,
    names: TableNames,
    registry: TableRegistry,
    tracker: RangeTracker,
    aggregator: SpanAggregator,
    token_aligned: Vec<String>,
    segment_aligned: Vec<String>,

    // First-class tables
    token_table: TableId,
    segment_table: TableId,
    fts_table: Option<TableId>,
    documents: DocumentWriter,

    // Frozen on the first non-empty segment
    token_schema: Option<TokenSchema>,
    segment_columns: Option<Vec<SegmentColumn>>,
    relations: Vec<DependencyRelation>,

    current: Option<OpenDocument>,
    summary: RunSummary,
    finished: bool,
}

impl Verticalizer {
    pub fn new(schema: CorpusSchema, config: Config) -> Result<Self> {
        let names = TableNames {
            document: schema.first_class.document.to_lowercase(),
            segment: schema.first_class.segment.to_lowercase(),
            token: schema.first_class.token.to_lowercase(),
        };
        let layout = OutputLayout::new(config.output_dir.clone())?;
        let mut registry = TableRegistry::new(layout, config.write_buffer_size);

        let document_table = registry.get_or_create(&names.document)?;
        let segment_table = registry.get_or_create(&names.segment)?;
        let token_table = registry.get_or_create(&names.token)?;
        registry.table_mut(document_table).layer = Some(schema.first_class.document.clone());
        registry.table_mut(segment_table).layer = Some(schema.first_class.segment.clone());
        registry.table_mut(token_table).layer = Some(schema.first_class.token.clone());

        let aggregator = SpanAggregator::new(config.aligned_entities.clone(), config.reference_cache_size);
        let segment_aligned = aggregator.names_contained_in(&names.segment);
        let token_aligned = config
            .aligned_entities
            .keys()
            .map(|name| name.to_lowercase())
            .filter(|name| !segment_aligned.contains(name))
            .collect();

        let now = Utc::now();
        Ok(Verticalizer {
            schema,
            config,
            names,
            registry,
            tracker: RangeTracker::new(),
            aggregator,
            token_aligned,
            segment_aligned,
            token_table,
            segment_table,
            fts_table: None,
            documents: DocumentWriter::new(document_table),
            token_schema: None,
            segment_columns: None,
            relations: Vec::new(),
            current: None,
            summary: RunSummary {
                started_at: now,
                finished_at: now,
                documents: 0,
                segments: 0,
                tokens: 0,
                dependency_trees: 0,
                dependency_anomalies: 0,
                document_frames: BTreeMap::new(),
                dropped_attributes: BTreeSet::new(),
                tables: Vec::new(),
            },
            finished: false,
        })
    }

    pub fn schema(&self) -> &CorpusSchema {
        &self.schema
    }

    /// Schema with the categorical values and label counts observed by the run
    pub fn into_schema(self) -> CorpusSchema {
        self.schema
    }

    pub fn names(&self) -> &TableNames {
        &self.names
    }

    /// Drive a whole record stream and finalize the output
    pub fn run<I>(&mut self, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        tracing::info!(
            output = %self.config.output_dir.display(),
            aligned = self.config.aligned_entities.len(),
            "verticalization started"
        );
        for record in records {
            self.push(record?)?;
        }
        self.finish()
    }

    /// Feed one record
    pub fn push(&mut self, record: Record) -> Result<()> {
        if self.finished {
            return Err(Error::invalid_state("Record pushed after the run finished".to_string()));
        }
        if let Some(document) = &record.document {
            if !self.current.as_ref().is_some_and(|open| open.is(document)) {
                self.open_document(Some(document.clone()))?;
            }
        }
        let Some(segment) = record.segment else {
            return Ok(());
        };
        if segment.is_empty() {
            tracing::debug!(segment = %segment.id, "empty segment skipped");
            return Ok(());
        }
        if self.current.is_none() {
            self.open_document(None)?;
        }
        self.write_segment(&segment)
    }

    /// Flush pending trees and entities, write the last document and
    /// finalize every table
    pub fn finish(&mut self) -> Result<RunSummary> {
        if self.finished {
            return Err(Error::invalid_state("Verticalization already finished".to_string()));
        }
        self.finished = true;

        for relation in &mut self.relations {
            let rows = relation.linearizer.finish();
            write_dependency_rows(&mut self.registry, relation.table, rows)?;
            self.summary.dependency_trees += relation.linearizer.trees;
            self.summary.dependency_anomalies += relation.linearizer.anomalies;
        }
        self.aggregator.close_all(&mut self.registry, &self.tracker)?;

        // No document marker in the whole stream: one document spans everything
        if self.current.is_none() {
            self.current = Some(OpenDocument::open(None, &self.tracker));
        }
        self.close_document()?;

        self.summary.tables = self.registry.finalize(&mut self.schema)?;
        self.summary.finished_at = Utc::now();
        if self.config.write_manifest {
            self.summary.save(&self.registry.layout().manifest_path())?;
        }
        tracing::info!(
            documents = self.summary.documents,
            segments = self.summary.segments,
            tokens = self.summary.tokens,
            trees = self.summary.dependency_trees,
            anomalies = self.summary.dependency_anomalies,
            aligned_rows = self.aggregator.rows,
            "verticalization finished"
        );
        Ok(self.summary.clone())
    }

    fn open_document(&mut self, document: Option<Arc<Document>>) -> Result<()> {
        self.close_document()?;
        self.current = Some(OpenDocument::open(document, &self.tracker));
        Ok(())
    }

    fn close_document(&mut self) -> Result<()> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        // A document without tokens still gets a position no other document shares
        if self.tracker.is_empty_since(open.char_start) {
            self.tracker.claim_empty();
        }
        let frames_enabled = self.token_schema.as_ref().is_some_and(|ts| ts.has_frames);
        let frames = self.documents.write(
            &open,
            &mut self.registry,
            &self.tracker,
            &self.schema,
            frames_enabled,
            self.config.default_document_meta.as_ref(),
        )?;
        if let Some((name, span)) = frames {
            self.summary.document_frames.insert(name, span);
        }
        self.summary.documents += 1;
        Ok(())
    }

    fn write_segment(&mut self, segment: &Segment) -> Result<()> {
        let char_start = self.tracker.char_cursor();

        // Segment-level entities open before the tokens move the cursor
        for name in &self.segment_aligned {
            match find_ci(&segment.attributes, name) {
                Some(attribute) => {
                    self.aggregator
                        .observe(attribute, &mut self.registry, &self.schema, &self.tracker)?
                }
                None => self.aggregator.close(name, &mut self.registry, &self.tracker)?,
            }
        }

        if self.token_schema.is_none() {
            self.freeze_token_schema(segment)?;
        }

        let mut progress = SegmentProgress::default();
        for token in &segment.tokens {
            self.write_token(segment, token, &mut progress)?;
        }

        self.write_segment_row(segment, char_start, &progress)?;
        self.write_fts(segment, &progress)?;
        self.summary.segments += 1;
        Ok(())
    }

    fn freeze_token_schema(&mut self, segment: &Segment) -> Result<()> {
        let token_schema = TokenSchema::freeze(
            segment,
            &self.schema.first_class.token,
            &self.schema,
            &self.token_aligned,
            &mut self.registry,
        )?;
        for name in &token_schema.relations {
            let table = self.registry.get_or_create(&name.to_lowercase())?;
            let out = self.registry.table_mut(table);
            if !out.is_frozen() {
                out.write_header(DEPENDENCY_COLUMNS.iter().map(|c| c.to_string()).collect())?;
            }
            self.relations.push(DependencyRelation {
                table,
                linearizer: DependencyLinearizer::new(name),
            });
        }
        let (header, label_columns) = token_schema.header(&self.names.token, &self.names.segment);
        self.registry.table_mut(self.token_table).freeze(header, label_columns)?;
        tracing::debug!(
            columns = token_schema.columns.len(),
            relations = token_schema.relations.len(),
            frames = token_schema.has_frames,
            "token schema frozen"
        );
        self.token_schema = Some(token_schema);
        Ok(())
    }

    fn write_token(&mut self, segment: &Segment, token: &Token, progress: &mut SegmentProgress) -> Result<()> {
        let Some(token_schema) = self.token_schema.as_ref() else {
            return Err(Error::invalid_state("Token written before the token schema froze".to_string()));
        };
        let row_id = self.registry.table(self.token_table).cursor;
        let mut fields = Vec::with_capacity(token_schema.columns.len() + 4);
        fields.push(row_id.to_string());

        for column in &token_schema.columns {
            let attribute = token.attribute(&column.attribute);
            match (&column.kind, attribute) {
                (ColumnKind::Relation { .. }, None) => {}
                (_, None) => fields.push(String::new()),
                (ColumnKind::Categorical, Some(attribute)) => {
                    let value = attribute.render();
                    self.registry
                        .table_mut(self.token_table)
                        .record_categorical(&column.attribute, &value);
                    fields.push(value);
                }
                (ColumnKind::Labels, Some(attribute)) => {
                    let bits = self.registry.table_mut(self.token_table).encode_labels(&attribute.render());
                    fields.push(bits);
                }
                (ColumnKind::Lookup { table }, Some(attribute)) => {
                    let value = attribute.render();
                    if value.is_empty() {
                        fields.push(String::new());
                    } else {
                        fields.push(self.registry.table_mut(*table).get_id(&value)?.to_string());
                    }
                }
                (ColumnKind::Relation { relation }, Some(attribute)) => {
                    let AttributeValue::Dependency { head, label } = &attribute.value else {
                        return Err(Error::type_mismatch(format!(
                            "Attribute '{}' of token '{}' should be a dependency",
                            attribute.name, token.id
                        )));
                    };
                    let relation = &mut self.relations[*relation];
                    let rows = relation
                        .linearizer
                        .observe(&segment.id, &token.id, head.as_deref(), label, row_id);
                    write_dependency_rows(&mut self.registry, relation.table, rows)?;
                    progress.has_edges = true;
                }
            }
        }

        for attribute in &token.attributes {
            if attribute.is_null()
                || token_schema.contains(&attribute.name)
                || self.token_aligned.contains(&attribute.name.to_lowercase())
            {
                continue;
            }
            let key = format!("{}.{}", self.names.token, attribute.name);
            if self.summary.dropped_attributes.insert(key) {
                tracing::warn!(
                    attribute = %attribute.name,
                    segment = %segment.id,
                    "token attribute not in the frozen token schema, dropped"
                );
            }
        }

        // Entities open at, and close just before, this token's start
        for name in &self.token_aligned {
            match find_ci(&token.attributes, name) {
                Some(attribute) => {
                    self.aggregator
                        .observe(attribute, &mut self.registry, &self.schema, &self.tracker)?
                }
                None => self.aggregator.close(name, &mut self.registry, &self.tracker)?,
            }
        }

        let form = token.attribute("form").ok_or_else(|| {
            Error::schema(format!("Token '{}' of segment '{}' has no form", token.id, segment.id))
        })?;
        let length = form.render().chars().count() as u64;
        let span = self.tracker.advance_char(length, token.space_after);
        fields.push(span.to_string());

        let frames = match (token.frame_range, self.current.as_mut()) {
            (Some(local), Some(document)) => {
                let frames = self.tracker.advance_frame(local, document.frame_offset);
                document.track_frames(frames.high);
                progress.frame_start.get_or_insert(frames.low);
                Some(frames)
            }
            _ => None,
        };
        if token_schema.has_frames {
            fields.push(frames.map(|f| f.to_string()).unwrap_or_default());
        }
        fields.push(segment.id.clone());

        self.registry.table_mut(self.token_table).write_row(fields)?;
        self.summary.tokens += 1;
        Ok(())
    }

    fn freeze_segment_columns(&mut self, segment: &Segment, has_frames: bool) -> Result<()> {
        let mut columns = Vec::new();
        for attribute in &segment.attributes {
            if self.segment_aligned.contains(&attribute.name.to_lowercase()) {
                continue;
            }
            let labels = self
                .schema
                .attribute(&self.schema.first_class.segment, &attribute.name)
                .is_some_and(|spec| spec.is(AttributeType::Labels));
            columns.push(SegmentColumn {
                attribute: attribute.name.clone(),
                labels,
            });
        }

        let mut header = vec![format!("{}_id", self.names.segment), "char_range".to_string()];
        if has_frames {
            header.push("frame_range".to_string());
        }
        let mut label_columns = Vec::new();
        for column in &columns {
            if column.labels {
                label_columns.push(header.len());
            }
            header.push(column.attribute.clone());
        }
        self.registry.table_mut(self.segment_table).freeze(header, label_columns)?;
        self.segment_columns = Some(columns);
        Ok(())
    }

    fn write_segment_row(&mut self, segment: &Segment, char_start: u64, progress: &SegmentProgress) -> Result<()> {
        let has_frames = self.token_schema.as_ref().is_some_and(|ts| ts.has_frames);
        if self.segment_columns.is_none() {
            self.freeze_segment_columns(segment, has_frames)?;
        }
        let columns = self.segment_columns.as_deref().unwrap_or(&[]);
        let table = self.registry.table_mut(self.segment_table);

        let mut fields = vec![segment.id.clone(), self.tracker.char_span_since(char_start).to_string()];
        if has_frames {
            let frames = progress
                .frame_start
                .map(|start| Span::widened(start, self.tracker.frame_cursor()).to_string());
            fields.push(frames.unwrap_or_default());
        }
        for column in columns {
            let Some(attribute) = segment.attribute(&column.attribute) else {
                fields.push(String::new());
                continue;
            };
            let value = attribute.render();
            if column.labels {
                fields.push(table.encode_labels(&value));
                continue;
            }
            if matches!(attribute.value, AttributeValue::Categorical(_) | AttributeValue::Text(_)) {
                table.record_categorical(&column.attribute, &value);
            }
            fields.push(value);
        }
        table.write_row(fields)?;

        for attribute in &segment.attributes {
            if attribute.is_null()
                || columns.iter().any(|c| c.attribute == attribute.name)
                || self.segment_aligned.contains(&attribute.name.to_lowercase())
            {
                continue;
            }
            let key = format!("{}.{}", self.names.segment, attribute.name);
            if self.summary.dropped_attributes.insert(key) {
                tracing::warn!(
                    attribute = %attribute.name,
                    segment = %segment.id,
                    "segment attribute not in the frozen segment columns, dropped"
                );
            }
        }
        Ok(())
    }

    fn write_fts(&mut self, segment: &Segment, progress: &SegmentProgress) -> Result<()> {
        let enabled = match self.config.fts_mode {
            FtsMode::Always => true,
            FtsMode::FallbackOnly => !progress.has_edges,
            FtsMode::Disabled => false,
        };
        let Some(token_schema) = self.token_schema.as_ref().filter(|_| enabled) else {
            return Ok(());
        };

        let table = match self.fts_table {
            Some(table) => table,
            None => {
                let table = self.registry.get_or_create(FTS_TABLE)?;
                self.registry
                    .table_mut(table)
                    .write_header(vec![format!("{}_id", self.names.segment), "vector".to_string()])?;
                self.fts_table = Some(table);
                table
            }
        };
        let vector = token_schema.fts.build(segment);
        self.registry.table_mut(table).write_row(vec![segment.id.clone(), vector])?;
        Ok(())
    }
}

fn find_ci<'a>(attributes: &'a [Attribute], lower_name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name.to_lowercase() == lower_name)
}

fn write_dependency_rows(registry: &mut TableRegistry, table: TableId, rows: Vec<DependencyRow>) -> Result<()> {
    let table = registry.table_mut(table);
    for row in rows {
        table.write_row(row.into_fields())?;
    }
    Ok(())
}
