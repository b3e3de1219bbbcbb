use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use crc32fast::Hasher;
use crate::core::error::{Error, Result};
use crate::core::stats::TableSummary;
use crate::schema::CorpusSchema;
use crate::storage::layout::OutputLayout;
use crate::storage::table::{escape_field, Table, TableId, TableKind};

/// Arena of every output table of a run, addressed by name or `TableId`
pub struct TableRegistry {
    layout: OutputLayout,
    buffer_size: usize,
    tables: Vec<Table>,
    index: HashMap<String, TableId>,
    finalized: bool,
}

impl TableRegistry {
    pub fn new(layout: OutputLayout, buffer_size: usize) -> Self {
        TableRegistry {
            layout,
            buffer_size,
            tables: Vec::new(),
            index: HashMap::new(),
            finalized: false,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn find(&self, name: &str) -> Option<TableId> {
        self.index.get(name).copied()
    }

    pub fn get_or_create(&mut self, name: &str) -> Result<TableId> {
        self.get_or_create_kind(name, || TableKind::Plain)
    }

    /// Lookup table `{owner}_{attribute}` with its `(id, text)` header
    pub fn get_or_create_lookup(&mut self, owner: &str, attribute: &str) -> Result<TableId> {
        let name = format!("{}_{}", owner, attribute).to_lowercase();
        let id = self.get_or_create_kind(&name, || TableKind::Lookup {
            interned: HashMap::new(),
        })?;
        let table = &mut self.tables[id.0];
        if !table.is_lookup() {
            return Err(Error::invalid_state(format!(
                "Table '{}' already exists and is not a lookup table",
                name
            )));
        }
        if !table.is_frozen() {
            let attribute = attribute.to_lowercase();
            table.write_header(vec![format!("{}_id", attribute), attribute])?;
        }
        Ok(id)
    }

    fn get_or_create_kind(&mut self, name: &str, kind: impl FnOnce() -> TableKind) -> Result<TableId> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        if self.finalized {
            return Err(Error::invalid_state(format!(
                "Table '{}' requested after finalization",
                name
            )));
        }
        let path = self.layout.table_path(name);
        let table = Table::create(name, path, self.buffer_size, kind())?;
        let id = TableId(self.tables.len());
        self.tables.push(table);
        self.index.insert(name.to_string(), id);
        tracing::debug!(table = name, "table created");
        Ok(id)
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0]
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// End-of-stream pass, run once:
    /// 1. close every table
    /// 2. write `{table}_labels.csv` side tables and pad label columns
    /// 3. fold observed categorical values and label counts into the schema
    pub fn finalize(&mut self, schema: &mut CorpusSchema) -> Result<Vec<TableSummary>> {
        if self.finalized {
            return Err(Error::invalid_state("Tables were already finalized".to_string()));
        }
        self.finalized = true;

        for table in &mut self.tables {
            table.close()?;
            if table.labels.is_empty() {
                continue;
            }
            write_label_side_table(&self.layout.labels_path(&table.name), table)?;
            let layer = table.layer.clone().unwrap_or_else(|| table.name.clone());
            if let Some(spec) = schema.layer_ci_mut(&layer) {
                spec.nlabels = Some(table.labels.len());
            }
            table.pad_label_columns()?;
        }

        for table in &self.tables {
            let Some(layer) = &table.layer else {
                continue;
            };
            for (attribute, values) in &table.categorical_values {
                schema.record_categorical_values(layer, attribute, values);
            }
        }

        let mut summaries = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            summaries.push(TableSummary {
                name: table.name.clone(),
                file: table
                    .path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                rows: table.rows(),
                columns: table.columns().to_vec(),
                nlabels: (!table.labels.is_empty()).then(|| table.labels.len()),
                checksum: file_checksum(&table.path)?,
            });
        }
        tracing::debug!(tables = summaries.len(), "tables finalized");
        Ok(summaries)
    }
}

fn write_label_side_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "bit\tlabel")?;
    for (bit, label) in table.labels.entries() {
        writeln!(writer, "{}\t{}", bit, escape_field(label))?;
    }
    writer.flush()?;
    Ok(())
}

fn file_checksum(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}
