use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::labels::{pad_bits, LabelVocabulary};

/// Stable handle into the table registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub usize);

#[derive(Debug)]
pub enum TableKind {
    Plain,
    Lookup {
        interned: HashMap<String, u64>,   // Grows with vocabulary, not rows
    },
}

/// Append-only tab-separated output table.
///
/// The first line is the header; the column set is frozen by it and every
/// later row has exactly that many fields (short rows are padded).
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub path: PathBuf,
    pub layer: Option<String>,     // Schema layer realized by this table
    pub cursor: u64,               // Next row id, starts at 1
    pub categorical_values: BTreeMap<String, BTreeSet<String>>,
    pub labels: LabelVocabulary,
    columns: Option<Vec<String>>,
    label_columns: Vec<usize>,
    sink: Option<BufWriter<File>>,
    kind: TableKind,
}

impl Table {
    pub fn create(name: &str, path: PathBuf, buffer_size: usize, kind: TableKind) -> Result<Self> {
        let file = File::create(&path)?;

        Ok(Table {
            name: name.to_string(),
            path,
            layer: None,
            cursor: 1,
            categorical_values: BTreeMap::new(),
            labels: LabelVocabulary::new(),
            columns: None,
            label_columns: Vec::new(),
            sink: Some(BufWriter::with_capacity(buffer_size, file)),
            kind,
        })
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self.kind, TableKind::Lookup { .. })
    }

    pub fn is_frozen(&self) -> bool {
        self.columns.is_some()
    }

    pub fn columns(&self) -> &[String] {
        self.columns.as_deref().unwrap_or(&[])
    }

    pub fn label_columns(&self) -> &[usize] {
        &self.label_columns
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.cursor - 1
    }

    pub fn write_header(&mut self, columns: Vec<String>) -> Result<()> {
        self.freeze(columns, Vec::new())
    }

    /// Write the header and remember which columns hold label bitstrings
    pub fn freeze(&mut self, columns: Vec<String>, label_columns: Vec<usize>) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::invalid_state(format!(
                "Schema of table '{}' is already frozen",
                self.name
            )));
        }
        if let Some(&bad) = label_columns.iter().find(|&&i| i >= columns.len()) {
            return Err(Error::invalid_state(format!(
                "Label column {} out of bounds for table '{}'",
                bad, self.name
            )));
        }
        self.write_line(&columns)?;
        tracing::debug!(table = %self.name, columns = columns.len(), "table schema frozen");
        self.columns = Some(columns);
        self.label_columns = label_columns;
        Ok(())
    }

    /// Append a row and return its id
    pub fn write_row(&mut self, mut fields: Vec<String>) -> Result<u64> {
        let width = match &self.columns {
            Some(columns) => columns.len(),
            None => {
                return Err(Error::invalid_state(format!(
                    "Row written to table '{}' before its header",
                    self.name
                )))
            }
        };
        if fields.len() > width {
            return Err(Error::invalid_state(format!(
                "Row of {} fields exceeds the {} columns of table '{}'",
                fields.len(),
                width,
                self.name
            )));
        }
        fields.resize(width, String::new());
        self.write_line(&fields)?;
        let id = self.cursor;
        self.cursor += 1;
        Ok(id)
    }

    /// Interned id of `value`, appending `(id, value)` the first time it is seen
    pub fn get_id(&mut self, value: &str) -> Result<u64> {
        let known = match &self.kind {
            TableKind::Lookup { interned } => interned.get(value).copied(),
            TableKind::Plain => {
                return Err(Error::invalid_state(format!(
                    "Table '{}' is not a lookup table",
                    self.name
                )))
            }
        };
        if let Some(id) = known {
            return Ok(id);
        }
        let id = self.write_row(vec![self.cursor.to_string(), value.to_string()])?;
        if let TableKind::Lookup { interned } = &mut self.kind {
            interned.insert(value.to_string(), id);
        }
        Ok(id)
    }

    pub fn record_categorical(&mut self, attribute: &str, value: &str) {
        self.categorical_values
            .entry(attribute.to_string())
            .or_default()
            .insert(value.to_string());
    }

    /// Bitstring for a comma-separated label list, against this table's vocabulary
    pub fn encode_labels(&mut self, raw: &str) -> String {
        self.labels.encode(raw)
    }

    /// Flush and release the file handle
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Second pass: left-pad every label column to the final vocabulary width.
    /// The rewritten file replaces the original through an atomic rename.
    pub fn pad_label_columns(&mut self) -> Result<()> {
        if self.label_columns.is_empty() || self.labels.is_empty() {
            return Ok(());
        }
        self.close()?;
        let width = self.labels.len();
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut output = NamedTempFile::new_in(dir)?;
        {
            let input = BufReader::new(File::open(&self.path)?);
            let mut writer = BufWriter::new(output.as_file_mut());
            for (n, line) in input.lines().enumerate() {
                let line = line?;
                if n == 0 {
                    writeln!(writer, "{}", line)?;
                    continue;
                }
                let mut fields: Vec<String> = line.split('\t').map(str::to_string).collect();
                for &col in &self.label_columns {
                    if let Some(bits) = fields.get_mut(col) {
                        if !bits.is_empty() {
                            *bits = pad_bits(bits, width);
                        }
                    }
                }
                writeln!(writer, "{}", fields.join("\t"))?;
            }
            writer.flush()?;
        }
        output.persist(&self.path)?;
        tracing::debug!(table = %self.name, nlabels = width, "label columns padded");
        Ok(())
    }

    fn write_line(&mut self, fields: &[String]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            Error::new(ErrorKind::InvalidState, format!("Table '{}' is closed", self.name))
        })?;
        let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        sink.write_all(line.join("\t").as_bytes())?;
        sink.write_all(b"\n")?;
        Ok(())
    }
}

/// PostgreSQL COPY text escaping
pub fn escape_field(value: &str) -> String {
    if !value.contains(['\\', '\t', '\n', '\r']) {
        return value.to_string();
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}
