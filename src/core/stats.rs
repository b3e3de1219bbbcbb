use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::core::types::Span;

/// Summary of one verticalization run, written as `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    // Stream counts
    pub documents: u64,
    pub segments: u64,
    pub tokens: u64,

    // Dependency trees
    pub dependency_trees: u64,
    pub dependency_anomalies: u64,

    // Document name -> global frame range, for time-anchored corpora
    pub document_frames: BTreeMap<String, Span>,

    // `table.attribute` names first seen after their table froze
    #[serde(default)]
    pub dropped_attributes: BTreeSet<String>,

    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub file: String,
    pub rows: u64,
    pub columns: Vec<String>,
    pub nlabels: Option<usize>,
    pub checksum: u32,   // CRC32 of the finalized file
}

impl RunSummary {
    pub fn table(&self, name: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}
