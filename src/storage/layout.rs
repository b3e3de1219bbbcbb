use std::path::{Path, PathBuf};
use std::fs;
use crate::core::error::Result;

/// Directory structure for output tables
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub base_dir: PathBuf,   // Every table lands directly here
}

impl OutputLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(OutputLayout { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.base_dir.join(format!("{}.csv", table))
    }

    pub fn labels_path(&self, table: &str) -> PathBuf {
        self.base_dir.join(format!("{}_labels.csv", table))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base_dir.join("manifest.json")
    }
}
