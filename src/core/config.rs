use std::collections::BTreeMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// When a segment gets a full-text-search vector row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FtsMode {
    Always,        // Every non-empty segment
    FallbackOnly,  // Only segments without dependency edges
    Disabled,
}

/// External reference file backing an aligned entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedEntitySource {
    pub reference: PathBuf,  // Tab-separated, first column is the entity key
    pub contains: String,    // Layer the entity spans (token or segment layer)
}

impl AlignedEntitySource {
    pub fn new(reference: impl Into<PathBuf>, contains: impl Into<String>) -> Self {
        AlignedEntitySource {
            reference: reference.into(),
            contains: contains.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub fts_mode: FtsMode,
    pub write_buffer_size: usize,       // BufWriter capacity per table
    pub reference_cache_size: usize,    // LRU capacity for reference rows
    pub write_manifest: bool,

    // Meta of the all-encompassing document used when no document marker shows up
    pub default_document_meta: Option<Map<String, Value>>,

    // Keyed by lower-cased entity name
    pub aligned_entities: BTreeMap<String, AlignedEntitySource>,
}

impl Config {
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Config {
            output_dir: output_dir.into(),
            ..Config::default()
        }
    }

    pub fn add_aligned_entity(mut self, name: &str, source: AlignedEntitySource) -> Self {
        self.aligned_entities.insert(name.to_lowercase(), source);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: PathBuf::from("./out"),
            fts_mode: FtsMode::Always,
            write_buffer_size: 64 * 1024,   // 64KB per table
            reference_cache_size: 1024,
            write_manifest: true,
            default_document_meta: None,
            aligned_entities: BTreeMap::new(),
        }
    }
}
