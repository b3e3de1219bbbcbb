use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use lru::LruCache;
use crate::core::error::{Error, ErrorKind, Result};

/// Tab-separated file describing aligned entities, keyed by its first column.
///
/// The file is scanned once to index key -> byte offset; rows are read back
/// on demand and kept in a small LRU because the same entity is often
/// referenced again a few segments later.
pub struct ReferenceFile {
    pub path: PathBuf,
    pub columns: Vec<String>,   // Header without the key column
    offsets: HashMap<String, u64>,
    reader: BufReader<File>,
    cache: LruCache<String, Vec<String>>,
}

impl ReferenceFile {
    pub fn open(path: &Path, cache_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::new(ErrorKind::Io, format!("Cannot open reference file {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::new(file);

        let mut header = String::new();
        let mut offset = reader.read_line(&mut header)? as u64;
        let columns: Vec<String> = strip_eol(&header)
            .split('\t')
            .skip(1)
            .map(|c| c.trim().to_string())
            .collect();

        // First occurrence of a key wins
        let mut offsets = HashMap::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let key = strip_eol(&line).split('\t').next().unwrap_or("").trim();
            if !key.is_empty() {
                offsets.entry(key.to_string()).or_insert(offset);
            }
            offset += n as u64;
        }

        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(ReferenceFile {
            path: path.to_path_buf(),
            columns,
            offsets,
            reader,
            cache: LruCache::new(capacity),
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }

    /// Trimmed values of the non-key columns of `key`
    pub fn row(&mut self, key: &str) -> Result<Option<Vec<String>>> {
        if let Some(row) = self.cache.get(key) {
            return Ok(Some(row.clone()));
        }
        let Some(&offset) = self.offsets.get(key) else {
            return Ok(None);
        };
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        let row: Vec<String> = strip_eol(&line)
            .split('\t')
            .skip(1)
            .map(|v| v.trim().to_string())
            .collect();
        self.cache.put(key.to_string(), row.clone());
        Ok(Some(row))
    }
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reference(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn indexes_keys_and_reads_rows() {
        let f = reference("id\tkind\twikidata\nE1\tPER\tQ1\nE2\t LOC \tQ2\r\nE1\tORG\tQ9\n");
        let mut refs = ReferenceFile::open(f.path(), 2).unwrap();
        assert_eq!(refs.columns, vec!["kind", "wikidata"]);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.row("E2").unwrap(), Some(vec!["LOC".to_string(), "Q2".to_string()]));
        assert_eq!(refs.row("E1").unwrap(), Some(vec!["PER".to_string(), "Q1".to_string()]));
        // Served from the cache the second time
        assert_eq!(refs.row("E2").unwrap().unwrap()[0], "LOC");
        assert_eq!(refs.row("E3").unwrap(), None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ReferenceFile::open(Path::new("/nonexistent/entities.tsv"), 4)
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
