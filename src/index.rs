//! Local flat inner-product index stored as JSONL (one catalog record plus unit vector per line).

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogRecord;
use crate::retriever::RetrievedItem;

/// Errors surfaced while loading or querying the flat index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index file could not be opened or read.
    #[error("failed to read index {path:?}: {source}")]
    Io {
        /// Index path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A line did not decode as an [`IndexedAssessment`].
    #[error("invalid index record at line {line}: {source}")]
    Record {
        /// 1-based line number.
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Vectors of different sizes were mixed.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension {
        /// Index dimension.
        expected: usize,
        /// Offending vector length.
        got: usize,
    },
    /// The index holds no records.
    #[error("index contains no records")]
    Empty,
}

/// One index row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedAssessment {
    /// Catalog metadata returned with search hits.
    #[serde(flatten)]
    pub record: CatalogRecord,
    /// Unit-length embedding of `record.search_text`.
    pub embedding: Vec<f32>,
}

/// Exhaustive inner-product search over unit vectors, i.e. cosine similarity.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    entries: Vec<IndexedAssessment>,
    dims: usize,
}

impl FlatIndex {
    /// Builds an index, checking that all vectors share one dimension.
    pub fn new(entries: Vec<IndexedAssessment>) -> Result<Self, IndexError> {
        let dims = entries.first().ok_or(IndexError::Empty)?.embedding.len();
        if let Some(bad) = entries.iter().find(|entry| entry.embedding.len() != dims) {
            return Err(IndexError::Dimension {
                expected: dims,
                got: bad.embedding.len(),
            });
        }
        Ok(Self { entries, dims })
    }

    /// Reads a JSONL index file. Blank lines are skipped.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let io_err = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|source| IndexError::Record {
                line: idx + 1,
                source,
            })?;
            entries.push(entry);
        }
        Self::new(entries)
    }

    /// Writes entries as JSONL.
    pub fn write(path: &Path, entries: &[IndexedAssessment]) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)
                .with_context(|| format!("failed to encode index record {}", entry.record.url))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Number of indexed assessments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Rows in insertion order.
    pub fn entries(&self) -> &[IndexedAssessment] {
        &self.entries
    }

    /// Top `k` records by descending inner product. Ties keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedItem>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::Dimension {
                expected: self.dims,
                got: query.len(),
            });
        }
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, dot(query, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(idx, score)| RetrievedItem {
                record: self.entries[idx].record.clone(),
                score,
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
