//! Index ownership and persistence
//!
//! `SharedIndex` hands out `Arc` snapshots of the active index; a reload swaps
//! in a whole new index and never touches the one readers are holding.
//! `IndexSnapshot` persists a built index as Zstd-compressed bincode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::entry::ReferenceEntry;
use super::index::{IndexBuilder, Metric, ReferenceIndex};
use crate::error::{ClassifyError, Result};

const SNAPSHOT_VERSION: u32 = 1;

/// Holder of the active index, swappable as a whole
#[derive(Debug)]
pub struct SharedIndex {
    current: RwLock<Arc<ReferenceIndex>>,
}

impl SharedIndex {
    pub fn new(index: ReferenceIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index readers should query. The lock is held only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<ReferenceIndex> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install `index` and return the one it replaced.
    pub fn swap(&self, index: ReferenceIndex) -> Arc<ReferenceIndex> {
        let next = Arc::new(index);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, next);
        info!(
            "Reference index swapped: {} -> {} entries",
            previous.len(),
            guard.len()
        );
        previous
    }
}

/// On-disk form of a built index
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub metric: Metric,
    pub embedder: Option<String>,
    pub dimension: Option<usize>,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<ReferenceEntry>,
}

impl IndexSnapshot {
    pub fn from_index(index: &ReferenceIndex) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            metric: index.metric(),
            embedder: index.embedder().map(str::to_string),
            dimension: index.dimension(),
            saved_at: Utc::now(),
            entries: index.entries().cloned().collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let mut encoder = zstd::stream::write::Encoder::new(writer, 3)?;
        bincode::serialize_into(&mut encoder, self)?;
        encoder.finish()?;
        info!("Saved {} reference entries to {:?}", self.entries.len(), path);
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
        let snapshot: IndexSnapshot = bincode::deserialize_from(decoder)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ClassifyError::Storage(format!(
                "snapshot {:?} has version {}, expected {}",
                path, snapshot.version, SNAPSHOT_VERSION
            )));
        }
        debug!("Read snapshot with {} entries from {:?}", snapshot.entries.len(), path);
        Ok(snapshot)
    }

    /// Rebuild the index, refusing snapshots produced by a different embedder.
    pub fn into_index(self, embedder_name: &str, embedder_dimension: usize) -> Result<ReferenceIndex> {
        if let Some(saved) = &self.embedder {
            if saved != embedder_name {
                return Err(ClassifyError::Storage(format!(
                    "snapshot was built with embedder '{}', active embedder is '{}'",
                    saved, embedder_name
                )));
            }
        }
        if let Some(dimension) = self.dimension {
            if dimension != embedder_dimension {
                return Err(ClassifyError::DimensionMismatch {
                    expected: embedder_dimension,
                    actual: dimension,
                });
            }
        }

        let mut builder = IndexBuilder::new(Some(self.metric));
        for entry in self.entries {
            builder.push(entry)?;
        }
        Ok(builder.build(self.embedder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_index(n: usize) -> ReferenceIndex {
        let mut builder = IndexBuilder::new(None);
        for i in 0..n {
            builder
                .push(ReferenceEntry::new("tRNA", vec![i as f32, 1.0]).with_id(format!("e{i}")))
                .unwrap();
        }
        builder.build(Some("feature-v1".to_string()))
    }

    #[test]
    fn test_swap_keeps_old_snapshot_alive() {
        let shared = SharedIndex::new(small_index(1));
        let before = shared.snapshot();
        let previous = shared.swap(small_index(3));
        assert_eq!(before.len(), 1);
        assert_eq!(previous.len(), 1);
        assert_eq!(shared.snapshot().len(), 3);
    }

    #[test]
    fn test_snapshot_round_trip() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reference.idx");
        IndexSnapshot::from_index(&small_index(4)).save(&path)?;

        let restored = IndexSnapshot::read(&path)?.into_index("feature-v1", 2)?;
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.embedder(), Some("feature-v1"));
        let ids: Vec<_> = restored.entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["e0", "e1", "e2", "e3"]);
        Ok(())
    }

    #[test]
    fn test_snapshot_rejects_other_embedder() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reference.idx");
        IndexSnapshot::from_index(&small_index(2)).save(&path)?;

        let err = IndexSnapshot::read(&path)?
            .into_index("projection:other", 2)
            .unwrap_err();
        assert_eq!(err.code(), "storage");

        let err = IndexSnapshot::read(&path)?.into_index("feature-v1", 49).unwrap_err();
        assert_eq!(err.code(), "dimension_mismatch");
        Ok(())
    }

    #[test]
    fn test_missing_snapshot_is_io_error() {
        let err = IndexSnapshot::read(Path::new("/definitely/not/here.idx")).unwrap_err();
        assert_eq!(err.code(), "io");
    }
}
