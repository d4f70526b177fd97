// LanceDB vector database module
// Handles vector storage and similarity search for indexed chunks


pub mod vector_store;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RagError, Result};

pub use vector_store::{LanceBackend, LanceIndex};

/// File written next to the LanceDB table describing how it was built
pub const MANIFEST_FILE: &str = "index_manifest.json";

/// Name of the table holding chunk vectors
pub const TABLE_NAME: &str = "chunks";

/// Build metadata persisted alongside the vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Embedder that produced every vector in the table
    pub embedder_identity: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn new(embedder_identity: &str, chunk_count: usize, dimension: usize) -> Self {
        Self {
            embedder_identity: embedder_identity.to_string(),
            chunk_count,
            dimension,
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
        }
    }

    #[inline]
    pub fn read(directory: &Path) -> Result<Self> {
        let path = directory.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            RagError::Database(format!("Failed to read index manifest {:?}: {}", path, e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| RagError::Database(format!("Failed to parse index manifest: {}", e)))
    }

    #[inline]
    pub fn write(&self, directory: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            RagError::Database(format!("Failed to serialize index manifest: {}", e))
        })?;
        fs::write(directory.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}
