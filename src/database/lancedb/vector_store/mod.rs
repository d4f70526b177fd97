
use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info, warn};

use super::{IndexManifest, TABLE_NAME};
use crate::embeddings::Chunk;
use crate::indexer::{IndexBackend, IndexHandle, IndexedChunk, ScoredChunk, rank};
use crate::{RagError, Result};

/// Builds and opens LanceDB indexes
#[derive(Debug, Clone, Copy, Default)]
pub struct LanceBackend;

impl LanceBackend {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    async fn connect(directory: &Path) -> Result<Connection> {
        let uri = directory.to_string_lossy();
        debug!("Connecting to LanceDB at {}", uri);
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("ordinal", DataType::UInt32, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim,
                ),
                false,
            ),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("location", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
        ]))
    }

    /// Create a RecordBatch from indexed chunks
    fn create_record_batch(chunks: &[IndexedChunk], vector_dim: i32) -> Result<RecordBatch> {
        let len = chunks.len();
        let schema = Self::create_schema(vector_dim);

        let mut ordinals = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim as usize);
        let mut source_ids = Vec::with_capacity(len);
        let mut locations = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);

        for indexed in chunks {
            ordinals.push(indexed.ordinal);
            flat_values.extend_from_slice(&indexed.vector);
            source_ids.push(indexed.chunk.source_id.as_str());
            locations.push(indexed.chunk.location.as_str());
            texts.push(indexed.chunk.text.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(UInt32Array::from(ordinals)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(source_ids)),
            Arc::new(StringArray::from(locations)),
            Arc::new(StringArray::from(texts)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }
}

#[async_trait]
impl IndexBackend for LanceBackend {
    async fn build(
        &self,
        directory: &Path,
        chunks: &[IndexedChunk],
        embedder_identity: &str,
    ) -> Result<Box<dyn IndexHandle>> {
        let first = chunks
            .first()
            .ok_or_else(|| RagError::Index("Cannot build an empty index".to_string()))?;
        let dimension = first.vector.len();
        let vector_dim = i32::try_from(dimension)
            .map_err(|_| RagError::Index(format!("Vector dimension {} too large", dimension)))?;

        fs::create_dir_all(directory)?;
        let connection = Self::connect(directory).await?;

        info!(
            "Creating {} table with {} chunks of {} dimensions",
            TABLE_NAME,
            chunks.len(),
            dimension
        );

        let table = connection
            .create_empty_table(TABLE_NAME, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        let record_batch = Self::create_record_batch(chunks, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;

        let manifest = IndexManifest::new(embedder_identity, chunks.len(), dimension);
        manifest.write(directory)?;

        info!("Stored {} chunks (build {})", chunks.len(), manifest.build_id);
        Ok(Box::new(LanceIndex {
            connection: Some(connection),
            table: Some(table),
            manifest,
        }))
    }

    async fn load(&self, directory: &Path) -> Result<Box<dyn IndexHandle>> {
        let manifest = IndexManifest::read(directory)?;
        let connection = Self::connect(directory).await?;

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if rows != manifest.chunk_count {
            warn!(
                "Index manifest lists {} chunks but table holds {}",
                manifest.chunk_count, rows
            );
            return Err(RagError::Database(
                "Index manifest out of sync with table".to_string(),
            ));
        }

        debug!(
            "Opened index build {} ({} chunks)",
            manifest.build_id, manifest.chunk_count
        );
        Ok(Box::new(LanceIndex {
            connection: Some(connection),
            table: Some(table),
            manifest,
        }))
    }
}

/// Open LanceDB index; both handles are dropped on [`IndexHandle::close`]
pub struct LanceIndex {
    connection: Option<Connection>,
    table: Option<Table>,
    manifest: IndexManifest,
}

impl LanceIndex {
    #[inline]
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    fn table(&self) -> Result<&Table> {
        self.table
            .as_ref()
            .ok_or_else(|| RagError::Index("Vector index is closed".to_string()))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
        let ordinals = batch
            .column_by_name("ordinal")
            .ok_or_else(|| RagError::Database("Missing ordinal column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Database("Invalid ordinal column type".to_string()))?;

        let source_ids = string_column(batch, "source_id")?;
        let locations = string_column(batch, "location")?;
        let texts = string_column(batch, "text")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let results = (0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                ScoredChunk {
                    ordinal: ordinals.value(row),
                    chunk: Chunk {
                        source_id: source_ids.value(row).to_string(),
                        location: locations.value(row).to_string(),
                        text: texts.value(row).to_string(),
                    },
                    // Cosine distance to similarity (higher is better)
                    similarity: 1.0 - distance,
                }
            })
            .collect();

        Ok(results)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

#[async_trait]
impl IndexHandle for LanceIndex {
    async fn count(&self) -> Result<usize> {
        self.table()?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query_vector.len() != self.manifest.dimension {
            return Err(RagError::Index(format!(
                "Query vector has {} dimensions, index expects {}",
                query_vector.len(),
                self.manifest.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", k);

        let mut stream = self
            .table()?
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", results.len());
        Ok(rank(results, k))
    }

    fn embedder_identity(&self) -> Option<&str> {
        Some(&self.manifest.embedder_identity)
    }

    async fn close(&mut self) -> Result<()> {
        self.table.take();
        self.connection.take();
        debug!("Closed index build {}", self.manifest.build_id);
        Ok(())
    }
}
