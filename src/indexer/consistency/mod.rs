// Index consistency validation
// Decides whether a persisted index still matches the corpus and embedder


use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{IndexBackend, IndexHandle, IndexSnapshotState};

/// Why a persisted index cannot be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    MissingDirectory,
    EmptyDirectory,
    LoadFailed(String),
    CountMismatch { persisted: usize, current: usize },
    EmbedderMismatch {
        persisted: Option<String>,
        current: String,
    },
}

impl fmt::Display for StaleReason {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDirectory => write!(f, "no persisted index directory"),
            Self::EmptyDirectory => write!(f, "persisted index directory is empty"),
            Self::LoadFailed(e) => write!(f, "persisted index failed to load: {}", e),
            Self::CountMismatch { persisted, current } => {
                write!(f, "count mismatch: {} vs {}", persisted, current)
            }
            Self::EmbedderMismatch { persisted, current } => write!(
                f,
                "embedder changed from {} to {}",
                persisted.as_deref().unwrap_or("unknown"),
                current
            ),
        }
    }
}

/// Outcome of [`check_staleness`]; a fresh index comes back already open
pub enum Staleness {
    Fresh(Box<dyn IndexHandle>),
    Stale(StaleReason),
}

impl Staleness {
    #[inline]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    #[inline]
    pub fn reason(&self) -> Option<&StaleReason> {
        match self {
            Self::Fresh(_) => None,
            Self::Stale(reason) => Some(reason),
        }
    }
}

impl fmt::Debug for Staleness {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh(_) => f.write_str("Fresh"),
            Self::Stale(reason) => f.debug_tuple("Stale").field(reason).finish(),
        }
    }
}

/// Check, in order: directory present, directory non-empty, index loads,
/// chunk count unchanged, embedder unchanged
///
/// Only the count is compared, so edits that keep the chunk count the same
/// are not detected.
#[inline]
pub async fn check_staleness(
    backend: &dyn IndexBackend,
    directory: &Path,
    current_count: usize,
    embedder_identity: &str,
) -> Staleness {
    let mut entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(_) => return Staleness::Stale(StaleReason::MissingDirectory),
    };
    if entries.next().is_none() {
        return Staleness::Stale(StaleReason::EmptyDirectory);
    }

    let mut handle = match backend.load(directory).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Error checking vector store: {}", e);
            return Staleness::Stale(StaleReason::LoadFailed(e.to_string()));
        }
    };

    let snapshot = match handle.count().await {
        Ok(chunk_count) => IndexSnapshotState {
            chunk_count,
            embedder_identity: handle.embedder_identity().map(str::to_string),
        },
        Err(e) => {
            warn!("Error counting persisted index: {}", e);
            release(handle.as_mut()).await;
            return Staleness::Stale(StaleReason::LoadFailed(e.to_string()));
        }
    };
    debug!("Persisted index snapshot: {:?}", snapshot);

    let reason = if snapshot.chunk_count != current_count {
        info!(
            "Vector store count mismatch: {} vs {}",
            snapshot.chunk_count, current_count
        );
        Some(StaleReason::CountMismatch {
            persisted: snapshot.chunk_count,
            current: current_count,
        })
    } else if snapshot.embedder_identity.as_deref() != Some(embedder_identity) {
        info!(
            "Vector store embedder mismatch: {:?} vs {}",
            snapshot.embedder_identity, embedder_identity
        );
        Some(StaleReason::EmbedderMismatch {
            persisted: snapshot.embedder_identity,
            current: embedder_identity.to_string(),
        })
    } else {
        None
    };

    match reason {
        Some(reason) => {
            release(handle.as_mut()).await;
            Staleness::Stale(reason)
        }
        None => Staleness::Fresh(handle),
    }
}

async fn release(handle: &mut dyn IndexHandle) {
    if let Err(e) = handle.close().await {
        warn!("Failed to close stale index handle: {}", e);
    }
}
