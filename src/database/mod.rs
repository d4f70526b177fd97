// Database module
// Persistent vector storage for indexed chunks

pub mod lancedb;

pub use self::lancedb::{IndexManifest, LanceBackend, LanceIndex};
