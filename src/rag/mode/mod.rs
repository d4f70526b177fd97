
use std::fmt;

use serde::{Deserialize, Serialize};

/// What the service can currently do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityMode {
    /// Retrieval plus generation
    #[serde(rename = "RAG")]
    Full,
    /// Generation without retrieved context
    #[serde(rename = "LLM_ONLY")]
    GeneratorOnly,
    #[serde(rename = "UNAVAILABLE")]
    Unavailable,
}

impl CapabilityMode {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "RAG",
            Self::GeneratorOnly => "LLM_ONLY",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for CapabilityMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which components are initialized; the mode is derived from this, never stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub generator: bool,
    pub embedder: bool,
    pub index: bool,
}

impl Readiness {
    #[inline]
    pub const fn retrieval(self) -> bool {
        self.embedder && self.index
    }

    #[inline]
    pub const fn mode(self) -> CapabilityMode {
        if !self.generator {
            CapabilityMode::Unavailable
        } else if self.retrieval() {
            CapabilityMode::Full
        } else {
            CapabilityMode::GeneratorOnly
        }
    }
}
