use serde::{Deserialize, Serialize};

use parley_core::{ParleyError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 4;

/// Chunking and ranking knobs for the retrieval worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum characters per stored chunk
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Chunks returned per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RetrievalConfig {
    /// Defaults overridden by `PARLEY_CHUNK_SIZE`, `PARLEY_CHUNK_OVERLAP` and
    /// `PARLEY_TOP_K` when they parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chunk_size: env_usize("PARLEY_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            chunk_overlap: env_usize("PARLEY_CHUNK_OVERLAP").unwrap_or(defaults.chunk_overlap),
            top_k: env_usize("PARLEY_TOP_K").unwrap_or(defaults.top_k),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ParleyError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ParleyError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(ParleyError::Config("top_k must be positive".into()));
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
