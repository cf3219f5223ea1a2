//! Engine configuration

use crate::common::DEFAULT_CHUNK_CAPACITY;
use crate::error::{QueryError, Result};
use crate::expr::hash_table::DEFAULT_CAPACITY;
use crate::expr::HashTableStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables consulted when operators create chunks and hash tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per chunk produced by operators
    pub chunk_capacity: usize,
    /// Initial slot count of linear-probing tables
    pub linear_probing_capacity: usize,
    /// Hash table selection
    pub hash_table: HashTableStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            linear_probing_capacity: DEFAULT_CAPACITY,
            hash_table: HashTableStrategy::Auto,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity.max(1);
        self
    }

    pub fn with_linear_probing_capacity(mut self, capacity: usize) -> Self {
        self.linear_probing_capacity = capacity;
        self
    }

    pub fn with_hash_table(mut self, strategy: HashTableStrategy) -> Self {
        self.hash_table = strategy;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            QueryError::Execution(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_capacity == 0 {
            return Err(QueryError::InvalidArgument(
                "chunk_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
