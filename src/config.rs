use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Text analysis configuration for searchable text fields
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub lowercase: bool,
    pub min_token_length: usize,
    pub max_token_length: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            min_token_length: 1,
            max_token_length: 255,
        }
    }
}

/// Thresholds that trigger an automatic refresh of the open segment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Refresh when the open segment holds this many documents
    pub max_docs: usize,
    /// Refresh when the open segment exceeds this size (bytes)
    pub max_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            // 50k docs
            max_docs: 50_000,
            // 64MB
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Merge policy applied at refresh time
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergePolicyConfig {
    /// Fold a segment made only of updated documents into the newest
    /// segment holding their previous copies
    pub fold_update_segments: bool,
    /// Merge the smallest segments once the count exceeds this
    pub max_segments: usize,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            fold_update_segments: true,
            max_segments: 10,
        }
    }
}

/// Index configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory for segment files; in-memory only when unset
    pub data_dir: Option<PathBuf>,
    pub buffer: BufferConfig,
    pub merge: MergePolicyConfig,
    pub analyzer: AnalyzerConfig,
}

impl IndexConfig {
    /// Create an in-memory index configuration
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a configuration persisting segments under `data_dir`
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    /// Set the automatic refresh threshold in documents
    pub fn with_max_buffered_docs(mut self, max_docs: usize) -> Self {
        self.buffer.max_docs = max_docs;
        self
    }

    /// Set the maximum number of segments before an overflow merge
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.merge.max_segments = max_segments;
        self
    }

    /// Enable or disable folding of update-only segments at refresh
    pub fn with_update_folding(mut self, enabled: bool) -> Self {
        self.merge.fold_update_segments = enabled;
        self
    }

    /// Set the analyzer configuration
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Get the segment directory, if persistent
    pub fn segments_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("segments"))
    }
}
