use serde::{Deserialize, Serialize};

use crate::segment::Version;

/// What a write operation did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
    Deleted,
    /// The write left the document unchanged
    Noop,
    NotFound,
}

/// Result of a single document write
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    pub outcome: WriteOutcome,
    /// Version of the document after the write, None if it does not exist
    pub version: Option<Version>,
}

impl WriteResult {
    pub fn new(id: impl Into<String>, outcome: WriteOutcome, version: Option<Version>) -> Self {
        Self {
            id: id.into(),
            outcome,
            version,
        }
    }

    /// Check whether the write changed the index
    pub fn is_change(&self) -> bool {
        matches!(
            self.outcome,
            WriteOutcome::Created | WriteOutcome::Updated | WriteOutcome::Deleted
        )
    }
}
