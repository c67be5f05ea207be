use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigsetError {
    #[error("Failed to read sigset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse sigset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Sigset {0} contains no subjects")]
    Empty(String),
}

/// Which side of a comparison a subject belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Target,
    Query,
}

/// One resolved sigset entry: who the sample belongs to and where its data lives.
/// XML sigset parsing happens upstream; the pipeline only ever sees these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDescriptor {
    pub identity: String,
    pub partition: Partition,
    pub source: PathBuf,
    #[serde(default)]
    pub session: Option<String>,
}

/// Named, ordered list of subject descriptors. Order is load-bearing: index i
/// here becomes row/column i in every gallery, matrix, and mask built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sigset {
    pub name: String,
    pub subjects: Vec<SubjectDescriptor>,
}

impl Sigset {
    /// Load a resolved sigset from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SigsetError> {
        let contents = fs::read_to_string(&path)?;
        let sigset: Sigset = serde_json::from_str(&contents)?;
        if sigset.subjects.is_empty() {
            return Err(SigsetError::Empty(sigset.name));
        }
        Ok(sigset)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
