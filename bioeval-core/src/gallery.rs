use crate::matcher::{Embedding, EnrollmentError, Matcher};
use crate::sigset::{Partition, Sigset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Enrollment failed for {identity} (entry {index}): {source}")]
    Enrollment {
        identity: String,
        index: usize,
        #[source]
        source: EnrollmentError,
    },
}

/// What to do when the external matcher fails to enroll an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentPolicy {
    /// Fail the whole gallery, identifying the offending entry
    #[default]
    Abort,
    /// Record a gap for the entry and keep going. The slot is kept so matrix
    /// dimensions stay consistent with the sigset; comparisons against a gap
    /// score the non-comparable sentinel.
    Skip,
}

/// One enrolled sample. `embedding: None` records a failure-to-enroll gap
/// under the skip policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub identity: String,
    pub partition: Partition,
    pub source: PathBuf,
    pub session: Option<String>,
    pub embedding: Option<Embedding>,
}

/// Ordered collection of templates. Index i corresponds to sigset entry i and
/// to row/column i of any matrix built from this gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gallery {
    name: String,
    created_at: DateTime<Utc>,
    templates: Vec<Template>,
}

impl Gallery {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Number of entries that failed enrollment under the skip policy
    pub fn gap_count(&self) -> usize {
        self.templates
            .iter()
            .filter(|t| t.embedding.is_none())
            .count()
    }

    /// Persist the gallery to a .gal file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GalleryError> {
        let data =
            bincode::serialize(self).map_err(|e| GalleryError::Serialization(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Load a gallery from a .gal file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GalleryError> {
        let data = fs::read(path)?;
        let gallery: Gallery =
            bincode::deserialize(&data).map_err(|e| GalleryError::Serialization(e.to_string()))?;
        Ok(gallery)
    }
}

/// Enroll every sigset entry through the matcher, in sigset order.
/// Per-entry failures are handled per policy; nothing outside the returned
/// gallery is touched.
pub fn build_gallery(
    sigset: &Sigset,
    matcher: &dyn Matcher,
    base_path: &Path,
    policy: EnrollmentPolicy,
) -> Result<Gallery, GalleryError> {
    let mut templates = Vec::with_capacity(sigset.len());

    for (index, descriptor) in sigset.subjects.iter().enumerate() {
        let embedding = match matcher.enroll(descriptor, base_path) {
            Ok(embedding) => Some(embedding),
            Err(source) => match policy {
                EnrollmentPolicy::Abort => {
                    return Err(GalleryError::Enrollment {
                        identity: descriptor.identity.clone(),
                        index,
                        source,
                    });
                }
                EnrollmentPolicy::Skip => {
                    log::warn!(
                        "Skipping entry {} ({}): {}",
                        index,
                        descriptor.identity,
                        source
                    );
                    None
                }
            },
        };

        templates.push(Template {
            identity: descriptor.identity.clone(),
            partition: descriptor.partition,
            source: descriptor.source.clone(),
            session: descriptor.session.clone(),
            embedding,
        });
    }

    let gallery = Gallery {
        name: sigset.name.clone(),
        created_at: Utc::now(),
        templates,
    };
    log::info!(
        "Enrolled gallery {} ({} templates, {} gaps)",
        gallery.name,
        gallery.len(),
        gallery.gap_count()
    );
    Ok(gallery)
}
