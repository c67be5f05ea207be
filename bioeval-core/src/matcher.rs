use crate::sigset::SubjectDescriptor;
use ndarray::Array1;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("Failed to read template source {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode template {}: {}", .0.display(), .1)]
    Decode(PathBuf, String),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Extracted feature vector for one enrolled sample
pub type Embedding = Array1<f32>;

/// The two operations the pipeline needs from any matching algorithm.
/// Everything else about the algorithm stays behind this seam.
pub trait Matcher: Send + Sync {
    /// Produce the feature payload for one subject descriptor
    fn enroll(
        &self,
        descriptor: &SubjectDescriptor,
        base_path: &Path,
    ) -> Result<Embedding, EnrollmentError>;

    /// Similarity score between two enrolled payloads.
    /// Not assumed symmetric in value: compare(a, b) may differ from compare(b, a).
    fn compare(&self, a: &Embedding, b: &Embedding) -> f32;
}

/// Resolve an algorithm name from the configuration to a concrete matcher
pub fn resolve(algorithm: &str) -> Result<Box<dyn Matcher>, EnrollmentError> {
    match algorithm {
        "cosine" | "Cosine" => Ok(Box::new(CosineMatcher)),
        other => Err(EnrollmentError::UnknownAlgorithm(other.to_string())),
    }
}

/// Built-in matcher over pre-extracted embeddings: enrollment loads a
/// bincode-serialized feature vector from the descriptor's source path and
/// L2-normalizes it, so comparison reduces to a dot product.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn enroll(
        &self,
        descriptor: &SubjectDescriptor,
        base_path: &Path,
    ) -> Result<Embedding, EnrollmentError> {
        let path = if descriptor.source.is_absolute() {
            descriptor.source.clone()
        } else {
            base_path.join(&descriptor.source)
        };

        let data = std::fs::read(&path).map_err(|source| EnrollmentError::Io {
            path: path.clone(),
            source,
        })?;
        let embedding: Embedding = bincode::deserialize(&data)
            .map_err(|e| EnrollmentError::Decode(path, e.to_string()))?;

        Ok(normalize(embedding))
    }

    fn compare(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.dot(b)
    }
}

/// L2 normalize an embedding vector
pub fn normalize(mut embedding: Embedding) -> Embedding {
    let norm = embedding.dot(&embedding).sqrt();
    if norm > 0.0 {
        embedding /= norm;
    }
    embedding
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_normalize() {
        let embedding = arr1(&[3.0, 4.0]);
        let normalized = normalize(embedding);

        let norm = normalized.dot(&normalized).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let embedding = Array1::zeros(8);
        let normalized = normalize(embedding);
        assert!(normalized.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_cosine_compare() {
        let matcher = CosineMatcher;
        let a = arr1(&[1.0, 0.0, 0.0]);
        let b = arr1(&[1.0, 0.0, 0.0]);
        assert!((matcher.compare(&a, &b) - 1.0).abs() < 1e-6);

        let c = arr1(&[0.0, 1.0, 0.0]);
        assert!(matcher.compare(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_unknown_algorithm() {
        let err = resolve("NoSuchMatcher").err().unwrap();
        assert!(matches!(err, EnrollmentError::UnknownAlgorithm(_)));
    }
}
