use crate::gallery::Gallery;
use crate::matcher::Matcher;
use crate::matrix::{SimilarityMatrix, NON_COMPARABLE};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Comparison run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// When the target and query galleries are the same gallery, mark the
    /// diagonal non-comparable instead of scoring a template against itself
    pub exclude_self: bool,
}

/// Compute the dense target x query score matrix. Cell (i, j) is always
/// compare(target[i], query[j]); score asymmetry between the two orderings is
/// preserved. Rows are filled by a worker pool over disjoint slices, with a
/// join barrier before the matrix is returned, so a partial matrix is never
/// observable. Cancellation is checked between rows; a cancelled run yields
/// an error and the partial buffer is dropped.
pub fn compare_galleries(
    matcher: &dyn Matcher,
    target: &Gallery,
    query: &Gallery,
    options: CompareOptions,
    cancel: &AtomicBool,
) -> Result<SimilarityMatrix, EngineError> {
    let rows = target.len();
    let cols = query.len();
    let exclude_self = options.exclude_self && target.name() == query.name();

    log::info!(
        "Comparing {} x {} ({} against {})",
        rows,
        cols,
        target.name(),
        query.name()
    );

    let mut data = vec![NON_COMPARABLE; rows * cols];
    if cols > 0 {
        fill_rows(matcher, target, query, exclude_self, cancel, cols, &mut data)?;
    }

    Ok(SimilarityMatrix::from_data(
        target.name().to_string(),
        query.name().to_string(),
        rows,
        cols,
        data,
    ))
}

fn fill_rows(
    matcher: &dyn Matcher,
    target: &Gallery,
    query: &Gallery,
    exclude_self: bool,
    cancel: &AtomicBool,
    cols: usize,
    data: &mut [f32],
) -> Result<(), EngineError> {
    data.par_chunks_mut(cols)
        .enumerate()
        .try_for_each(|(i, row)| {
            if cancel.load(Ordering::Relaxed) {
                return Err(EngineError::Cancelled);
            }
            let Some(target_embedding) = target.templates()[i].embedding.as_ref() else {
                // Failure-to-enroll gap: the whole row stays non-comparable
                return Ok(());
            };
            for (j, cell) in row.iter_mut().enumerate() {
                if exclude_self && i == j {
                    continue;
                }
                if let Some(query_embedding) = query.templates()[j].embedding.as_ref() {
                    *cell = matcher.compare(target_embedding, query_embedding);
                }
            }
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::{build_gallery, EnrollmentPolicy};
    use crate::matcher::{Embedding, EnrollmentError};
    use crate::sigset::{Partition, Sigset, SubjectDescriptor};
    use ndarray::arr1;
    use std::path::{Path, PathBuf};

    /// Encodes each identity's trailing number into the embedding so scores
    /// are predictable: compare(a, b) = 10 * a[0] + b[0], which is asymmetric.
    struct OrderedMatcher;

    impl Matcher for OrderedMatcher {
        fn enroll(
            &self,
            descriptor: &SubjectDescriptor,
            _base_path: &Path,
        ) -> Result<Embedding, EnrollmentError> {
            if descriptor.identity == "BAD" {
                return Err(EnrollmentError::Decode(
                    descriptor.source.clone(),
                    "unreadable".to_string(),
                ));
            }
            let value: f32 = descriptor.identity[1..].parse().unwrap();
            Ok(arr1(&[value]))
        }

        fn compare(&self, a: &Embedding, b: &Embedding) -> f32 {
            10.0 * a[0] + b[0]
        }
    }

    fn sigset(name: &str, identities: &[&str]) -> Sigset {
        Sigset {
            name: name.to_string(),
            subjects: identities
                .iter()
                .map(|id| SubjectDescriptor {
                    identity: id.to_string(),
                    partition: Partition::Target,
                    source: PathBuf::from(format!("{}.emb", id)),
                    session: None,
                })
                .collect(),
        }
    }

    fn gallery(name: &str, identities: &[&str]) -> Gallery {
        build_gallery(
            &sigset(name, identities),
            &OrderedMatcher,
            Path::new("."),
            EnrollmentPolicy::Skip,
        )
        .unwrap()
    }

    #[test]
    fn test_matrix_shape_matches_galleries() {
        let target = gallery("t", &["S1", "S2", "S3"]);
        let query = gallery("q", &["S1", "S2"]);
        let cancel = AtomicBool::new(false);

        let matrix =
            compare_galleries(&OrderedMatcher, &target, &query, CompareOptions::default(), &cancel)
                .unwrap();
        assert_eq!(matrix.rows(), 3);
        assert_eq!(matrix.cols(), 2);
    }

    #[test]
    fn test_cell_order_and_asymmetry() {
        let target = gallery("t", &["S1", "S2"]);
        let query = gallery("q", &["S3", "S4"]);
        let cancel = AtomicBool::new(false);

        let matrix =
            compare_galleries(&OrderedMatcher, &target, &query, CompareOptions::default(), &cancel)
                .unwrap();
        // (i, j) = 10 * target + query, never the transpose
        assert_eq!(matrix.get(0, 0), 13.0);
        assert_eq!(matrix.get(0, 1), 14.0);
        assert_eq!(matrix.get(1, 0), 23.0);
        assert_eq!(matrix.get(1, 1), 24.0);

        let swapped =
            compare_galleries(&OrderedMatcher, &query, &target, CompareOptions::default(), &cancel)
                .unwrap();
        assert_eq!(swapped.get(0, 0), 31.0);
        assert_ne!(swapped.get(0, 0), matrix.get(0, 0));
    }

    #[test]
    fn test_self_comparison_excludes_diagonal() {
        let gallery = gallery("self", &["S1", "S2"]);
        let cancel = AtomicBool::new(false);
        let options = CompareOptions { exclude_self: true };

        let matrix =
            compare_galleries(&OrderedMatcher, &gallery, &gallery, options, &cancel).unwrap();
        assert_eq!(matrix.get(0, 0), NON_COMPARABLE);
        assert_eq!(matrix.get(1, 1), NON_COMPARABLE);
        assert_eq!(matrix.get(0, 1), 12.0);
        assert_eq!(matrix.get(1, 0), 21.0);
    }

    #[test]
    fn test_enrollment_gap_rows_are_non_comparable() {
        let target = gallery("t", &["S1", "BAD"]);
        let query = gallery("q", &["S2", "BAD"]);
        let cancel = AtomicBool::new(false);

        let matrix =
            compare_galleries(&OrderedMatcher, &target, &query, CompareOptions::default(), &cancel)
                .unwrap();
        assert_eq!(matrix.get(0, 0), 12.0);
        assert_eq!(matrix.get(0, 1), NON_COMPARABLE);
        assert_eq!(matrix.get(1, 0), NON_COMPARABLE);
        assert_eq!(matrix.get(1, 1), NON_COMPARABLE);
    }

    #[test]
    fn test_cancelled_run_produces_no_matrix() {
        let target = gallery("t", &["S1", "S2"]);
        let query = gallery("q", &["S3"]);
        let cancel = AtomicBool::new(true);

        let err =
            compare_galleries(&OrderedMatcher, &target, &query, CompareOptions::default(), &cancel)
                .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
