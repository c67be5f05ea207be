use crate::mask::{Mask, MaskLabel};
use crate::matrix::{SimilarityMatrix, NON_COMPARABLE};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(
        "Dimension mismatch: matrix {matrix_name} is {matrix_rows}x{matrix_cols}, \
         mask {mask_name} is {mask_rows}x{mask_cols}"
    )]
    DimensionMismatch {
        matrix_name: String,
        matrix_rows: usize,
        matrix_cols: usize,
        mask_name: String,
        mask_rows: usize,
        mask_cols: usize,
    },
}

/// A scalar summary that may be undefined when a score population is missing.
/// Undefined metrics are reported as such, never as a numeric default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    NotComputable,
}

impl MetricValue {
    pub fn value(self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(v),
            MetricValue::NotComputable => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{}", v),
            MetricValue::NotComputable => write!(f, "NA"),
        }
    }
}

/// One operating point of the ROC curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    pub far: f64,
    pub tar: f64,
}

/// Immutable snapshot of one evaluation. Each (matrix, mask) pairing gets its
/// own Metrics; records are never mixed across matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Genuine scores, ascending
    pub genuine_scores: Vec<f32>,
    /// Impostor scores, ascending
    pub impostor_scores: Vec<f32>,
    /// FAR is non-decreasing across the sequence
    pub roc: Vec<RocPoint>,
    pub eer: MetricValue,
    /// The configured operating point for TAR reporting
    pub target_far: f64,
    pub tar_at_far: MetricValue,
    pub decision_threshold: Option<f64>,
    pub accuracy: MetricValue,
}

/// Reduce a (matrix, mask) pair to performance metrics.
///
/// DontCare and non-comparable cells are dropped; the remaining (score, label)
/// records are the sufficient statistic for everything reported. Ties between
/// equal scores keep row-major cell order (stable sort), so identical inputs
/// always produce identical metrics.
pub fn evaluate(
    matrix: &SimilarityMatrix,
    mask: &Mask,
    target_far: f64,
    decision_threshold: Option<f64>,
) -> Result<Metrics, EvalError> {
    if matrix.rows() != mask.rows() || matrix.cols() != mask.cols() {
        return Err(EvalError::DimensionMismatch {
            matrix_name: format!("{}:{}", matrix.target_name(), matrix.query_name()),
            matrix_rows: matrix.rows(),
            matrix_cols: matrix.cols(),
            mask_name: format!("{}:{}", mask.target_name(), mask.query_name()),
            mask_rows: mask.rows(),
            mask_cols: mask.cols(),
        });
    }

    let mut genuine_scores = Vec::new();
    let mut impostor_scores = Vec::new();
    for (&score, &label) in matrix.scores().iter().zip(mask.labels()) {
        if score == NON_COMPARABLE || score.is_nan() {
            continue;
        }
        match label {
            MaskLabel::Genuine => genuine_scores.push(score),
            MaskLabel::Impostor => impostor_scores.push(score),
            MaskLabel::DontCare => {}
        }
    }
    genuine_scores.sort_by(f32::total_cmp);
    impostor_scores.sort_by(f32::total_cmp);

    log::debug!(
        "Extracted {} genuine and {} impostor records",
        genuine_scores.len(),
        impostor_scores.len()
    );

    let computable = !genuine_scores.is_empty() && !impostor_scores.is_empty();
    let (roc, eer) = if computable {
        sweep(&genuine_scores, &impostor_scores)
    } else {
        (Vec::new(), MetricValue::NotComputable)
    };
    let tar_at_far = if computable {
        tar_at(&roc, target_far)
    } else {
        MetricValue::NotComputable
    };
    let accuracy = match decision_threshold {
        Some(threshold) if computable => {
            let accepted = count_ge(&genuine_scores, threshold as f32);
            let rejected = impostor_scores.len() - count_ge(&impostor_scores, threshold as f32);
            let total = genuine_scores.len() + impostor_scores.len();
            MetricValue::Value((accepted + rejected) as f64 / total as f64)
        }
        _ => MetricValue::NotComputable,
    };

    Ok(Metrics {
        genuine_scores,
        impostor_scores,
        roc,
        eer,
        target_far,
        tar_at_far,
        decision_threshold,
        accuracy,
    })
}

/// Scores in `sorted` at or above the threshold; `sorted` is ascending
fn count_ge(sorted: &[f32], threshold: f32) -> usize {
    sorted.len() - sorted.partition_point(|&s| s < threshold)
}

/// Sweep thresholds over the distinct observed scores, descending, producing
/// the collapsed ROC curve and the equal-error rate.
fn sweep(genuine: &[f32], impostor: &[f32]) -> (Vec<RocPoint>, MetricValue) {
    let mut thresholds: Vec<f32> = genuine.iter().chain(impostor).copied().collect();
    thresholds.sort_by(|a, b| b.total_cmp(a));
    thresholds.dedup();

    let genuine_total = genuine.len() as f64;
    let impostor_total = impostor.len() as f64;

    // One raw point per distinct threshold, descending; FAR and TAR both
    // non-decreasing along the sweep
    let raw: Vec<RocPoint> = thresholds
        .iter()
        .map(|&t| RocPoint {
            far: count_ge(impostor, t) as f64 / impostor_total,
            tar: count_ge(genuine, t) as f64 / genuine_total,
        })
        .collect();

    // Collapse duplicate FARs to the maximum TAR at that FAR
    let mut roc: Vec<RocPoint> = Vec::with_capacity(raw.len());
    for point in &raw {
        match roc.last_mut() {
            Some(last) if last.far == point.far => last.tar = last.tar.max(point.tar),
            _ => roc.push(*point),
        }
    }

    let eer = equal_error_rate(&raw);
    (roc, eer)
}

/// Walk the sweep in ascending threshold order and locate the sign change of
/// FAR - FRR, interpolating linearly to the crossing. At the lowest observed
/// threshold FAR = 1 and FRR = 0, so the difference starts positive.
fn equal_error_rate(points_desc: &[RocPoint]) -> MetricValue {
    let mut prev: Option<(f64, f64)> = None;
    for point in points_desc.iter().rev() {
        let frr = 1.0 - point.tar;
        let diff = point.far - frr;
        if diff <= 0.0 {
            return MetricValue::Value(match prev {
                Some((prev_diff, prev_far)) if prev_diff > 0.0 => {
                    let alpha = prev_diff / (prev_diff - diff);
                    prev_far + alpha * (point.far - prev_far)
                }
                _ => (point.far + frr) / 2.0,
            });
        }
        prev = Some((diff, point.far));
    }
    // FAR stayed above FRR across the whole sweep; report the closest point
    let last = points_desc
        .first()
        .expect("sweep always has at least one threshold");
    MetricValue::Value((last.far + (1.0 - last.tar)) / 2.0)
}

/// TAR at the ROC point with the largest FAR at or below the target,
/// interpolated toward the next point
fn tar_at(roc: &[RocPoint], target_far: f64) -> MetricValue {
    let idx = match roc.iter().rposition(|p| p.far <= target_far) {
        Some(idx) => idx,
        None => return MetricValue::NotComputable,
    };
    let point = roc[idx];
    match roc.get(idx + 1) {
        Some(next) => {
            let alpha = (target_far - point.far) / (next.far - point.far);
            MetricValue::Value(point.tar + alpha * (next.tar - point.tar))
        }
        None => MetricValue::Value(point.tar),
    }
}
