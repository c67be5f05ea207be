pub mod config;
pub mod engine;
pub mod eval;
pub mod gallery;
pub mod mask;
pub mod matcher;
pub mod matrix;
pub mod report;
pub mod sigset;

use std::path::Path;
use std::sync::atomic::AtomicBool;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Sigset error: {0}")]
    Sigset(#[from] sigset::SigsetError),
    #[error("Enrollment error: {0}")]
    Enrollment(#[from] matcher::EnrollmentError),
    #[error("Gallery error: {0}")]
    Gallery(#[from] gallery::GalleryError),
    #[error("Comparison error: {0}")]
    Engine(#[from] engine::EngineError),
    #[error("File format error: {0}")]
    Format(#[from] matrix::FormatError),
    #[error("Evaluation error: {0}")]
    Eval(#[from] eval::EvalError),
    #[error("Report error: {0}")]
    Report(#[from] report::ReportError),
}

/// The evaluation pipeline: enroll -> compare -> mask -> eval -> export.
/// Every stage is a pure batch transform over the previous stage's output;
/// the parameter set is fixed at construction.
pub struct EvalPipeline {
    params: config::EvalParams,
    matcher: Box<dyn matcher::Matcher>,
}

impl EvalPipeline {
    /// Create a pipeline for the configured algorithm
    pub fn new(params: config::EvalParams) -> Result<Self, Error> {
        params.validate()?;
        let matcher = matcher::resolve(&params.algorithm)?;
        Ok(Self { params, matcher })
    }

    /// Create a pipeline around a caller-supplied matcher
    pub fn with_matcher(
        params: config::EvalParams,
        matcher: Box<dyn matcher::Matcher>,
    ) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self { params, matcher })
    }

    pub fn params(&self) -> &config::EvalParams {
        &self.params
    }

    /// Enroll a sigset into a gallery file. An existing gallery is reused
    /// unless forced re-enrollment is configured.
    pub fn enroll(
        &self,
        sigset_path: &Path,
        gallery_path: &Path,
    ) -> Result<gallery::Gallery, Error> {
        let sigset = sigset::Sigset::load(sigset_path)?;

        if gallery_path.exists() && !self.params.force_enrollment {
            log::info!("Reusing cached gallery {}", gallery_path.display());
            return Ok(gallery::Gallery::load(gallery_path)?);
        }

        let gallery = gallery::build_gallery(
            &sigset,
            self.matcher.as_ref(),
            &self.params.comparison_input_path,
            self.params.enrollment_policy,
        )?;
        gallery.save(gallery_path)?;
        Ok(gallery)
    }

    /// Compare two galleries into a similarity matrix file
    pub fn compare(
        &self,
        target: &gallery::Gallery,
        query: &gallery::Gallery,
        matrix_path: &Path,
        cancel: &AtomicBool,
    ) -> Result<matrix::SimilarityMatrix, Error> {
        let options = engine::CompareOptions {
            exclude_self: self.params.exclude_self,
        };
        let matrix =
            engine::compare_galleries(self.matcher.as_ref(), target, query, options, cancel)?;
        matrix.write(matrix_path)?;
        Ok(matrix)
    }

    /// Derive the ground-truth mask from two sigsets into a mask file
    pub fn make_mask(
        &self,
        target_sigset_path: &Path,
        query_sigset_path: &Path,
        mask_path: &Path,
    ) -> Result<mask::Mask, Error> {
        let target = sigset::Sigset::load(target_sigset_path)?;
        let query = sigset::Sigset::load(query_sigset_path)?;
        let mask = mask::make_mask(&target, &query, self.params.same_source_exclusion);
        mask.write(mask_path)?;
        Ok(mask)
    }

    /// Evaluate one similarity matrix against a mask and export the CSV
    /// report. Several matrices may be evaluated against the same mask;
    /// every call is independent.
    pub fn evaluate(
        &self,
        matrix_path: &Path,
        mask_path: &Path,
        report_path: &Path,
        label: &str,
    ) -> Result<eval::Metrics, Error> {
        let matrix = matrix::SimilarityMatrix::read(matrix_path)?;
        let mask = mask::Mask::read(mask_path)?;
        let metrics = eval::evaluate(
            &matrix,
            &mask,
            self.params.target_far,
            self.params.decision_threshold,
        )?;
        report::write_report(&metrics, label, report_path)?;
        Ok(metrics)
    }
}
