use crate::eval::Metrics;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render one Metrics instance as CSV: one `roc` row per curve point in curve
/// order, then the summary rows, always in the same order. `x` is the row's
/// abscissa or parameter, `y` its value; undefined values render as NA. The
/// output is byte-identical for identical input.
pub fn render(metrics: &Metrics, label: &str) -> String {
    let mut out = String::new();
    out.push_str("label,kind,x,y\n");

    for point in &metrics.roc {
        let _ = writeln!(out, "{},roc,{},{}", label, point.far, point.tar);
    }

    let _ = writeln!(
        out,
        "{},genuine_count,,{}",
        label,
        metrics.genuine_scores.len()
    );
    let _ = writeln!(
        out,
        "{},impostor_count,,{}",
        label,
        metrics.impostor_scores.len()
    );
    let _ = writeln!(out, "{},eer,,{}", label, metrics.eer);
    let _ = writeln!(
        out,
        "{},tar_at_far,{},{}",
        label, metrics.target_far, metrics.tar_at_far
    );
    match metrics.decision_threshold {
        Some(threshold) => {
            let _ = writeln!(out, "{},accuracy,{},{}", label, threshold, metrics.accuracy);
        }
        None => {
            let _ = writeln!(out, "{},accuracy,NA,{}", label, metrics.accuracy);
        }
    }

    out
}

/// Write the CSV report for one evaluation. The label tags every row so an
/// external plotter can overlay several systems' curves by series key.
pub fn write_report<P: AsRef<Path>>(
    metrics: &Metrics,
    label: &str,
    path: P,
) -> Result<(), ReportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, render(metrics, label)).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote report {} ({})", path.display(), label);
    Ok(())
}
