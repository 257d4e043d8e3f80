//! Hand exported artifacts to version control, one call per artifact.

use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::export::error_chain;
use crate::{
    ArtifactDriver, ArtifactError, Category, Diagnostic, SyncConfig, VersionControl,
    WorkingTreeScope,
};

/// Inputs of an import pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// Directory holding the artifacts.
    pub artifact_dir: Utf8PathBuf,
    /// Version-controlled working tree receiving them.
    pub working_tree: Utf8PathBuf,
    /// Replace tracked layers of the same name.
    pub replace_existing: bool,
}

impl ImportRequest {
    /// Import the artifacts exported under `config` into `working_tree`.
    #[must_use]
    pub fn from_config(config: &SyncConfig, working_tree: Utf8PathBuf) -> Self {
        Self {
            artifact_dir: config.output_dir.clone(),
            working_tree,
            replace_existing: config.replace_existing,
        }
    }
}

/// Summary of an import pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Artifacts the tool accepted.
    pub imported: Vec<Utf8PathBuf>,
    /// One entry per artifact the tool rejected or could not process.
    pub failures: Vec<Diagnostic>,
    /// Wall-clock duration of the pass.
    pub elapsed: Duration,
}

/// Errors that abort an import pass.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The artifact directory could not be listed.
    #[error("failed to list artifacts in {path}")]
    List {
        /// Artifact directory.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: ArtifactError,
    },
}

/// Import every artifact found in `request.artifact_dir`.
///
/// Artifacts are attempted in path order and a failure never stops the
/// batch. The collaborator's working tree is switched for the batch and
/// restored afterwards, even when the collaborator panics.
///
/// # Examples
/// ```
/// use camino::{Utf8Path, Utf8PathBuf};
/// use layersync_core::{ImportRequest, VersionControl, import_artifacts};
/// use layersync_core::test_support::{MemoryDriver, RecordingVersionControl};
///
/// # fn main() -> Result<(), layersync_core::ImportError> {
/// let driver = MemoryDriver::default().with_artifacts("/out", ["A_p", "B_p"]);
/// let mut vcs = RecordingVersionControl::default().failing_on("B_p.mem");
/// let request = ImportRequest {
///     artifact_dir: Utf8PathBuf::from("/out"),
///     working_tree: Utf8PathBuf::from("/repo"),
///     replace_existing: true,
/// };
///
/// let report = import_artifacts(&driver, &mut vcs, &request)?;
/// assert_eq!(report.imported, vec![Utf8PathBuf::from("/out/A_p.mem")]);
/// assert_eq!(report.failures.len(), 1);
/// assert_eq!(vcs.working_tree(), None);
/// # Ok(())
/// # }
/// ```
pub fn import_artifacts<D, V>(
    driver: &D,
    vcs: &mut V,
    request: &ImportRequest,
) -> Result<ImportReport, ImportError>
where
    D: ArtifactDriver + ?Sized,
    V: VersionControl + ?Sized,
{
    let started = Instant::now();
    let artifacts = driver
        .list_artifacts(&request.artifact_dir)
        .map_err(|source| ImportError::List {
            path: request.artifact_dir.clone(),
            source,
        })?;
    let mut report = ImportReport::default();
    let mut scope = WorkingTreeScope::enter(vcs, &request.working_tree);
    for artifact in artifacts {
        let failure = match scope.import(&artifact, request.replace_existing) {
            Ok(outcome) if outcome.success => None,
            Ok(outcome) => Some(outcome.diagnostic_text().to_owned()),
            Err(err) => Some(error_chain(&err)),
        };
        if let Some(detail) = failure {
            log::warn!("import of {artifact} failed: {detail}");
            report
                .failures
                .push(Diagnostic::new(Category::ToolFailure, artifact.as_str(), detail));
        } else {
            log::info!("imported {artifact}");
            report.imported.push(artifact);
        }
    }
    drop(scope);
    report.elapsed = started.elapsed();
    log::info!(
        "import finished in {:.2?}: {} imported, {} failed",
        report.elapsed,
        report.imported.len(),
        report.failures.len()
    );
    Ok(report)
}
