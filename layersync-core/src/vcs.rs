//! The external version-control collaborator.
//!
//! Implementations run the tool against a working tree they hold as
//! context. [`WorkingTreeScope`] switches that context for the duration of
//! a batch and restores the previous value on every exit path, including
//! unwinding.

use std::ops::{Deref, DerefMut};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Result of one tool invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutcome {
    /// Whether the tool reported success.
    pub success: bool,
    /// Exit status, when the platform reports one.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ToolOutcome {
    /// Successful outcome with the given output.
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed outcome with the given status and error text.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Diagnostic text: standard error when present, else standard output.
    ///
    /// # Examples
    /// ```
    /// use layersync_core::ToolOutcome;
    ///
    /// assert_eq!(ToolOutcome::failed(2, "  boom\n").diagnostic_text(), "boom");
    /// ```
    #[must_use]
    pub fn diagnostic_text(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// A version-control tool able to ingest artifacts into a working tree.
pub trait VersionControl {
    /// Working tree the tool currently operates in.
    fn working_tree(&self) -> Option<&Utf8Path>;

    /// Replace the working-tree context, returning the previous one.
    fn set_working_tree(&mut self, tree: Option<Utf8PathBuf>) -> Option<Utf8PathBuf>;

    /// Import one artifact, replacing an existing layer of the same name
    /// when `replace_existing` is set.
    fn import(
        &mut self,
        artifact: &Utf8Path,
        replace_existing: bool,
    ) -> Result<ToolOutcome, VersionControlError>;

    /// Names of the layers tracked in the working tree.
    fn list_layers(&mut self) -> Result<Vec<String>, VersionControlError>;
}

/// Errors raised when the tool cannot be driven at all.
#[derive(Debug, Error)]
pub enum VersionControlError {
    /// The tool process could not be started.
    #[error("failed to run {program}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
    /// An artifact path could not be made absolute.
    #[error("cannot resolve artifact path {path}")]
    ResolvePath {
        /// Path as given.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
    /// No working tree has been selected.
    #[error("no working tree selected")]
    NoWorkingTree,
    /// A query command reported failure.
    #[error("{command} failed with status {status:?}: {detail}")]
    Failed {
        /// Command that was run.
        command: String,
        /// Exit status, when known.
        status: Option<i32>,
        /// Diagnostic text from the tool.
        detail: String,
    },
}

/// Guard that points a collaborator at a working tree and restores the
/// previous working tree when dropped.
///
/// # Examples
/// ```
/// use camino::Utf8Path;
/// use layersync_core::{VersionControl, WorkingTreeScope};
/// use layersync_core::test_support::RecordingVersionControl;
///
/// let mut vcs = RecordingVersionControl::default();
/// {
///     let scope = WorkingTreeScope::enter(&mut vcs, Utf8Path::new("/repo"));
///     assert_eq!(scope.working_tree(), Some(Utf8Path::new("/repo")));
/// }
/// assert_eq!(vcs.working_tree(), None);
/// ```
pub struct WorkingTreeScope<'a, V: VersionControl + ?Sized> {
    vcs: &'a mut V,
    previous: Option<Utf8PathBuf>,
}

impl<'a, V: VersionControl + ?Sized> WorkingTreeScope<'a, V> {
    /// Switch `vcs` to `tree` until the guard is dropped.
    pub fn enter(vcs: &'a mut V, tree: &Utf8Path) -> Self {
        let previous = vcs.set_working_tree(Some(tree.to_path_buf()));
        Self { vcs, previous }
    }
}

impl<V: VersionControl + ?Sized> Deref for WorkingTreeScope<'_, V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &*self.vcs
    }
}

impl<V: VersionControl + ?Sized> DerefMut for WorkingTreeScope<'_, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.vcs
    }
}

impl<V: VersionControl + ?Sized> Drop for WorkingTreeScope<'_, V> {
    fn drop(&mut self) {
        let entered = self.vcs.set_working_tree(self.previous.take());
        log::debug!(
            "left working tree {}",
            entered.as_deref().map_or("<none>", Utf8Path::as_str)
        );
    }
}
