//! Error types emitted by the layersync CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use layersync_core::{
    ArtifactError, CoercionError, ExportError, ImportError, InspectError, VersionControlError,
};
use layersync_data::GeoPackageError;
use thiserror::Error;

/// Errors emitted by the layersync CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Long flag name.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// Two options that select different targets were both given.
    #[error("--{first} and --{second} cannot be combined")]
    ConflictingArguments {
        /// First option.
        first: &'static str,
        /// Second option.
        second: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}")]
    InspectSourcePath {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
    /// The requested artifact format is unknown or was not compiled in.
    #[error(transparent)]
    Driver(#[from] ArtifactError),
    /// The GeoPackage could not be opened.
    #[error("failed to open GeoPackage {path:?}")]
    OpenContainer {
        /// GeoPackage path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: GeoPackageError,
    },
    /// The coercion pass was aborted and rolled back.
    #[error(transparent)]
    Coerce(#[from] CoercionError),
    /// The export pass was aborted.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// The import pass was aborted.
    #[error(transparent)]
    Import(#[from] ImportError),
    /// Inspection could not enumerate its target.
    #[error(transparent)]
    Inspect(#[from] InspectError),
    /// The version-control tool could not list tracked layers.
    #[error("failed to list tracked layers in {working_tree:?}")]
    TrackedLayers {
        /// Working tree queried.
        working_tree: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: VersionControlError,
    },
    /// Normalising the QGIS project table failed.
    #[error("failed to prepare the project table of {path:?}")]
    ProjectTable {
        /// GeoPackage path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: GeoPackageError,
    },
    /// Writing a report failed.
    #[error("failed to write report")]
    WriteOutput(#[source] std::io::Error),
}
