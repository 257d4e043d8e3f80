//! Single-layer interchange artifacts and the drivers that produce them.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::{BoxError, Feature, FieldDefn, GeometryKind, SpatialRef};

/// Everything a driver needs to create an artifact for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Source layer name.
    pub layer_name: String,
    /// Spatial reference of the source layer.
    pub srs: Option<SpatialRef>,
    /// Declared geometry kind of the source layer.
    pub geometry_kind: GeometryKind,
    /// Text encoding label written to the encoding sidecar.
    pub encoding: String,
}

/// What a driver can read back from an existing artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Artifact path.
    pub path: Utf8PathBuf,
    /// Spatial reference already tagged on the artifact, if any.
    pub srs: Option<SpatialRef>,
    /// Raw projection definition, used for auto-detection.
    pub srs_definition: Option<String>,
    /// Encoding declared by the sidecar, if present and readable.
    pub encoding: Option<String>,
    /// Geometry kind recorded in the artifact.
    pub geometry_kind: GeometryKind,
    /// Number of stored features.
    pub feature_count: u64,
    /// Field definitions in artifact order.
    pub fields: Vec<FieldDefn>,
}

/// A format backend able to create and read artifacts.
pub trait ArtifactDriver {
    /// Format name used in diagnostics.
    fn name(&self) -> &str;

    /// Extension marking the primary artifact file, without the dot.
    fn extension(&self) -> &str;

    /// Deterministic artifact path for `layer_name` inside `dir`.
    fn artifact_path(&self, dir: &Utf8Path, layer_name: &str) -> Utf8PathBuf {
        dir.join(format!("{layer_name}.{}", self.extension()))
    }

    /// Check that artifacts declaring `encoding` can be written at all.
    ///
    /// Export calls this once before it touches any existing artifact, so a
    /// condition that would fail every layer stops the pass while the
    /// previous output is still intact.
    fn check_writable(&self, encoding: &str) -> Result<(), ArtifactError>;

    /// Create `dir` and its parents when missing.
    fn ensure_directory(&self, dir: &Utf8Path) -> Result<(), ArtifactError>;

    /// Artifact paths found directly inside `dir`, sorted.
    fn list_artifacts(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ArtifactError>;

    /// Delete an artifact and every sidecar belonging to it. Missing files
    /// are not an error.
    fn remove_artifact(&self, path: &Utf8Path) -> Result<(), ArtifactError>;

    /// Start writing a new artifact at `path`.
    fn create(
        &self,
        path: &Utf8Path,
        spec: &ArtifactSpec,
    ) -> Result<Box<dyn ArtifactWriter + '_>, ArtifactError>;

    /// Read the schema, encoding and size of an existing artifact.
    fn inspect(&self, path: &Utf8Path) -> Result<ArtifactInfo, ArtifactError>;
}

/// Incremental writer for one artifact.
pub trait ArtifactWriter {
    /// Declare a field and return the name the artifact actually stores,
    /// which may be shortened to satisfy format limits.
    fn create_field(&mut self, field: &FieldDefn) -> Result<String, ArtifactError>;

    /// Append one feature. Attributes of undeclared fields are ignored.
    fn write_feature(&mut self, feature: &Feature) -> Result<(), ArtifactError>;

    /// Flush everything to storage and return the number of features
    /// written.
    fn finish(self: Box<Self>) -> Result<u64, ArtifactError>;
}

/// Errors raised by artifact drivers.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The format backend cannot be used on this host.
    #[error("driver {driver} unavailable: {reason}")]
    DriverUnavailable {
        /// Driver name.
        driver: String,
        /// Why the driver is unusable.
        reason: String,
    },
    /// The requested text encoding is not supported.
    #[error("unsupported text encoding {label}")]
    UnsupportedEncoding {
        /// Encoding label as configured.
        label: String,
    },
    /// A directory could not be created or listed.
    #[error("failed to access directory {path}")]
    Directory {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// An existing artifact could not be removed.
    #[error("failed to remove artifact {path}")]
    Remove {
        /// Artifact path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// A new artifact could not be created.
    #[error("failed to create artifact {path}")]
    Create {
        /// Artifact path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// An existing artifact could not be opened or parsed.
    #[error("failed to open artifact {path}")]
    Open {
        /// Artifact path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// The format cannot represent a field.
    #[error("field {field} rejected: {reason}")]
    Field {
        /// Field name.
        field: String,
        /// Why the field was rejected.
        reason: String,
    },
    /// The format cannot represent a feature.
    #[error("feature {} rejected: {reason}", fid.map_or_else(|| "<none>".to_owned(), |id| id.to_string()))]
    Feature {
        /// Source feature identifier, when known.
        fid: Option<i64>,
        /// Why the feature was rejected.
        reason: String,
    },
    /// Writing artifact data failed.
    #[error("failed to write artifact {path}")]
    Write {
        /// Artifact path.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
}

impl ArtifactError {
    /// Whether the error will recur for every layer of the pass.
    ///
    /// # Examples
    /// ```
    /// use layersync_core::ArtifactError;
    ///
    /// assert!(ArtifactError::UnsupportedEncoding { label: "x-klingon".into() }.is_fatal());
    /// assert!(!ArtifactError::Field { field: "geom".into(), reason: "binary".into() }.is_fatal());
    /// ```
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DriverUnavailable { .. } | Self::UnsupportedEncoding { .. }
        )
    }
}
