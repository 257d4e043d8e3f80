//! Facade crate for layersync.
//!
//! This crate re-exports the core model and engines and exposes the storage
//! adapters behind feature flags.

#![forbid(unsafe_code)]

pub use layersync_core::{
    ArtifactDriver, ArtifactError, ArtifactInfo, ArtifactSpec, ArtifactSummary, ArtifactWriter,
    Category, CoercionError, CoercionReport, Container, ContainerEdit, ContainerError,
    Diagnostic, ExportError, ExportReport, ExportRequest, Feature, FieldDefn, FieldType,
    FieldValue, GeometryKind, ImportError, ImportReport, ImportRequest, InspectError,
    InspectionReport, LayerSchema, LayerSummary, SelectionPolicy, SkipReason, SpatialRef,
    SyncConfig, VersionControl, VersionControlError, coerce_integer_fields, export_layers,
    import_artifacts, inspect_artifacts, inspect_container,
};

pub use layersync_data::{DEFAULT_DRIVER, artifact_driver};

#[cfg(feature = "geopackage")]
pub use layersync_data::{GeoPackage, GeoPackageError, ProjectSaveMode, prepare_project_table};

#[cfg(feature = "shapefile")]
pub use layersync_data::{ShapefileDriver, ShapefileError};

#[cfg(feature = "kart")]
pub use layersync_data::KartCli;
