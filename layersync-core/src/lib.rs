//! Core domain model and engines for synchronising geospatial layers.
//!
//! A multi-layer [`Container`] is the master dataset. Its wide integer
//! columns are narrowed by [`coerce_integer_fields`], eligible layers are
//! picked by a [`SelectionPolicy`] and written to single-layer artifacts by
//! [`export_layers`], and [`import_artifacts`] hands those artifacts to a
//! [`VersionControl`] collaborator. Storage formats and the external tool
//! live behind traits so the engines stay free of I/O details.
//!
//! Only failures that make a whole pass meaningless are returned as errors.
//! Everything else is isolated to the layer, field, feature or artifact it
//! concerns and reported as a [`Diagnostic`].

#![forbid(unsafe_code)]

mod artifact;
mod coerce;
mod config;
mod container;
mod diagnostic;
mod export;
mod feature;
mod field;
mod import;
mod inspect;
mod layer;
pub mod selection;
mod srs;
pub mod test_support;
mod vcs;

pub use artifact::{ArtifactDriver, ArtifactError, ArtifactInfo, ArtifactSpec, ArtifactWriter};
pub use coerce::{
    CoercedField, CoercionError, CoercionReport, WORK_FIELD_SUFFIX, coerce_integer_fields,
    work_field_name,
};
pub use config::{DEFAULT_ENCODING, SyncConfig};
pub use container::{
    BoxError, Container, ContainerEdit, ContainerError, FeatureVisitor, IntegerCell,
};
pub use diagnostic::{Category, Diagnostic};
pub use export::{
    ExportError, ExportReport, ExportRequest, ExportedLayer, SkipReason, SkippedLayer,
    export_layers,
};
pub use feature::Feature;
pub use field::{FieldDefn, FieldType, FieldValue, INT32_MAX, INT32_MIN, narrow_to_int32};
pub use import::{ImportError, ImportReport, ImportRequest, import_artifacts};
pub use inspect::{
    ArtifactSummary, InspectError, InspectionReport, LayerSummary, UNKNOWN_SRS,
    UNSPECIFIED_ENCODING, inspect_artifacts, inspect_container,
};
pub use layer::{GeometryKind, LayerSchema, SpatialRef};
pub use selection::{Ineligible, SelectionPolicy};
pub use srs::identify_epsg;
pub use vcs::{ToolOutcome, VersionControl, VersionControlError, WorkingTreeScope};
