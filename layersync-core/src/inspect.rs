//! Read-only reports on artifact directories and containers.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::export::error_chain;
use crate::{
    ArtifactDriver, ArtifactError, Category, Container, ContainerError, Diagnostic, FieldDefn,
    GeometryKind, SpatialRef, identify_epsg,
};

/// Shown when a spatial reference cannot be determined.
pub const UNKNOWN_SRS: &str = "Unknown";
/// Shown when an artifact declares no readable encoding.
pub const UNSPECIFIED_ENCODING: &str = "Not specified";

/// What inspection found in one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    /// Artifact path.
    pub path: Utf8PathBuf,
    /// Tagged or auto-detected spatial reference.
    pub srs: Option<SpatialRef>,
    /// Declared encoding, if any.
    pub encoding: Option<String>,
    /// Stored geometry kind.
    pub geometry_kind: GeometryKind,
    /// Number of features.
    pub feature_count: u64,
    /// Field definitions.
    pub fields: Vec<FieldDefn>,
}

impl ArtifactSummary {
    /// Spatial reference label, or [`UNKNOWN_SRS`].
    #[must_use]
    pub fn srs_label(&self) -> String {
        srs_label(self.srs.as_ref())
    }

    /// Encoding label, or [`UNSPECIFIED_ENCODING`].
    #[must_use]
    pub fn encoding_label(&self) -> &str {
        self.encoding.as_deref().unwrap_or(UNSPECIFIED_ENCODING)
    }
}

/// What inspection found in one container layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    /// Layer name.
    pub name: String,
    /// Spatial reference, if tagged.
    pub srs: Option<SpatialRef>,
    /// Declared geometry kind.
    pub geometry_kind: GeometryKind,
    /// Number of features.
    pub feature_count: u64,
    /// Field definitions.
    pub fields: Vec<FieldDefn>,
}

impl LayerSummary {
    /// Spatial reference label, or [`UNKNOWN_SRS`].
    #[must_use]
    pub fn srs_label(&self) -> String {
        srs_label(self.srs.as_ref())
    }
}

/// Inspection results plus the entries that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionReport<T> {
    /// Successfully inspected entries.
    pub entries: Vec<T>,
    /// One diagnostic per entry that could not be read.
    pub failures: Vec<Diagnostic>,
}

impl<T> Default for InspectionReport<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Errors that stop inspection before any entry is read.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The artifact directory could not be listed.
    #[error("failed to list artifacts in {path}")]
    List {
        /// Directory inspected.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: ArtifactError,
    },
    /// The container layer listing could not be read.
    #[error("failed to list layers of {location}")]
    Container {
        /// Container location.
        location: String,
        /// Underlying cause.
        #[source]
        source: ContainerError,
    },
}

fn srs_label(srs: Option<&SpatialRef>) -> String {
    srs.map_or_else(|| UNKNOWN_SRS.to_owned(), ToString::to_string)
}

/// Inspect every artifact in `dir`.
///
/// Untagged artifacts have their spatial reference detected from the stored
/// projection definition. An artifact that cannot be opened is reported and
/// skipped.
pub fn inspect_artifacts<D>(
    driver: &D,
    dir: &Utf8Path,
) -> Result<InspectionReport<ArtifactSummary>, InspectError>
where
    D: ArtifactDriver + ?Sized,
{
    let paths = driver
        .list_artifacts(dir)
        .map_err(|source| InspectError::List {
            path: dir.to_path_buf(),
            source,
        })?;
    let mut report = InspectionReport::default();
    for path in paths {
        match driver.inspect(&path) {
            Ok(info) => {
                let srs = info
                    .srs
                    .or_else(|| info.srs_definition.as_deref().and_then(identify_epsg));
                report.entries.push(ArtifactSummary {
                    path: info.path,
                    srs,
                    encoding: info.encoding,
                    geometry_kind: info.geometry_kind,
                    feature_count: info.feature_count,
                    fields: info.fields,
                });
            }
            Err(err) => {
                log::warn!("cannot inspect {path}: {err}");
                report.failures.push(Diagnostic::new(
                    Category::OpenFailure,
                    path.as_str(),
                    error_chain(&err),
                ));
            }
        }
    }
    Ok(report)
}

/// Inspect every layer of `container`.
pub fn inspect_container<C>(container: &C) -> Result<InspectionReport<LayerSummary>, InspectError>
where
    C: Container + ?Sized,
{
    let names = container
        .layer_names()
        .map_err(|source| InspectError::Container {
            location: container.location().to_owned(),
            source,
        })?;
    let mut report = InspectionReport::default();
    for name in names {
        let summary = container.layer_schema(&name).and_then(|schema| {
            let feature_count = container.feature_count(&name)?;
            Ok(LayerSummary {
                name: schema.name,
                srs: schema.srs,
                geometry_kind: schema.geometry_kind,
                feature_count,
                fields: schema.fields,
            })
        });
        match summary {
            Ok(summary) => report.entries.push(summary),
            Err(err) => {
                log::warn!("cannot inspect layer {name}: {err}");
                report.failures.push(Diagnostic::new(
                    Category::ReadFailure,
                    name,
                    error_chain(&err),
                ));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryContainer, MemoryDriver};
    use crate::{ArtifactInfo, Feature, FieldType, LayerSchema};
    use rstest::rstest;

    const KROVAK_PRJ: &str = r#"PROJCS["S-JTSK_Krovak_East_North",GEOGCS["GCS_S_JTSK"]]"#;

    fn info(path: &str) -> ArtifactInfo {
        ArtifactInfo {
            path: Utf8PathBuf::from(path),
            srs: None,
            srs_definition: None,
            encoding: None,
            geometry_kind: GeometryKind::Polygon,
            feature_count: 3,
            fields: vec![FieldDefn::new("kod", FieldType::Integer32)],
        }
    }

    #[rstest]
    fn reports_sentinels_and_detected_srs() {
        let mut tagged = info("/out/A_p.mem");
        tagged.srs_definition = Some(KROVAK_PRJ.to_owned());
        tagged.encoding = Some("windows-1250".to_owned());
        let driver = MemoryDriver::default()
            .with_info(tagged)
            .with_info(info("/out/B_p.mem"));

        let report = inspect_artifacts(&driver, Utf8Path::new("/out")).expect("inspect");
        let labels: Vec<_> = report
            .entries
            .iter()
            .map(|entry| (entry.srs_label(), entry.encoding_label().to_owned()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("EPSG:5514".to_owned(), "windows-1250".to_owned()),
                (UNKNOWN_SRS.to_owned(), UNSPECIFIED_ENCODING.to_owned()),
            ]
        );
    }

    #[rstest]
    fn keeps_going_past_unreadable_artifacts() {
        let driver = MemoryDriver::default()
            .with_artifacts("/out", ["A_p"])
            .with_info(info("/out/B_p.mem"))
            .with_unreadable("/out/C_p.mem");
        let report = inspect_artifacts(&driver, Utf8Path::new("/out")).expect("inspect");
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].category, Category::OpenFailure);
    }

    #[rstest]
    fn summarises_container_layers() {
        let container = MemoryContainer::default().with_layer(
            LayerSchema::new("Lokality_p")
                .with_field(FieldDefn::new("kod", FieldType::Integer64))
                .with_srs(SpatialRef::epsg(5514))
                .with_geometry_kind(GeometryKind::MultiPolygon),
            vec![Feature::new(None), Feature::new(None)],
        );
        let report = inspect_container(&container).expect("inspect");
        let layer = report.entries.first().expect("one layer");
        assert_eq!(layer.srs_label(), "EPSG:5514");
        assert_eq!(layer.feature_count, 2);
        assert_eq!(layer.geometry_kind, GeometryKind::MultiPolygon);
    }
}
