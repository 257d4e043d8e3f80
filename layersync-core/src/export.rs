//! Export container layers to single-layer artifacts.
//!
//! Each eligible layer is written to its own artifact, replacing whatever
//! artifact already exists at the layer's path. Failures are isolated to the
//! layer, field or feature that caused them; only errors the driver reports
//! as fatal abort the pass.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::selection::Ineligible;
use crate::{
    ArtifactDriver, ArtifactError, ArtifactSpec, ArtifactWriter, Category, Container,
    ContainerError, Diagnostic, SelectionPolicy, SyncConfig,
};

/// Inputs of an export pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Directory receiving artifacts; created when missing.
    pub output_dir: Utf8PathBuf,
    /// Which layers may be exported.
    pub policy: SelectionPolicy,
    /// Encoding declared on every artifact.
    pub encoding: String,
    /// Export layers that hold no features.
    pub export_empty_layers: bool,
    /// Candidate layer names; `None` means every container layer.
    pub candidates: Option<Vec<String>>,
}

impl ExportRequest {
    /// Build a request covering every container layer.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            policy: SelectionPolicy::from_config(config),
            encoding: config.encoding.clone(),
            export_empty_layers: config.export_empty_layers,
            candidates: None,
        }
    }

    /// Restrict the candidates to `names`, typically the layers tracked by
    /// version control.
    #[must_use]
    pub fn with_candidates(mut self, names: Vec<String>) -> Self {
        self.candidates = Some(names);
        self
    }
}

/// Why a layer was not exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Rejected by the selection policy.
    Ineligible(Ineligible),
    /// Holds no features and empty layers are not exported.
    Empty,
    /// Named as a candidate but absent from the container.
    MissingFromContainer,
}

/// A layer left out of the pass on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLayer {
    /// Layer name.
    pub layer: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A layer written to an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedLayer {
    /// Layer name.
    pub layer: String,
    /// Artifact path.
    pub path: Utf8PathBuf,
    /// Features written.
    pub features: u64,
}

/// Summary of an export pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Layers written.
    pub exported: Vec<ExportedLayer>,
    /// Layers deliberately left out.
    pub skipped: Vec<SkippedLayer>,
    /// One entry per layer whose export failed.
    pub failures: Vec<Diagnostic>,
    /// Field and feature problems inside exported layers.
    pub diagnostics: Vec<Diagnostic>,
    /// Wall-clock duration of the pass.
    pub elapsed: Duration,
}

/// Errors that abort an export pass.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The container layer listing could not be read.
    #[error("failed to list layers of {location}")]
    Container {
        /// Container location.
        location: String,
        /// Underlying cause.
        #[source]
        source: ContainerError,
    },
    /// The output directory could not be created.
    #[error("failed to prepare output directory {path}")]
    OutputDirectory {
        /// Output directory.
        path: Utf8PathBuf,
        /// Underlying cause.
        #[source]
        source: ArtifactError,
    },
    /// The driver cannot produce artifacts at all.
    #[error("export stopped at layer {layer}")]
    Driver {
        /// Layer being exported when the driver failed.
        layer: String,
        /// Underlying cause.
        #[source]
        source: ArtifactError,
    },
    /// The driver cannot write any artifact of this pass.
    #[error("driver {driver} cannot write this export")]
    Unwritable {
        /// Driver name.
        driver: String,
        /// Underlying cause.
        #[source]
        source: ArtifactError,
    },
    /// No candidate layers were supplied.
    #[error("no layers to export")]
    NoLayers,
}

enum LayerOutcome {
    Exported(ExportedLayer),
    Skipped(SkipReason),
    Failed(Diagnostic),
}

/// Export every eligible layer of `container` through `driver`.
///
/// # Examples
/// ```
/// use layersync_core::{ExportRequest, Feature, LayerSchema, SyncConfig, export_layers};
/// use layersync_core::test_support::{MemoryContainer, MemoryDriver};
///
/// # fn main() -> Result<(), layersync_core::ExportError> {
/// let container = MemoryContainer::default()
///     .with_layer(LayerSchema::new("Lokality_p"), vec![Feature::new(None)])
///     .with_layer(LayerSchema::new("qgis_projects"), vec![Feature::new(None)]);
/// let driver = MemoryDriver::default();
/// let request = ExportRequest::from_config(&SyncConfig::default());
///
/// let report = export_layers(&container, &driver, &request)?;
/// assert_eq!(report.exported.len(), 1);
/// assert_eq!(report.skipped.len(), 1);
/// # Ok(())
/// # }
/// ```
pub fn export_layers<C, D>(
    container: &C,
    driver: &D,
    request: &ExportRequest,
) -> Result<ExportReport, ExportError>
where
    C: Container + ?Sized,
    D: ArtifactDriver + ?Sized,
{
    let started = Instant::now();
    let present: BTreeSet<String> = container
        .layer_names()
        .map_err(|source| ExportError::Container {
            location: container.location().to_owned(),
            source,
        })?
        .into_iter()
        .collect();
    let candidates: Vec<String> = match &request.candidates {
        Some(names) if names.is_empty() => return Err(ExportError::NoLayers),
        Some(names) => names.clone(),
        None => present.iter().cloned().collect(),
    };
    driver
        .check_writable(&request.encoding)
        .map_err(|source| ExportError::Unwritable {
            driver: driver.name().to_owned(),
            source,
        })?;
    driver
        .ensure_directory(&request.output_dir)
        .map_err(|source| ExportError::OutputDirectory {
            path: request.output_dir.clone(),
            source,
        })?;

    let mut report = ExportReport::default();
    for layer in candidates {
        let outcome = if let Err(reason) = request.policy.check(&layer) {
            LayerOutcome::Skipped(SkipReason::Ineligible(reason))
        } else if !present.contains(&layer) {
            LayerOutcome::Skipped(SkipReason::MissingFromContainer)
        } else {
            export_layer(container, driver, request, &layer, &mut report.diagnostics)?
        };
        match outcome {
            LayerOutcome::Exported(exported) => {
                log::info!("exported {} ({} features)", exported.layer, exported.features);
                report.exported.push(exported);
            }
            LayerOutcome::Skipped(reason) => {
                log::debug!("skipped {layer}: {reason:?}");
                report.skipped.push(SkippedLayer { layer, reason });
            }
            LayerOutcome::Failed(diagnostic) => {
                log::warn!("{diagnostic}");
                report.failures.push(diagnostic);
            }
        }
    }
    report.elapsed = started.elapsed();
    log::info!(
        "export finished in {:.2?}: {} exported, {} skipped, {} failed",
        report.elapsed,
        report.exported.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}

fn export_layer<C, D>(
    container: &C,
    driver: &D,
    request: &ExportRequest,
    layer: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<LayerOutcome, ExportError>
where
    C: Container + ?Sized,
    D: ArtifactDriver + ?Sized,
{
    let read_failure = |err: &ContainerError| {
        LayerOutcome::Failed(Diagnostic::new(
            Category::ReadFailure,
            layer,
            error_chain(err),
        ))
    };
    let count = match container.feature_count(layer) {
        Ok(count) => count,
        Err(err) => return Ok(read_failure(&err)),
    };
    if count == 0 && !request.export_empty_layers {
        return Ok(LayerOutcome::Skipped(SkipReason::Empty));
    }
    let schema = match container.layer_schema(layer) {
        Ok(schema) => schema,
        Err(err) => return Ok(read_failure(&err)),
    };

    let path = driver.artifact_path(&request.output_dir, layer);
    let spec = ArtifactSpec {
        layer_name: schema.name.clone(),
        srs: schema.srs.clone(),
        geometry_kind: schema.geometry_kind,
        encoding: request.encoding.clone(),
    };
    let created = driver
        .remove_artifact(&path)
        .and_then(|()| driver.create(&path, &spec));
    let mut writer = match created {
        Ok(writer) => writer,
        Err(source) => return layer_failure(layer, source),
    };

    for field in &schema.fields {
        match writer.create_field(field) {
            Ok(stored) if stored != field.name => diagnostics.push(Diagnostic::new(
                Category::FieldTruncated,
                format!("{layer}.{}", field.name),
                format!("stored as {stored}"),
            )),
            Ok(_) => {}
            Err(source) if source.is_fatal() => {
                drop(writer);
                discard_partial(driver, &path);
                return Err(ExportError::Driver {
                    layer: layer.to_owned(),
                    source,
                });
            }
            Err(source) => diagnostics.push(Diagnostic::new(
                Category::CreationFailure,
                format!("{layer}.{}", field.name),
                error_chain(&source),
            )),
        }
    }

    if let Err(err) = copy_features(container, writer.as_mut(), layer, diagnostics) {
        drop(writer);
        discard_partial(driver, &path);
        return Ok(read_failure(&err));
    }
    match writer.finish() {
        Ok(features) => Ok(LayerOutcome::Exported(ExportedLayer {
            layer: layer.to_owned(),
            path,
            features,
        })),
        Err(source) => {
            discard_partial(driver, &path);
            layer_failure(layer, source)
        }
    }
}

fn copy_features<C, W>(
    container: &C,
    writer: &mut W,
    layer: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), ContainerError>
where
    C: Container + ?Sized,
    W: ArtifactWriter + ?Sized,
{
    container.visit_features(layer, &mut |read| {
        let result = read
            .map_err(|err| (Category::ReadFailure, error_chain(&err)))
            .and_then(|feature| {
                writer
                    .write_feature(&feature)
                    .map_err(|err| (Category::CreationFailure, error_chain(&err)))
            });
        if let Err((category, detail)) = result {
            log::warn!("{layer}: {detail}");
            diagnostics.push(Diagnostic::new(category, layer, detail));
        }
    })
}

fn layer_failure(layer: &str, source: ArtifactError) -> Result<LayerOutcome, ExportError> {
    if source.is_fatal() {
        return Err(ExportError::Driver {
            layer: layer.to_owned(),
            source,
        });
    }
    Ok(LayerOutcome::Failed(Diagnostic::new(
        Category::CreationFailure,
        layer,
        error_chain(&source),
    )))
}

fn discard_partial<D: ArtifactDriver + ?Sized>(driver: &D, path: &Utf8Path) {
    if let Err(err) = driver.remove_artifact(path) {
        log::warn!("failed to discard partial artifact {path}: {err}");
    }
}

/// Render an error and its sources on one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryContainer, MemoryDriver};
    use crate::{Feature, FieldDefn, FieldType, FieldValue, LayerSchema};
    use rstest::{fixture, rstest};

    fn layer(name: &str, features: usize) -> (LayerSchema, Vec<Feature>) {
        let schema = LayerSchema::new(name)
            .with_field(FieldDefn::new("kod", FieldType::Integer32))
            .with_field(FieldDefn::new("nazev", FieldType::String));
        let rows = (0..features)
            .map(|i| {
                Feature::new(None)
                    .with_attribute("kod", FieldValue::Integer(i64::try_from(i).unwrap_or(0)))
                    .with_attribute("nazev", FieldValue::String(format!("{name}-{i}")))
            })
            .collect();
        (schema, rows)
    }

    #[fixture]
    fn container() -> MemoryContainer {
        [
            layer("PlochyRZV_p", 3),
            layer("Lokality_p", 2),
            layer("XDoplnek_l", 1),
            layer("Zpochybneno_p", 0),
            layer("Ostatni_p", 4),
            layer("layer_styles", 1),
        ]
        .into_iter()
        .fold(MemoryContainer::default(), |acc, (schema, rows)| {
            acc.with_layer(schema, rows)
        })
    }

    #[fixture]
    fn request() -> ExportRequest {
        ExportRequest::from_config(&SyncConfig {
            output_dir: Utf8PathBuf::from("/out"),
            ..SyncConfig::default()
        })
    }

    fn skip_reason(report: &ExportReport, layer: &str) -> Option<SkipReason> {
        report
            .skipped
            .iter()
            .find(|skipped| skipped.layer == layer)
            .map(|skipped| skipped.reason)
    }

    #[rstest]
    fn exports_eligible_non_empty_layers(container: MemoryContainer, request: ExportRequest) {
        let driver = MemoryDriver::default();
        let report = export_layers(&container, &driver, &request).expect("export");

        let mut exported: Vec<_> = report.exported.iter().map(|e| e.layer.as_str()).collect();
        exported.sort_unstable();
        assert_eq!(exported, vec!["Lokality_p", "PlochyRZV_p", "XDoplnek_l"]);
        assert_eq!(skip_reason(&report, "Zpochybneno_p"), Some(SkipReason::Empty));
        assert_eq!(
            skip_reason(&report, "Ostatni_p"),
            Some(SkipReason::Ineligible(Ineligible::NotSelected))
        );
        assert_eq!(
            skip_reason(&report, "layer_styles"),
            Some(SkipReason::Ineligible(Ineligible::Denied))
        );
        let artifact = driver
            .artifact(Utf8Path::new("/out/PlochyRZV_p.mem"))
            .expect("artifact written");
        assert_eq!(artifact.features.len(), 3);
        assert_eq!(artifact.field_names(), vec!["kod", "nazev"]);
        assert!(driver.directories().contains(&Utf8PathBuf::from("/out")));
    }

    #[rstest]
    fn exports_empty_layers_when_requested(container: MemoryContainer, mut request: ExportRequest) {
        request.export_empty_layers = true;
        let driver = MemoryDriver::default();
        let report = export_layers(&container, &driver, &request).expect("export");
        assert!(report.exported.iter().any(|e| e.layer == "Zpochybneno_p"));
    }

    #[rstest]
    fn isolates_a_failing_layer(container: MemoryContainer, request: ExportRequest) {
        let driver = MemoryDriver::default().failing_layer("Lokality_p");
        let report = export_layers(&container, &driver, &request).expect("export");

        assert_eq!(report.exported.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subject, "Lokality_p");
        assert_eq!(report.failures[0].category, Category::CreationFailure);
    }

    #[rstest]
    fn unavailable_driver_aborts_the_pass(container: MemoryContainer, request: ExportRequest) {
        let driver = MemoryDriver::default().unavailable();
        let err = export_layers(&container, &driver, &request).expect_err("fatal");
        assert!(matches!(err, ExportError::Unwritable { .. }));
    }

    #[rstest]
    fn unsupported_encoding_keeps_previous_artifacts(
        container: MemoryContainer,
        mut request: ExportRequest,
    ) {
        let driver = MemoryDriver::default().rejecting_encoding("x-klingon");
        export_layers(&container, &driver, &request).expect("first export");
        request.encoding = "x-klingon".to_owned();

        let err = export_layers(&container, &driver, &request).expect_err("fatal");

        assert!(matches!(
            err,
            ExportError::Unwritable {
                source: ArtifactError::UnsupportedEncoding { .. },
                ..
            }
        ));
        let listed = driver.list_artifacts(Utf8Path::new("/out")).expect("list");
        assert_eq!(listed.len(), 3);
    }

    #[rstest]
    fn fatal_field_error_discards_the_partial_artifact(request: ExportRequest) {
        let container = MemoryContainer::default().with_layer(
            LayerSchema::new("Lokality_p")
                .with_field(FieldDefn::new("kod", FieldType::Integer32))
                .with_field(FieldDefn::new("nazev", FieldType::String)),
            vec![Feature::new(None)],
        );
        let driver = MemoryDriver::default().fatal_on_field("nazev");

        let err = export_layers(&container, &driver, &request).expect_err("fatal");

        assert!(matches!(err, ExportError::Driver { ref layer, .. } if layer == "Lokality_p"));
        let listed = driver.list_artifacts(Utf8Path::new("/out")).expect("list");
        assert!(listed.is_empty());
    }

    #[rstest]
    fn replaces_existing_artifacts(container: MemoryContainer, request: ExportRequest) {
        let driver = MemoryDriver::default();
        export_layers(&container, &driver, &request).expect("first export");
        export_layers(&container, &driver, &request).expect("second export");
        let artifact = driver
            .artifact(Utf8Path::new("/out/Lokality_p.mem"))
            .expect("artifact written");
        assert_eq!(artifact.features.len(), 2);
    }

    #[rstest]
    fn tracked_candidates_report_missing_layers(
        container: MemoryContainer,
        request: ExportRequest,
    ) {
        let request =
            request.with_candidates(vec!["Lokality_p".to_owned(), "KoridoryP_p".to_owned()]);
        let driver = MemoryDriver::default();
        let report = export_layers(&container, &driver, &request).expect("export");

        assert_eq!(report.exported.len(), 1);
        assert_eq!(
            skip_reason(&report, "KoridoryP_p"),
            Some(SkipReason::MissingFromContainer)
        );
    }

    #[rstest]
    fn empty_candidate_list_is_fatal(container: MemoryContainer, request: ExportRequest) {
        let request = request.with_candidates(Vec::new());
        let err = export_layers(&container, &MemoryDriver::default(), &request)
            .expect_err("no layers");
        assert!(matches!(err, ExportError::NoLayers));
    }

    #[rstest]
    fn reports_truncated_and_rejected_fields(request: ExportRequest) {
        let container = MemoryContainer::default().with_layer(
            LayerSchema::new("Lokality_p")
                .with_field(FieldDefn::new("nazev_lokality", FieldType::String))
                .with_field(FieldDefn::new("obrazek", FieldType::Binary)),
            vec![Feature::new(None)],
        );
        let driver = MemoryDriver::default().with_max_field_len(10);
        let report = export_layers(&container, &driver, &request).expect("export");

        let categories: Vec<_> = report.diagnostics.iter().map(|d| d.category).collect();
        assert_eq!(
            categories,
            vec![Category::FieldTruncated, Category::CreationFailure]
        );
        assert_eq!(report.exported.len(), 1);
    }
}
