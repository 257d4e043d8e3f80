//! Behavioural tests for the coercion, export and import engines using
//! rstest-bdd and the in-memory collaborators.

use std::cell::RefCell;

use camino::{Utf8Path, Utf8PathBuf};
use layersync_core::test_support::{MemoryContainer, MemoryDriver, RecordingVersionControl};
use layersync_core::{
    Category, CoercionReport, Container, ExportError, ExportReport, ExportRequest, Feature,
    FieldDefn, FieldType, FieldValue, ImportReport, ImportRequest, LayerSchema, SyncConfig,
    VersionControl, coerce_integer_fields, export_layers, import_artifacts,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const LAYER: &str = "PlochyRZV_p";

/// Shared state for pipeline scenarios.
#[derive(Debug)]
struct PipelineWorld {
    container: RefCell<MemoryContainer>,
    driver: RefCell<MemoryDriver>,
    vcs: RefCell<RecordingVersionControl>,
    coercions: RefCell<Vec<CoercionReport>>,
    snapshots: RefCell<Vec<MemoryContainer>>,
    export: RefCell<Option<Result<ExportReport, ExportError>>>,
    import: RefCell<Option<ImportReport>>,
}

impl PipelineWorld {
    fn new() -> Self {
        Self {
            container: RefCell::new(MemoryContainer::default()),
            driver: RefCell::new(MemoryDriver::default()),
            vcs: RefCell::new(RecordingVersionControl::default().with_working_tree("/home")),
            coercions: RefCell::new(Vec::new()),
            snapshots: RefCell::new(Vec::new()),
            export: RefCell::new(None),
            import: RefCell::new(None),
        }
    }

    fn run_coercion(&self) {
        let report = coerce_integer_fields(&mut *self.container.borrow_mut()).expect("coerce");
        self.coercions.borrow_mut().push(report);
        self.snapshots
            .borrow_mut()
            .push(self.container.borrow().clone());
    }

    fn export_report(&self) -> ExportReport {
        match self.export.borrow().as_ref().expect("export should have run") {
            Ok(report) => report.clone(),
            Err(err) => panic!("unexpected export error: {err}"),
        }
    }
}

#[fixture]
fn world() -> PipelineWorld {
    PipelineWorld::new()
}

fn kod(value: Option<i64>) -> Feature {
    let mut feature = Feature::new(None);
    feature.set_attribute("kod", value.map(FieldValue::Integer));
    feature
}

#[given("a container whose kod field holds the 32-bit boundary values")]
fn given_boundary_container(world: &PipelineWorld) {
    let schema = LayerSchema::new(LAYER).with_field(FieldDefn::new("kod", FieldType::Integer64));
    let features = vec![
        kod(Some(2_147_483_647)),
        kod(Some(2_147_483_648)),
        kod(Some(-2_147_483_648)),
        kod(Some(-2_147_483_649)),
        kod(None),
    ];
    world
        .container
        .replace(MemoryContainer::default().with_layer(schema, features));
}

#[given("a container with {count} eligible layers")]
fn given_eligible_layers(world: &PipelineWorld, count: usize) {
    let container = (0..count).fold(MemoryContainer::default(), |acc, index| {
        acc.with_layer(
            LayerSchema::new(format!("X{index}_p"))
                .with_field(FieldDefn::new("nazev", FieldType::String)),
            vec![Feature::new(None).with_attribute("nazev", FieldValue::String("a".into()))],
        )
    });
    world.container.replace(container);
}

#[given("an artifact driver that cannot create {layer}")]
fn given_failing_driver(world: &PipelineWorld, layer: String) {
    world
        .driver
        .replace(MemoryDriver::default().failing_layer(&layer));
}

#[given("an unavailable artifact driver")]
fn given_unavailable_driver(world: &PipelineWorld) {
    world.driver.replace(MemoryDriver::default().unavailable());
}

#[given("an artifact directory holding {count} artifacts")]
fn given_artifact_directory(world: &PipelineWorld, count: usize) {
    let names: Vec<String> = (0..count).map(|index| format!("L{index}_p")).collect();
    world
        .driver
        .replace(MemoryDriver::default().with_artifacts("/out", names));
}

#[given("a version control tool that rejects {file}")]
fn given_rejecting_tool(world: &PipelineWorld, file: String) {
    world.vcs.replace(
        RecordingVersionControl::default()
            .with_working_tree("/home")
            .failing_on(&file),
    );
}

#[when("the schema coercion pass runs")]
fn when_coercion_runs(world: &PipelineWorld) {
    world.run_coercion();
}

#[when("the schema coercion pass runs twice")]
fn when_coercion_runs_twice(world: &PipelineWorld) {
    world.run_coercion();
    world.run_coercion();
}

#[when("the layers are exported")]
fn when_layers_exported(world: &PipelineWorld) {
    let request = ExportRequest::from_config(&SyncConfig {
        output_dir: Utf8PathBuf::from("/out"),
        ..SyncConfig::default()
    });
    let result = export_layers(
        &*world.container.borrow(),
        &*world.driver.borrow(),
        &request,
    );
    world.export.replace(Some(result));
}

#[when("the artifacts are imported")]
fn when_artifacts_imported(world: &PipelineWorld) {
    let request = ImportRequest {
        artifact_dir: Utf8PathBuf::from("/out"),
        working_tree: Utf8PathBuf::from("/repo"),
        replace_existing: true,
    };
    let report = import_artifacts(
        &*world.driver.borrow(),
        &mut *world.vcs.borrow_mut(),
        &request,
    )
    .expect("import");
    world.import.replace(Some(report));
}

#[then("kod is stored as a 32-bit integer")]
fn then_kod_narrowed(world: &PipelineWorld) {
    let schema = world
        .container
        .borrow()
        .layer_schema(LAYER)
        .expect("schema");
    assert_eq!(
        schema.field("kod").map(|field| field.field_type),
        Some(FieldType::Integer32)
    );
}

#[then("{count} overflow losses are reported")]
fn then_overflow_losses(world: &PipelineWorld, count: usize) {
    let coercions = world.coercions.borrow();
    let report = coercions.first().expect("coercion report");
    let losses = report
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.category == Category::ValueOverflow)
        .count();
    assert_eq!(losses, count);
}

#[then("null values pass through unchanged")]
fn then_nulls_pass_through(world: &PipelineWorld) {
    let container = world.container.borrow();
    let last = container.features(LAYER).last().expect("feature");
    assert_eq!(last.attribute("kod"), None);
}

#[then("the second pass changes nothing")]
fn then_second_pass_idle(world: &PipelineWorld) {
    let coercions = world.coercions.borrow();
    let second = coercions.get(1).expect("second report");
    assert!(second.coerced.is_empty());
    assert!(second.diagnostics.is_empty());
    let snapshots = world.snapshots.borrow();
    assert_eq!(snapshots.first(), snapshots.get(1));
}

#[then("{count} artifacts are written")]
fn then_artifacts_written(world: &PipelineWorld, count: usize) {
    assert_eq!(world.export_report().exported.len(), count);
}

#[then("exactly {count} layer failure is reported")]
fn then_layer_failures(world: &PipelineWorld, count: usize) {
    assert_eq!(world.export_report().failures.len(), count);
}

#[then("the export pass fails with a driver error")]
fn then_driver_error(world: &PipelineWorld) {
    let export = world.export.borrow();
    assert!(matches!(
        export.as_ref(),
        Some(Err(ExportError::Driver { .. } | ExportError::Unwritable { .. }))
    ));
}

#[then("{imported} imports succeed and {failed} fails")]
fn then_import_counts(world: &PipelineWorld, imported: usize, failed: usize) {
    let import = world.import.borrow();
    let report = import.as_ref().expect("import report");
    assert_eq!(report.imported.len(), imported);
    assert_eq!(report.failures.len(), failed);
}

#[then("the original working tree is restored")]
fn then_working_tree_restored(world: &PipelineWorld) {
    assert_eq!(
        world.vcs.borrow().working_tree(),
        Some(Utf8Path::new("/home"))
    );
}

#[scenario(path = "tests/features/pipeline.feature", index = 0)]
fn coercion_reports_overflow(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 1)]
fn coercion_is_rerunnable(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 2)]
fn export_isolates_failures(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 3)]
fn export_stops_on_driver_failure(world: PipelineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/pipeline.feature", index = 4)]
fn import_isolates_failures(world: PipelineWorld) {
    let _ = world;
}
