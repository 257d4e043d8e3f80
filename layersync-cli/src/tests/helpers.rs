//! Test helpers building on-disk GeoPackages for CLI runs.

use camino::Utf8PathBuf;
use geo::{Geometry, polygon};
use layersync_core::{
    Feature, FieldDefn, FieldType, FieldValue, GeometryKind, LayerSchema, SpatialRef,
};
use layersync_data::GeoPackageBuilder;
use rusqlite::Connection;
use tempfile::TempDir;

use super::*;

const KROVAK_WKT: &str = "PROJCS[\"S-JTSK / Krovak East North\",AUTHORITY[\"EPSG\",\"5514\"]]";

/// A temporary directory holding a planning GeoPackage.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub(super) fn container(&self) -> Utf8PathBuf {
        self.path("plan.gpkg")
    }

    pub(super) fn output_dir(&self) -> Utf8PathBuf {
        self.path("shp")
    }

    /// Write `plan.gpkg` with a populated, an empty and a system layer.
    pub(super) fn write_plan(&self) {
        let krovak = SpatialRef::epsg(5514).with_definition(KROVAK_WKT);
        let parcel = |kod: i64| {
            Feature::new(Some(Geometry::Polygon(polygon![
                (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 0.0)
            ])))
            .with_attribute("kod", FieldValue::Integer(kod))
        };
        GeoPackageBuilder::new(&self.container())
            .with_layer(
                LayerSchema::new("PlochyRZV_p")
                    .with_geometry_kind(GeometryKind::Polygon)
                    .with_srs(krovak.clone())
                    .with_field(FieldDefn::new("kod", FieldType::Integer64)),
                vec![parcel(12), parcel(3_000_000_000)],
            )
            .with_layer(
                LayerSchema::new("Lokality_p")
                    .with_geometry_kind(GeometryKind::Polygon)
                    .with_srs(krovak),
                Vec::new(),
            )
            .with_layer(
                LayerSchema::new("layer_styles")
                    .with_geometry_kind(GeometryKind::None)
                    .with_field(FieldDefn::new("styleName", FieldType::String)),
                vec![Feature::new(None)
                    .with_attribute("styleName", FieldValue::String("default".into()))],
            )
            .build()
            .expect("build geopackage");
    }

    /// Add a QGIS project table to `plan.gpkg`.
    pub(super) fn add_project_table(&self) {
        let connection = Connection::open(self.container().as_std_path()).expect("open");
        connection
            .execute_batch(
                "CREATE TABLE qgis_projects (name TEXT PRIMARY KEY, metadata BLOB, content BLOB);
                 INSERT INTO qgis_projects VALUES ('plan', CAST('{}' AS BLOB), 'xml');",
            )
            .expect("seed project table");
    }
}

/// Parse `args` after the program name and run the command, capturing its
/// report.
pub(super) fn run_cli(args: &[&str]) -> Result<String, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("layersync").chain(args.iter().copied()))
        .map_err(CliError::ArgumentParsing)?;
    let mut buffer = Vec::new();
    run_command(cli.command, &mut buffer)?;
    Ok(String::from_utf8(buffer).expect("utf-8 report"))
}
