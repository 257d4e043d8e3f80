//! Unit tests for the GeoPackage container.

use super::*;
use camino::Utf8PathBuf;
use geo::{Geometry, Point};
use layersync_core::{ContainerEdit, SpatialRef, coerce_integer_fields};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const KROVAK_WKT: &str = "PROJCS[\"S-JTSK / Krovak East North\",AUTHORITY[\"EPSG\",\"5514\"]]";

fn temp_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 path")
}

fn lokality() -> (LayerSchema, Vec<Feature>) {
    let schema = LayerSchema::new("Lokality_p")
        .with_geometry_kind(GeometryKind::Point)
        .with_srs(SpatialRef::epsg(5514).with_definition(KROVAK_WKT))
        .with_field(FieldDefn::new("kod", FieldType::Integer64))
        .with_field(FieldDefn::new("nazev", FieldType::String).with_width(40))
        .with_field(FieldDefn::new("platnost", FieldType::Date));
    let features = vec![
        Feature::new(Some(Geometry::Point(Point::new(-742_000.5, -1_043_000.25))))
            .with_attribute("kod", FieldValue::Integer(2_147_483_648))
            .with_attribute("nazev", FieldValue::String("Brno".into()))
            .with_attribute("platnost", FieldValue::Date("2024-01-31".into())),
        Feature::new(None).with_attribute("kod", FieldValue::Integer(7)),
    ];
    (schema, features)
}

#[fixture]
fn plan() -> (TempDir, GeoPackage) {
    let dir = TempDir::new().expect("temp dir");
    let (schema, features) = lokality();
    let geopackage = GeoPackageBuilder::new(&temp_path(&dir, "plan.gpkg"))
        .with_layer(schema, features)
        .with_layer(
            LayerSchema::new("Zmeny_t")
                .with_geometry_kind(GeometryKind::None)
                .with_field(FieldDefn::new("cislo", FieldType::Integer64)),
            vec![Feature::new(None).with_attribute("cislo", FieldValue::Integer(1))],
        )
        .build()
        .expect("build gpkg");
    (dir, geopackage)
}

fn collect(geopackage: &GeoPackage, layer: &str) -> Vec<Result<Feature, ContainerError>> {
    let mut seen = Vec::new();
    geopackage
        .visit_features(layer, &mut |feature| seen.push(feature))
        .expect("visit");
    seen
}

#[rstest]
fn refuses_to_create_missing_files() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_path(&dir, "absent.gpkg");
    let err = GeoPackage::open(&path).expect_err("missing file");
    assert!(matches!(err, GeoPackageError::Open { .. }));
    assert!(!path.exists());
}

#[rstest]
fn rejects_plain_sqlite_databases() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_path(&dir, "plain.sqlite");
    Connection::open(path.as_std_path())
        .and_then(|connection| connection.execute_batch("CREATE TABLE t (a INTEGER);"))
        .expect("seed");
    let err = GeoPackage::open(&path).expect_err("no gpkg_contents");
    assert!(matches!(err, GeoPackageError::NotGeoPackage { .. }));
}

#[rstest]
fn lists_feature_and_attribute_layers(plan: (TempDir, GeoPackage)) {
    let (_guard, geopackage) = plan;
    assert_eq!(
        geopackage.layer_names().expect("layers"),
        vec!["Lokality_p".to_owned(), "Zmeny_t".to_owned()]
    );
}

#[rstest]
fn reads_schema_without_key_or_geometry(plan: (TempDir, GeoPackage)) {
    let (_guard, geopackage) = plan;
    let (expected, _) = lokality();
    let schema = geopackage.layer_schema("Lokality_p").expect("schema");
    assert_eq!(schema.fields, expected.fields);
    assert_eq!(schema.geometry_kind, GeometryKind::Point);
    assert_eq!(schema.srs, expected.srs);

    let table = geopackage.layer_schema("Zmeny_t").expect("schema");
    assert_eq!(table.geometry_kind, GeometryKind::None);
    assert_eq!(table.srs, None);
}

#[rstest]
fn unknown_layer_is_missing(plan: (TempDir, GeoPackage)) {
    let (_guard, geopackage) = plan;
    assert!(matches!(
        geopackage.feature_count("gpkg_contents"),
        Err(ContainerError::MissingLayer { .. })
    ));
}

#[rstest]
fn visits_features_in_key_order(plan: (TempDir, GeoPackage)) {
    let (_guard, geopackage) = plan;
    let (_, expected) = lokality();
    let features: Vec<Feature> = collect(&geopackage, "Lokality_p")
        .into_iter()
        .map(|feature| feature.expect("decoded"))
        .collect();

    assert_eq!(geopackage.feature_count("Lokality_p").expect("count"), 2);
    assert_eq!(
        features.iter().map(|feature| feature.fid).collect::<Vec<_>>(),
        vec![Some(1), Some(2)]
    );
    for (actual, wanted) in features.iter().zip(&expected) {
        assert_eq!(actual.geometry, wanted.geometry);
        assert_eq!(
            actual.attributes().collect::<Vec<_>>(),
            wanted.attributes().collect::<Vec<_>>()
        );
    }
}

#[rstest]
fn undecodable_geometry_fails_only_that_feature(plan: (TempDir, GeoPackage)) {
    let (_guard, geopackage) = plan;
    geopackage
        .connection
        .execute("UPDATE Lokality_p SET geom = x'0102' WHERE fid = 1", [])
        .expect("corrupt");
    let results = collect(&geopackage, "Lokality_p");
    assert!(matches!(
        results.first(),
        Some(Err(ContainerError::Feature { fid: 1, .. }))
    ));
    assert!(matches!(results.get(1), Some(Ok(_))));
}

#[rstest]
fn coercion_narrows_columns_in_place(plan: (TempDir, GeoPackage)) {
    let (_guard, mut geopackage) = plan;
    let report = coerce_integer_fields(&mut geopackage).expect("coerce");

    assert_eq!(report.dropped_values(), 1);
    let schema = geopackage.layer_schema("Lokality_p").expect("schema");
    assert_eq!(
        schema.field("kod").map(|field| field.field_type),
        Some(FieldType::Integer32)
    );
    let kod: Vec<Option<FieldValue>> = collect(&geopackage, "Lokality_p")
        .into_iter()
        .map(|feature| feature.expect("decoded").attribute("kod").cloned())
        .collect();
    assert_eq!(kod, vec![None, Some(FieldValue::Integer(7))]);
    assert_eq!(
        geopackage
            .layer_schema("Zmeny_t")
            .expect("schema")
            .field("cislo")
            .map(|field| field.field_type),
        Some(FieldType::Integer32)
    );
}

#[rstest]
fn dropped_edit_rolls_back(plan: (TempDir, GeoPackage)) {
    let (_guard, mut geopackage) = plan;
    {
        let mut edit = geopackage.begin_edit().expect("begin");
        edit.add_field("Lokality_p", &FieldDefn::new("kod_int32", FieldType::Integer32))
            .expect("add");
        edit.delete_field("Lokality_p", "nazev").expect("delete");
    }
    let (expected, _) = lokality();
    assert_eq!(
        geopackage.layer_schema("Lokality_p").expect("schema").fields,
        expected.fields
    );
}

#[rstest]
fn stray_real_in_integer_column_is_dropped_not_fatal(plan: (TempDir, GeoPackage)) {
    let (_guard, mut geopackage) = plan;
    geopackage
        .connection
        .execute(r#"UPDATE "Zmeny_t" SET cislo = 1.5"#, [])
        .expect("store a real");

    let report = coerce_integer_fields(&mut geopackage).expect("coerce");

    assert_eq!(report.dropped_values(), 2);
    assert!(report.diagnostics.iter().any(|diagnostic| {
        diagnostic.category == layersync_core::Category::ReadFailure
            && diagnostic.subject == "Zmeny_t.cislo#1"
    }));
    for (layer, field) in [("Lokality_p", "kod"), ("Zmeny_t", "cislo")] {
        assert_eq!(
            geopackage
                .layer_schema(layer)
                .expect("schema")
                .field(field)
                .map(|defn| defn.field_type),
            Some(FieldType::Integer32)
        );
    }
    let cislo: Vec<Option<FieldValue>> = collect(&geopackage, "Zmeny_t")
        .into_iter()
        .map(|feature| feature.expect("decoded").attribute("cislo").cloned())
        .collect();
    assert_eq!(cislo, vec![None]);
}

#[rstest]
fn edit_rejects_duplicate_and_missing_fields(plan: (TempDir, GeoPackage)) {
    let (_guard, mut geopackage) = plan;
    let mut edit = geopackage.begin_edit().expect("begin");
    assert!(matches!(
        edit.add_field("Lokality_p", &FieldDefn::new("KOD", FieldType::Integer32)),
        Err(ContainerError::DuplicateField { .. })
    ));
    assert!(matches!(
        edit.integer_values("Lokality_p", "poradi"),
        Err(ContainerError::MissingField { .. })
    ));
    assert!(matches!(
        edit.rename_field("Lokality_p", "kod", "nazev"),
        Err(ContainerError::DuplicateField { .. })
    ));
}
