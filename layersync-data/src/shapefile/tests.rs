//! Unit tests for the shapefile driver.

use super::*;
use geo::{Geometry, Point, polygon};
use layersync_core::{FieldValue, SpatialRef};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const KROVAK_WKT: &str = "PROJCS[\"S-JTSK / Krovak East North\",AUTHORITY[\"EPSG\",\"5514\"]]";

#[fixture]
fn out_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("shp")).expect("utf-8 path");
    ShapefileDriver.ensure_directory(&path).expect("create dir");
    (dir, path)
}

fn spec(kind: GeometryKind, encoding: &str) -> ArtifactSpec {
    ArtifactSpec {
        layer_name: "PlochyRZV_p".to_owned(),
        srs: Some(SpatialRef::epsg(5514).with_definition(KROVAK_WKT)),
        geometry_kind: kind,
        encoding: encoding.to_owned(),
    }
}

fn square(size: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: 0.0, y: 0.0), (x: size, y: 0.0), (x: size, y: size), (x: 0.0, y: size), (x: 0.0, y: 0.0)
    ])
}

fn file_len(path: &Utf8Path) -> usize {
    read_all(path).expect("read").len()
}

#[rstest]
fn writes_every_component_and_reads_them_back(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "PlochyRZV_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::MultiPolygon, "windows-1250"))
        .expect("create");
    assert_eq!(
        writer
            .create_field(&FieldDefn::new("oznaceni_plochy", FieldType::String).with_width(20))
            .expect("field"),
        "oznaceni_p"
    );
    writer
        .create_field(&FieldDefn::new("kod", FieldType::Integer32))
        .expect("field");
    writer
        .write_feature(
            &Feature::new(Some(square(4.0)))
                .with_attribute("oznaceni_plochy", FieldValue::String("Žďár".into()))
                .with_attribute("kod", FieldValue::Integer(12)),
        )
        .expect("feature");
    writer
        .write_feature(&Feature::new(None).with_attribute("kod", FieldValue::Integer(13)))
        .expect("null feature");
    assert_eq!(writer.finish().expect("finish"), 2);

    // Polygon record: 8 header + 4 type + 32 box + 8 counts + 4 part + 5 * 16 points.
    let polygon_record = 8 + 4 + 32 + 8 + 4 + 80;
    assert_eq!(file_len(&path), 100 + polygon_record + 8 + 4);
    assert_eq!(file_len(&sidecar_path(&path, "shx")), 100 + 2 * 8);
    assert_eq!(
        read_sidecar(&sidecar_path(&path, "cpg")).expect("cpg"),
        Some("windows-1250".to_owned())
    );

    let info = ShapefileDriver.inspect(&path).expect("inspect");
    assert_eq!(info.geometry_kind, GeometryKind::Polygon);
    assert_eq!(info.feature_count, 2);
    assert_eq!(info.encoding.as_deref(), Some("windows-1250"));
    assert_eq!(info.srs_definition.as_deref(), Some(KROVAK_WKT));
    assert_eq!(
        info.fields,
        vec![
            FieldDefn::new("oznaceni_p", FieldType::String).with_width(20),
            FieldDefn::new("kod", FieldType::Integer32).with_width(11),
        ]
    );
}

#[rstest]
fn diacritic_field_names_survive_a_windows_1250_round_trip(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "PlochyRZV_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::Polygon, "windows-1250"))
        .expect("create");
    let stored: Vec<String> = ["plocha_č", "využití_území"]
        .into_iter()
        .map(|name| {
            writer
                .create_field(&FieldDefn::new(name, FieldType::String).with_width(10))
                .expect("field")
        })
        .collect();
    assert_eq!(stored, vec!["plocha_č", "využití_úz"]);
    writer
        .write_feature(
            &Feature::new(Some(square(1.0)))
                .with_attribute("plocha_č", FieldValue::String("Čáslav".into())),
        )
        .expect("feature");
    writer.finish().expect("finish");

    let info = ShapefileDriver.inspect(&path).expect("inspect");
    let names: Vec<&str> = info.fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(names, vec!["plocha_č", "využití_úz"]);
}

#[rstest]
fn unknown_kind_takes_the_first_geometry(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "Lokality_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::Unknown, "UTF-8"))
        .expect("create");
    writer.write_feature(&Feature::new(None)).expect("null");
    writer
        .write_feature(&Feature::new(Some(Geometry::Point(Point::new(1.0, 2.0)))))
        .expect("point");
    let rejected = writer
        .write_feature(&Feature::new(Some(square(1.0))).with_fid(9))
        .expect_err("polygon in a point file");
    assert!(matches!(rejected, ArtifactError::Feature { fid: Some(9), .. }));
    assert_eq!(writer.finish().expect("finish"), 2);

    let info = ShapefileDriver.inspect(&path).expect("inspect");
    assert_eq!(info.geometry_kind, GeometryKind::Point);
    assert_eq!(info.feature_count, 2);
}

#[rstest]
fn failed_feature_leaves_no_partial_record(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "Zmeny_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::Polygon, "UTF-8"))
        .expect("create");
    writer
        .create_field(&FieldDefn::new("nazev", FieldType::String).with_width(4))
        .expect("field");
    let too_wide = Feature::new(Some(square(1.0)))
        .with_fid(1)
        .with_attribute("nazev", FieldValue::String("Olomouc".into()));
    assert!(writer.write_feature(&too_wide).is_err());
    writer
        .write_feature(
            &Feature::new(Some(square(2.0))).with_attribute("nazev", FieldValue::String("Brno".into())),
        )
        .expect("fits");
    assert_eq!(writer.finish().expect("finish"), 1);
    assert_eq!(file_len(&sidecar_path(&path, "shx")), 108);
    // Header, one record of 1 + 4 bytes, end-of-file marker.
    assert_eq!(file_len(&sidecar_path(&path, "dbf")), 32 + 32 + 1 + 5 + 1);
}

#[rstest]
fn unknown_encoding_is_fatal(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "X_p");
    let err = ShapefileDriver
        .create(&path, &spec(GeometryKind::Point, "x-klingon"))
        .err()
        .expect("unsupported encoding");
    assert!(err.is_fatal());
    assert!(!path.exists());
    assert!(matches!(
        ShapefileDriver.check_writable("x-klingon"),
        Err(ArtifactError::UnsupportedEncoding { .. })
    ));
    ShapefileDriver
        .check_writable(" windows-1250 ")
        .expect("known label");
}

#[rstest]
fn unreadable_sidecars_fall_back_to_sentinels(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "PlochyRZV_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::Point, "windows-1250"))
        .expect("create");
    writer
        .write_feature(&Feature::new(Some(Geometry::Point(Point::new(1.0, 2.0)))))
        .expect("feature");
    writer.finish().expect("finish");
    for extension in ["cpg", "prj"] {
        std::fs::write(sidecar_path(&path, extension), [0xFF, 0xFE, 0x00]).expect("overwrite");
    }

    let info = ShapefileDriver.inspect(&path).expect("inspect");
    assert_eq!(info.encoding, None);
    assert_eq!(info.srs_definition, None);
    assert_eq!(info.feature_count, 1);

    let report = layersync_core::inspect_artifacts(&ShapefileDriver, &dir).expect("inspect dir");
    assert!(report.failures.is_empty());
    let summary = report.entries.first().expect("one artifact");
    assert_eq!(summary.encoding_label(), layersync_core::UNSPECIFIED_ENCODING);
    assert_eq!(summary.srs_label(), layersync_core::UNKNOWN_SRS);
}

#[rstest]
fn binary_and_late_fields_are_rejected(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = ShapefileDriver.artifact_path(&dir, "X_p");
    let mut writer = ShapefileDriver
        .create(&path, &spec(GeometryKind::Point, "UTF-8"))
        .expect("create");
    assert!(matches!(
        writer.create_field(&FieldDefn::new("data", FieldType::Binary)),
        Err(ArtifactError::Field { .. })
    ));
    writer.write_feature(&Feature::new(None)).expect("feature");
    assert!(matches!(
        writer.create_field(&FieldDefn::new("kod", FieldType::Integer32)),
        Err(ArtifactError::Field { .. })
    ));
}

#[rstest]
fn removes_every_component_and_lists_main_files(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    for layer in ["B_p", "A_p"] {
        let path = ShapefileDriver.artifact_path(&dir, layer);
        let writer = ShapefileDriver
            .create(&path, &spec(GeometryKind::Point, "UTF-8"))
            .expect("create");
        writer.finish().expect("finish");
    }
    assert_eq!(
        ShapefileDriver.list_artifacts(&dir).expect("list"),
        vec![dir.join("A_p.shp"), dir.join("B_p.shp")]
    );

    let path = dir.join("A_p.shp");
    ShapefileDriver.remove_artifact(&path).expect("remove");
    ShapefileDriver.remove_artifact(&path).expect("remove twice");
    for extension in COMPONENT_EXTENSIONS {
        assert!(!sidecar_path(&path, extension).exists());
    }
    assert_eq!(
        ShapefileDriver.list_artifacts(&dir).expect("list"),
        vec![dir.join("B_p.shp")]
    );
}

#[rstest]
fn inspect_fails_on_foreign_files(out_dir: (TempDir, Utf8PathBuf)) {
    let (_guard, dir) = out_dir;
    let path = dir.join("bogus.shp");
    write_text(&path, &"x".repeat(120)).expect("write");
    assert!(matches!(
        ShapefileDriver.inspect(&path),
        Err(ArtifactError::Open { .. })
    ));
}
