//! Storage adapters for layersync.
//!
//! - [`geopackage`]: GeoPackage containers over SQLite, including the QGIS
//!   project-table normalisation (feature `geopackage`).
//! - [`shapefile`]: the ESRI Shapefile artifact driver (feature
//!   `shapefile`).
//! - [`kart`]: the Kart command-line collaborator (feature `kart`).
//! - [`wkb`]: the GeoPackage geometry codec.
//! - [`drivers`]: lookup of artifact drivers by name.
#![forbid(unsafe_code)]

pub mod drivers;
#[cfg(feature = "geopackage")]
pub mod geopackage;
#[cfg(feature = "kart")]
pub mod kart;
#[cfg(feature = "shapefile")]
pub mod shapefile;
pub mod wkb;

pub use drivers::{DEFAULT_DRIVER, DRIVERS, DriverInfo, artifact_driver};
#[cfg(feature = "geopackage")]
pub use geopackage::{
    GeoPackage, GeoPackageBuilder, GeoPackageEdit, GeoPackageError, PROJECT_TABLE, ProjectSaveMode,
    prepare_project_table,
};
#[cfg(feature = "kart")]
pub use kart::KartCli;
#[cfg(feature = "shapefile")]
pub use shapefile::{ShapefileDriver, ShapefileError};
pub use wkb::{
    GeometryCodecError, MAX_NESTING, decode_gpkg_geometry, decode_wkb, encode_gpkg_geometry,
};
