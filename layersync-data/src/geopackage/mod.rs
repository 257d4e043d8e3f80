//! GeoPackage containers backed by SQLite.
//!
//! [`GeoPackage`] implements [`Container`]: layers are the feature and
//! attribute tables registered in `gpkg_contents`, and an edit is one SQLite
//! transaction that rolls back when dropped uncommitted.

mod builder;
mod edit;
mod project;
pub(crate) mod schema;

use camino::{Utf8Path, Utf8PathBuf};
use layersync_core::{
    Container, ContainerError, Feature, FeatureVisitor, FieldDefn, FieldType, FieldValue,
    GeometryKind, LayerSchema,
};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Error as SqliteError, OpenFlags, Row};
use thiserror::Error;

use crate::wkb::decode_gpkg_geometry;

pub use builder::GeoPackageBuilder;
pub use edit::GeoPackageEdit;
pub use project::{PROJECT_TABLE, ProjectSaveMode, prepare_project_table};

use schema::{TableLayout, quote_ident};

/// Errors raised when opening or maintaining a GeoPackage.
#[derive(Debug, Error)]
pub enum GeoPackageError {
    /// SQLite could not open the file.
    #[error("failed to open GeoPackage {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The file is a database but not a GeoPackage.
    #[error("{path} is not a GeoPackage: gpkg_contents is missing")]
    NotGeoPackage {
        /// Database path.
        path: Utf8PathBuf,
    },
    /// A required table does not exist.
    #[error("table {table} not found in {path}")]
    MissingTable {
        /// Database path.
        path: Utf8PathBuf,
        /// Missing table.
        table: String,
    },
    /// A statement failed.
    #[error("statement failed on {path}")]
    Statement {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

/// An open GeoPackage file.
#[derive(Debug)]
pub struct GeoPackage {
    path: Utf8PathBuf,
    connection: Connection,
}

impl GeoPackage {
    /// Open an existing GeoPackage for reading and writing.
    ///
    /// The file is never created: a missing path, a non-SQLite file and a
    /// database without `gpkg_contents` are all open failures.
    pub fn open(path: &Utf8Path) -> Result<Self, GeoPackageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection =
            Connection::open_with_flags(path.as_std_path(), flags).map_err(|source| {
                GeoPackageError::Open {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        let registered =
            schema::table_exists(&connection, "gpkg_contents").map_err(|source| {
                GeoPackageError::Open {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        if !registered {
            return Err(GeoPackageError::NotGeoPackage {
                path: path.to_path_buf(),
            });
        }
        log::debug!("opened GeoPackage {path}");
        Ok(Self {
            path: path.to_path_buf(),
            connection,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn layout(&self, layer: &str) -> Result<TableLayout, ContainerError> {
        let registered =
            schema::is_layer(&self.connection, layer).map_err(|source| read_error(layer, source))?;
        if !registered {
            return Err(ContainerError::MissingLayer {
                layer: layer.to_owned(),
            });
        }
        TableLayout::load(&self.connection, layer).map_err(|source| read_error(layer, source))
    }
}

pub(crate) fn read_error(layer: &str, source: SqliteError) -> ContainerError {
    ContainerError::Read {
        layer: layer.to_owned(),
        source: Box::new(source),
    }
}

impl Container for GeoPackage {
    type Edit<'a> = GeoPackageEdit<'a>;

    fn location(&self) -> &str {
        self.path.as_str()
    }

    fn layer_names(&self) -> Result<Vec<String>, ContainerError> {
        schema::list_layers(&self.connection).map_err(|source| ContainerError::Open {
            location: self.path.to_string(),
            source: Box::new(source),
        })
    }

    fn layer_schema(&self, layer: &str) -> Result<LayerSchema, ContainerError> {
        let layout = self.layout(layer)?;
        let mut schema = LayerSchema::new(layer);
        schema.fields = layout.fields;
        if let Some(geometry) = layout.geometry {
            schema.geometry_kind = geometry.kind;
            schema.srs = schema::spatial_ref(&self.connection, geometry.srs_id)
                .map_err(|source| read_error(layer, source))?;
        } else {
            schema.geometry_kind = GeometryKind::None;
        }
        Ok(schema)
    }

    fn feature_count(&self, layer: &str) -> Result<u64, ContainerError> {
        self.layout(layer)?;
        let sql = format!("SELECT count(*) FROM {}", quote_ident(layer));
        let count: i64 = self
            .connection
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|source| read_error(layer, source))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn visit_features(
        &self,
        layer: &str,
        visitor: &mut FeatureVisitor<'_>,
    ) -> Result<(), ContainerError> {
        let layout = self.layout(layer)?;
        let mut columns = vec![quote_ident(&layout.key)];
        if let Some(geometry) = &layout.geometry {
            columns.push(quote_ident(&geometry.name));
        }
        columns.extend(layout.fields.iter().map(|field| quote_ident(&field.name)));
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(layer),
            quote_ident(&layout.key)
        );

        let mut statement = self
            .connection
            .prepare(&sql)
            .map_err(|source| read_error(layer, source))?;
        let mut rows = statement
            .query([])
            .map_err(|source| read_error(layer, source))?;
        while let Some(row) = rows.next().map_err(|source| read_error(layer, source))? {
            visitor(decode_row(layer, &layout, row));
        }
        Ok(())
    }

    fn begin_edit(&mut self) -> Result<Self::Edit<'_>, ContainerError> {
        let location = self.path.as_str();
        let transaction =
            self.connection
                .transaction()
                .map_err(|source| ContainerError::Transaction {
                    location: location.to_owned(),
                    source: Box::new(source),
                })?;
        Ok(GeoPackageEdit::new(location, transaction))
    }
}

fn decode_row(layer: &str, layout: &TableLayout, row: &Row<'_>) -> Result<Feature, ContainerError> {
    let fid: i64 = row.get(0).map_err(|source| read_error(layer, source))?;
    let feature_error = |source: layersync_core::BoxError| ContainerError::Feature {
        layer: layer.to_owned(),
        fid,
        source,
    };

    let mut index = 1;
    let mut feature = Feature::new(None).with_fid(fid);
    if layout.geometry.is_some() {
        let raw = row
            .get_ref(index)
            .map_err(|source| feature_error(Box::new(source)))?;
        feature.geometry = match raw {
            ValueRef::Blob(blob) => {
                decode_gpkg_geometry(blob).map_err(|source| feature_error(Box::new(source)))?
            }
            _ => None,
        };
        index += 1;
    }
    for field in &layout.fields {
        let raw = row
            .get_ref(index)
            .map_err(|source| feature_error(Box::new(source)))?;
        let value = field_value(field, raw).map_err(|source| feature_error(Box::new(source)))?;
        feature.set_attribute(field.name.clone(), value);
        index += 1;
    }
    Ok(feature)
}

fn field_value(
    field: &FieldDefn,
    raw: ValueRef<'_>,
) -> Result<Option<FieldValue>, std::str::Utf8Error> {
    let value = match raw {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(number) if field.field_type == FieldType::Boolean => {
            FieldValue::Boolean(number != 0)
        }
        ValueRef::Integer(number) => FieldValue::Integer(number),
        ValueRef::Real(number) => FieldValue::Real(number),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)?.to_owned();
            match field.field_type {
                FieldType::Date => FieldValue::Date(text),
                FieldType::DateTime => FieldValue::DateTime(text),
                _ => FieldValue::String(text),
            }
        }
        ValueRef::Blob(bytes) => FieldValue::Binary(bytes.to_vec()),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests;
