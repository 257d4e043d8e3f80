//! Catalogue queries shared by the read path and the edit transaction.
//!
//! Everything here takes a plain [`Connection`] so a [`rusqlite::Transaction`]
//! can be passed through deref.

use layersync_core::{FieldDefn, FieldType, GeometryKind, SpatialRef};
use rusqlite::{Connection, OptionalExtension, params};

/// Column used to address rows when a table declares no integer key.
pub(crate) const ROWID: &str = "rowid";

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `table` exists in the database.
pub(crate) fn table_exists(connection: &Connection, table: &str) -> rusqlite::Result<bool> {
    connection.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )
}

/// Feature and attribute tables registered in `gpkg_contents`, by name.
pub(crate) fn list_layers(connection: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut statement = connection.prepare(
        "SELECT table_name FROM gpkg_contents
         WHERE data_type IN ('features', 'attributes')
         ORDER BY table_name",
    )?;
    let names = statement.query_map([], |row| row.get(0))?;
    names.collect()
}

/// Whether `table` is a registered layer.
pub(crate) fn is_layer(connection: &Connection, table: &str) -> rusqlite::Result<bool> {
    connection.query_row(
        "SELECT EXISTS (SELECT 1 FROM gpkg_contents
         WHERE table_name = ?1 AND data_type IN ('features', 'attributes'))",
        params![table],
        |row| row.get(0),
    )
}

/// Geometry column registration of a feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GeometryColumn {
    pub name: String,
    pub kind: GeometryKind,
    pub srs_id: i32,
}

/// Physical layout of a layer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableLayout {
    /// Integer primary key, or [`ROWID`] when none is declared.
    pub key: String,
    pub geometry: Option<GeometryColumn>,
    /// Attribute columns in declaration order.
    pub fields: Vec<FieldDefn>,
    /// Every physical column name, attributes or not.
    pub columns: Vec<String>,
}

impl TableLayout {
    pub(crate) fn load(connection: &Connection, table: &str) -> rusqlite::Result<Self> {
        let geometry = geometry_column(connection, table)?;
        let mut statement =
            connection.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = statement.query_map(params![table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut key = None;
        let mut fields = Vec::new();
        let mut columns = Vec::new();
        for row in rows {
            let (name, declared, pk) = row?;
            columns.push(name.clone());
            let is_geometry = geometry
                .as_ref()
                .is_some_and(|column| column.name.eq_ignore_ascii_case(&name));
            if pk > 0 && key.is_none() && declared.eq_ignore_ascii_case("INTEGER") {
                key = Some(name);
            } else if !is_geometry {
                fields.push(field_from_declared(name, &declared));
            }
        }
        Ok(Self {
            key: key.unwrap_or_else(|| ROWID.to_owned()),
            geometry,
            fields,
            columns,
        })
    }

    /// Whether a physical column with `name` exists (SQLite compares
    /// identifiers case-insensitively).
    pub(crate) fn has_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|column| column.eq_ignore_ascii_case(name))
    }

    pub(crate) fn field(&self, name: &str) -> Option<&FieldDefn> {
        self.fields.iter().find(|field| field.name == name)
    }
}

fn geometry_column(
    connection: &Connection,
    table: &str,
) -> rusqlite::Result<Option<GeometryColumn>> {
    if !table_exists(connection, "gpkg_geometry_columns")? {
        return Ok(None);
    }
    connection
        .query_row(
            "SELECT column_name, geometry_type_name, srs_id
             FROM gpkg_geometry_columns WHERE table_name = ?1",
            params![table],
            |row| {
                Ok(GeometryColumn {
                    name: row.get(0)?,
                    kind: GeometryKind::from_type_name(&row.get::<_, String>(1)?),
                    srs_id: row.get(2)?,
                })
            },
        )
        .optional()
}

/// Spatial reference registered under `srs_id`, or `None` for the
/// undefined systems.
pub(crate) fn spatial_ref(
    connection: &Connection,
    srs_id: i32,
) -> rusqlite::Result<Option<SpatialRef>> {
    if srs_id <= 0 {
        return Ok(None);
    }
    let found = connection
        .query_row(
            "SELECT organization, organization_coordsys_id, definition
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            params![srs_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    Ok(found.and_then(|(authority, code, definition)| {
        let definition = definition.filter(|text| !text.trim().eq_ignore_ascii_case("undefined"));
        (code > 0).then(|| SpatialRef {
            authority: authority.to_ascii_uppercase(),
            code,
            definition,
        })
    }))
}

/// Map a declared SQLite column type to a field definition.
pub(crate) fn field_from_declared(name: String, declared: &str) -> FieldDefn {
    let upper = declared.trim().to_ascii_uppercase();
    let (base, width) = match upper.split_once('(') {
        Some((head, tail)) => (
            head.trim().to_owned(),
            tail.trim_end_matches(')').trim().parse::<u16>().ok(),
        ),
        None => (upper.clone(), None),
    };
    let field_type = match base.as_str() {
        "MEDIUMINT" | "SMALLINT" | "TINYINT" => FieldType::Integer32,
        "INTEGER" | "INT" | "BIGINT" => FieldType::Integer64,
        "REAL" | "FLOAT" | "DOUBLE" => FieldType::Real,
        "TEXT" => FieldType::String,
        "BLOB" => FieldType::Binary,
        "DATE" => FieldType::Date,
        "DATETIME" => FieldType::DateTime,
        "BOOLEAN" => FieldType::Boolean,
        other if other.contains("INT") => FieldType::Integer64,
        other if other.contains("REAL") || other.contains("FLOA") || other.contains("DOUB") => {
            FieldType::Real
        }
        _ => FieldType::String,
    };
    let defn = FieldDefn::new(name, field_type);
    match width {
        Some(width) if field_type == FieldType::String => defn.with_width(width),
        _ => defn,
    }
}

/// Declared SQLite type for a new column.
pub(crate) fn declared_type(field: &FieldDefn) -> String {
    match field.field_type {
        FieldType::Integer32 => "MEDIUMINT".to_owned(),
        FieldType::Integer64 => "INTEGER".to_owned(),
        FieldType::Real => "REAL".to_owned(),
        FieldType::String => field
            .width
            .map_or_else(|| "TEXT".to_owned(), |width| format!("TEXT({width})")),
        FieldType::Binary => "BLOB".to_owned(),
        FieldType::Date => "DATE".to_owned(),
        FieldType::DateTime => "DATETIME".to_owned(),
        FieldType::Boolean => "BOOLEAN".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("MEDIUMINT", FieldType::Integer32, None)]
    #[case("INTEGER", FieldType::Integer64, None)]
    #[case("bigint", FieldType::Integer64, None)]
    #[case("DOUBLE", FieldType::Real, None)]
    #[case("TEXT(40)", FieldType::String, Some(40))]
    #[case("BLOB", FieldType::Binary, None)]
    #[case("DATETIME", FieldType::DateTime, None)]
    #[case("BOOLEAN", FieldType::Boolean, None)]
    #[case("", FieldType::String, None)]
    fn maps_declared_types(
        #[case] declared: &str,
        #[case] field_type: FieldType,
        #[case] width: Option<u16>,
    ) {
        let defn = field_from_declared("f".to_owned(), declared);
        assert_eq!(defn.field_type, field_type);
        assert_eq!(defn.width, width);
    }

    #[rstest]
    fn declared_type_reads_back_as_the_same_field() {
        for field_type in [
            FieldType::Integer32,
            FieldType::Integer64,
            FieldType::Real,
            FieldType::String,
            FieldType::Binary,
            FieldType::Date,
            FieldType::DateTime,
            FieldType::Boolean,
        ] {
            let defn = FieldDefn::new("f", field_type);
            assert_eq!(field_from_declared("f".to_owned(), &declared_type(&defn)), defn);
        }
    }

    #[rstest]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("kod"), "\"kod\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
