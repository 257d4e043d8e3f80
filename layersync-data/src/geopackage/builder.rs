//! Create GeoPackages from in-memory layers.

use camino::{Utf8Path, Utf8PathBuf};
use layersync_core::{Feature, FieldValue, GeometryKind, LayerSchema};
use rusqlite::types::Value;
use rusqlite::{Connection, Error as SqliteError, Transaction, params, params_from_iter};

use super::schema::{declared_type, quote_ident};
use super::{GeoPackage, GeoPackageError};
use crate::wkb::encode_gpkg_geometry;

const GEOMETRY_COLUMN: &str = "geom";
const KEY_COLUMN: &str = "fid";

const CATALOGUE: &str = "
    PRAGMA application_id = 1196444487;
    PRAGMA user_version = 10300;
    CREATE TABLE gpkg_spatial_ref_sys (
        srs_name TEXT NOT NULL,
        srs_id INTEGER PRIMARY KEY,
        organization TEXT NOT NULL,
        organization_coordsys_id INTEGER NOT NULL,
        definition TEXT NOT NULL,
        description TEXT
    );
    INSERT INTO gpkg_spatial_ref_sys VALUES
        ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL),
        ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL);
    CREATE TABLE gpkg_contents (
        table_name TEXT NOT NULL PRIMARY KEY,
        data_type TEXT NOT NULL,
        identifier TEXT UNIQUE,
        description TEXT DEFAULT '',
        last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        min_x DOUBLE,
        min_y DOUBLE,
        max_x DOUBLE,
        max_y DOUBLE,
        srs_id INTEGER
    );
    CREATE TABLE gpkg_geometry_columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        geometry_type_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL,
        z TINYINT NOT NULL,
        m TINYINT NOT NULL,
        PRIMARY KEY (table_name, column_name)
    );
";

/// Writes a new GeoPackage holding the given layers.
///
/// Feature tables get an `fid` integer key and a `geom` column; layers whose
/// geometry kind is [`GeometryKind::None`] become attribute tables.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use layersync_core::{Container, FieldDefn, FieldType, LayerSchema};
/// use layersync_data::geopackage::GeoPackageBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let geopackage = GeoPackageBuilder::new(Utf8Path::new("plan.gpkg"))
///     .with_layer(
///         LayerSchema::new("Lokality_p").with_field(FieldDefn::new("kod", FieldType::Integer64)),
///         Vec::new(),
///     )
///     .build()?;
/// assert_eq!(geopackage.layer_names()?, vec!["Lokality_p".to_owned()]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GeoPackageBuilder {
    path: Utf8PathBuf,
    layers: Vec<(LayerSchema, Vec<Feature>)>,
}

impl GeoPackageBuilder {
    /// Start a builder targeting `path`, which must not exist yet.
    #[must_use]
    pub fn new(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
            layers: Vec::new(),
        }
    }

    /// Add a layer and its features.
    #[must_use]
    pub fn with_layer(mut self, schema: LayerSchema, features: Vec<Feature>) -> Self {
        self.layers.push((schema, features));
        self
    }

    /// Write the file and open it.
    pub fn build(self) -> Result<GeoPackage, GeoPackageError> {
        let mut connection =
            Connection::open(self.path.as_std_path()).map_err(|source| GeoPackageError::Open {
                path: self.path.clone(),
                source,
            })?;
        let statement_error = |source| GeoPackageError::Statement {
            path: self.path.clone(),
            source,
        };

        let transaction = connection.transaction().map_err(statement_error)?;
        transaction
            .execute_batch(CATALOGUE)
            .map_err(statement_error)?;
        for (schema, features) in &self.layers {
            write_layer(&transaction, schema, features).map_err(statement_error)?;
        }
        transaction.commit().map_err(statement_error)?;
        drop(connection);
        GeoPackage::open(&self.path)
    }
}

fn write_layer(
    transaction: &Transaction<'_>,
    schema: &LayerSchema,
    features: &[Feature],
) -> Result<(), SqliteError> {
    let srs_id = schema.srs.as_ref().map_or(0, |srs| srs.code);
    if let Some(srs) = &schema.srs {
        transaction.execute(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
             (srs_name, srs_id, organization, organization_coordsys_id, definition)
             VALUES (?1, ?2, ?3, ?2, ?4)",
            params![
                srs.to_string(),
                srs.code,
                srs.authority,
                srs.definition.as_deref().unwrap_or("undefined")
            ],
        )?;
    }

    let spatial = schema.geometry_kind != GeometryKind::None;
    let mut columns = vec![format!("{KEY_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT")];
    if spatial {
        columns.push(format!(
            "{GEOMETRY_COLUMN} {}",
            schema.geometry_kind.name().to_ascii_uppercase()
        ));
    }
    columns.extend(
        schema
            .fields
            .iter()
            .map(|field| format!("{} {}", quote_ident(&field.name), declared_type(field))),
    );
    let table = quote_ident(&schema.name);
    transaction.execute(&format!("CREATE TABLE {table} ({})", columns.join(", ")), [])?;

    let data_type = if spatial { "features" } else { "attributes" };
    transaction.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id)
         VALUES (?1, ?2, ?1, ?3)",
        params![schema.name, data_type, spatial.then_some(srs_id)],
    )?;
    if spatial {
        transaction.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, ?3, ?4, 0, 0)",
            params![
                schema.name,
                GEOMETRY_COLUMN,
                schema.geometry_kind.name().to_ascii_uppercase(),
                srs_id
            ],
        )?;
    }

    let mut names = vec![KEY_COLUMN.to_owned()];
    if spatial {
        names.push(GEOMETRY_COLUMN.to_owned());
    }
    names.extend(schema.fields.iter().map(|field| quote_ident(&field.name)));
    let placeholders: Vec<String> = (1..=names.len()).map(|index| format!("?{index}")).collect();
    let mut insert = transaction.prepare(&format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    ))?;

    for feature in features {
        let mut values = vec![feature.fid.map_or(Value::Null, Value::Integer)];
        if spatial {
            values.push(feature.geometry.as_ref().map_or(Value::Null, |geometry| {
                Value::Blob(encode_gpkg_geometry(geometry, srs_id))
            }));
        }
        values.extend(
            schema
                .fields
                .iter()
                .map(|field| feature.attribute(&field.name).map_or(Value::Null, sql_value)),
        );
        insert.execute(params_from_iter(values))?;
    }
    Ok(())
}

fn sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Integer(number) => Value::Integer(*number),
        FieldValue::Real(number) => Value::Real(*number),
        FieldValue::String(text) | FieldValue::Date(text) | FieldValue::DateTime(text) => {
            Value::Text(text.clone())
        }
        FieldValue::Binary(bytes) => Value::Blob(bytes.clone()),
        FieldValue::Boolean(flag) => Value::Integer(i64::from(*flag)),
    }
}
