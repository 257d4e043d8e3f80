//! Normalisation of the QGIS project table so project saves round-trip.

use rusqlite::Transaction;

use super::schema::table_exists;
use super::{GeoPackage, GeoPackageError};

/// Table in which QGIS stores projects saved into a GeoPackage.
pub const PROJECT_TABLE: &str = "qgis_projects";

const CONVERT_METADATA: [&str; 4] = [
    "ALTER TABLE qgis_projects ADD COLUMN metadata_temp TEXT",
    "UPDATE qgis_projects SET metadata_temp = CAST(metadata AS TEXT)",
    "ALTER TABLE qgis_projects DROP COLUMN metadata",
    "ALTER TABLE qgis_projects RENAME COLUMN metadata_temp TO metadata",
];
const CAST_CONTENT: &str = "UPDATE qgis_projects SET content = CAST(content AS BLOB)";

/// Which project save is being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSaveMode {
    /// First save: `metadata` is rewritten as text and `content` as a blob.
    Initial,
    /// Later saves: only `content` is cast back to a blob.
    Subsequent,
}

/// Rewrite the column storage of [`PROJECT_TABLE`] for `mode`.
///
/// Every statement runs in one transaction; on failure nothing changes.
pub fn prepare_project_table(
    geopackage: &mut GeoPackage,
    mode: ProjectSaveMode,
) -> Result<(), GeoPackageError> {
    let path = geopackage.path.clone();
    let statement_error = |source| GeoPackageError::Statement {
        path: path.clone(),
        source,
    };

    let transaction = geopackage
        .connection
        .transaction()
        .map_err(statement_error)?;
    if !table_exists(&transaction, PROJECT_TABLE).map_err(statement_error)? {
        return Err(GeoPackageError::MissingTable {
            path: path.clone(),
            table: PROJECT_TABLE.to_owned(),
        });
    }
    if mode == ProjectSaveMode::Initial {
        run_all(&transaction, &CONVERT_METADATA).map_err(statement_error)?;
    }
    run_all(&transaction, &[CAST_CONTENT]).map_err(statement_error)?;
    transaction.commit().map_err(statement_error)?;
    log::info!("prepared {PROJECT_TABLE} in {path} ({mode:?})");
    Ok(())
}

fn run_all(transaction: &Transaction<'_>, statements: &[&str]) -> rusqlite::Result<()> {
    for sql in statements {
        transaction.execute(sql, [])?;
    }
    Ok(())
}
