//! Schema rewrites inside one SQLite transaction.

use layersync_core::{ContainerEdit, ContainerError, FieldDefn, IntegerCell};
use rusqlite::types::ValueRef;
use rusqlite::{Error as SqliteError, Transaction, params};

use super::schema::{self, TableLayout, declared_type, quote_ident};
use super::read_error;

/// Transactional edit of a [`GeoPackage`](super::GeoPackage).
///
/// Dropping the edit without calling [`ContainerEdit::commit`] rolls every
/// statement back.
#[derive(Debug)]
pub struct GeoPackageEdit<'a> {
    location: &'a str,
    transaction: Transaction<'a>,
}

impl<'a> GeoPackageEdit<'a> {
    pub(crate) const fn new(location: &'a str, transaction: Transaction<'a>) -> Self {
        Self {
            location,
            transaction,
        }
    }

    fn layout(&self, layer: &str) -> Result<TableLayout, ContainerError> {
        let registered = schema::is_layer(&self.transaction, layer)
            .map_err(|source| read_error(layer, source))?;
        if !registered {
            return Err(ContainerError::MissingLayer {
                layer: layer.to_owned(),
            });
        }
        TableLayout::load(&self.transaction, layer).map_err(|source| read_error(layer, source))
    }

    fn require_field(&self, layer: &str, field: &str) -> Result<TableLayout, ContainerError> {
        let layout = self.layout(layer)?;
        if layout.field(field).is_none() {
            return Err(ContainerError::MissingField {
                layer: layer.to_owned(),
                field: field.to_owned(),
            });
        }
        Ok(layout)
    }

    fn execute(&self, layer: &str, sql: &str) -> Result<(), ContainerError> {
        log::debug!("{}: {sql}", self.location);
        self.transaction
            .execute(sql, [])
            .map(|_| ())
            .map_err(|source| write_error(layer, source))
    }
}

/// SQLite lets any column hold any storage class.
fn integer_cell(raw: ValueRef<'_>) -> IntegerCell {
    match raw {
        ValueRef::Null => IntegerCell::Null,
        ValueRef::Integer(number) => IntegerCell::Integer(number),
        ValueRef::Real(number) => IntegerCell::Mismatch(format!("real {number}")),
        ValueRef::Text(bytes) => {
            IntegerCell::Mismatch(format!("text {:?}", String::from_utf8_lossy(bytes)))
        }
        ValueRef::Blob(bytes) => IntegerCell::Mismatch(format!("blob of {} bytes", bytes.len())),
    }
}

fn write_error(layer: &str, source: SqliteError) -> ContainerError {
    ContainerError::Write {
        layer: layer.to_owned(),
        source: Box::new(source),
    }
}

impl ContainerEdit for GeoPackageEdit<'_> {
    fn layer_names(&self) -> Result<Vec<String>, ContainerError> {
        schema::list_layers(&self.transaction).map_err(|source| ContainerError::Transaction {
            location: self.location.to_owned(),
            source: Box::new(source),
        })
    }

    fn fields(&self, layer: &str) -> Result<Vec<FieldDefn>, ContainerError> {
        Ok(self.layout(layer)?.fields)
    }

    fn add_field(&mut self, layer: &str, field: &FieldDefn) -> Result<(), ContainerError> {
        if self.layout(layer)?.has_column(&field.name) {
            return Err(ContainerError::DuplicateField {
                layer: layer.to_owned(),
                field: field.name.clone(),
            });
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(layer),
            quote_ident(&field.name),
            declared_type(field)
        );
        self.execute(layer, &sql)
    }

    fn integer_values(
        &self,
        layer: &str,
        field: &str,
    ) -> Result<Vec<(i64, IntegerCell)>, ContainerError> {
        let layout = self.require_field(layer, field)?;
        let sql = format!(
            "SELECT {key}, {field} FROM {table} ORDER BY {key}",
            key = quote_ident(&layout.key),
            field = quote_ident(field),
            table = quote_ident(layer)
        );
        let mut statement = self
            .transaction
            .prepare(&sql)
            .map_err(|source| read_error(layer, source))?;
        let mut rows = statement
            .query([])
            .map_err(|source| read_error(layer, source))?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().map_err(|source| read_error(layer, source))? {
            let fid: i64 = row.get(0).map_err(|source| read_error(layer, source))?;
            let raw = row.get_ref(1).map_err(|source| read_error(layer, source))?;
            values.push((fid, integer_cell(raw)));
        }
        Ok(values)
    }

    fn set_integer(
        &mut self,
        layer: &str,
        field: &str,
        fid: i64,
        value: Option<i64>,
    ) -> Result<(), ContainerError> {
        let layout = self.require_field(layer, field)?;
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_ident(layer),
            quote_ident(field),
            quote_ident(&layout.key)
        );
        self.transaction
            .execute(&sql, params![value, fid])
            .map(|_| ())
            .map_err(|source| write_error(layer, source))
    }

    fn delete_field(&mut self, layer: &str, field: &str) -> Result<(), ContainerError> {
        self.require_field(layer, field)?;
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(layer),
            quote_ident(field)
        );
        self.execute(layer, &sql)
    }

    fn rename_field(&mut self, layer: &str, from: &str, to: &str) -> Result<(), ContainerError> {
        let layout = self.require_field(layer, from)?;
        if layout.has_column(to) {
            return Err(ContainerError::DuplicateField {
                layer: layer.to_owned(),
                field: to.to_owned(),
            });
        }
        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(layer),
            quote_ident(from),
            quote_ident(to)
        );
        self.execute(layer, &sql)
    }

    fn commit(self) -> Result<(), ContainerError> {
        let location = self.location;
        self.transaction
            .commit()
            .map_err(|source| ContainerError::Transaction {
                location: location.to_owned(),
                source: Box::new(source),
            })?;
        log::debug!("committed edit on {location}");
        Ok(())
    }
}
