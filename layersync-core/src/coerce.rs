//! Narrow 64-bit integer attribute columns to 32-bit ones.
//!
//! Interchange formats commonly lack a 64-bit integer type and silently
//! demote such columns to reals or text. Rewriting them in the container
//! first keeps exported artifacts faithful. Every layer is rewritten inside
//! one container transaction: either the whole pass commits or nothing
//! changes.

use thiserror::Error;

use crate::{
    Category, Container, ContainerEdit, ContainerError, Diagnostic, FieldDefn, FieldType,
    IntegerCell, narrow_to_int32,
};

/// Suffix of the temporary column holding narrowed values.
pub const WORK_FIELD_SUFFIX: &str = "_int32";

/// Name of the work field derived from `field`.
///
/// # Examples
/// ```
/// use layersync_core::work_field_name;
///
/// assert_eq!(work_field_name("kod"), "kod_int32");
/// ```
#[must_use]
pub fn work_field_name(field: &str) -> String {
    format!("{field}{WORK_FIELD_SUFFIX}")
}

/// Outcome of narrowing one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercedField {
    /// Layer owning the field.
    pub layer: String,
    /// Field name, unchanged by the rewrite.
    pub field: String,
    /// Non-null values carried over.
    pub copied: usize,
    /// Values dropped because they overflowed 32 bits or were not integers.
    pub dropped: usize,
}

/// Summary of a coercion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionReport {
    /// Fields rewritten to 32-bit integers.
    pub coerced: Vec<CoercedField>,
    /// Skipped fields and dropped values.
    pub diagnostics: Vec<Diagnostic>,
}

impl CoercionReport {
    /// Total number of values lost to overflow or type mismatch.
    #[must_use]
    pub fn dropped_values(&self) -> usize {
        self.coerced.iter().map(|field| field.dropped).sum()
    }
}

/// Errors that abort a coercion pass without changing the container.
#[derive(Debug, Error)]
pub enum CoercionError {
    /// The container could not be opened for editing.
    #[error("failed to open {location} for editing")]
    Open {
        /// Container location.
        location: String,
        /// Underlying cause.
        #[source]
        source: ContainerError,
    },
    /// A write inside the transaction failed; the pass was rolled back.
    #[error("coercion of {location} rolled back")]
    RolledBack {
        /// Container location.
        location: String,
        /// Underlying cause.
        #[source]
        source: ContainerError,
    },
}

/// Rewrite every 64-bit integer field of every layer as a 32-bit field of
/// the same name.
///
/// Values outside the 32-bit range are dropped and reported. A field whose
/// work field already exists is skipped and reported, which makes the pass
/// safe to re-run.
///
/// # Examples
/// ```
/// use layersync_core::{
///     Container, Feature, FieldDefn, FieldType, FieldValue, LayerSchema, coerce_integer_fields,
/// };
/// use layersync_core::test_support::MemoryContainer;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut container = MemoryContainer::default().with_layer(
///     LayerSchema::new("PlochyRZV_p").with_field(FieldDefn::new("kod", FieldType::Integer64)),
///     vec![
///         Feature::new(None).with_attribute("kod", FieldValue::Integer(7)),
///         Feature::new(None).with_attribute("kod", FieldValue::Integer(3_000_000_000)),
///     ],
/// );
/// let report = coerce_integer_fields(&mut container)?;
/// assert_eq!(report.dropped_values(), 1);
/// let schema = container.layer_schema("PlochyRZV_p")?;
/// assert_eq!(schema.fields[0].field_type, FieldType::Integer32);
/// # Ok(())
/// # }
/// ```
pub fn coerce_integer_fields<C>(container: &mut C) -> Result<CoercionReport, CoercionError>
where
    C: Container + ?Sized,
{
    let location = container.location().to_owned();
    let mut edit = container
        .begin_edit()
        .map_err(|source| CoercionError::Open {
            location: location.clone(),
            source,
        })?;
    let mut report = CoercionReport::default();
    let rolled_back = |source| CoercionError::RolledBack {
        location: location.clone(),
        source,
    };

    for layer in edit.layer_names().map_err(rolled_back)? {
        coerce_layer(&mut edit, &layer, &mut report).map_err(rolled_back)?;
    }
    edit.commit().map_err(rolled_back)?;
    log::info!(
        "coerced {} field(s) in {location}, {} value(s) dropped",
        report.coerced.len(),
        report.dropped_values()
    );
    Ok(report)
}

fn coerce_layer<E: ContainerEdit>(
    edit: &mut E,
    layer: &str,
    report: &mut CoercionReport,
) -> Result<(), ContainerError> {
    let fields = edit.fields(layer)?;
    let wide: Vec<&FieldDefn> = fields
        .iter()
        .filter(|field| field.field_type == FieldType::Integer64)
        .collect();
    for field in wide {
        let work_name = work_field_name(&field.name);
        if fields.iter().any(|existing| existing.name == work_name) {
            log::warn!("{layer}: work field {work_name} already exists, skipping {}", field.name);
            report.diagnostics.push(Diagnostic::new(
                Category::SchemaConflict,
                format!("{layer}.{work_name}"),
                format!("work field already exists; {} left unchanged", field.name),
            ));
            continue;
        }
        let coerced = narrow_field(edit, layer, field, &work_name, &mut report.diagnostics)?;
        report.coerced.push(coerced);
    }
    Ok(())
}

fn narrow_field<E: ContainerEdit>(
    edit: &mut E,
    layer: &str,
    field: &FieldDefn,
    work_name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<CoercedField, ContainerError> {
    edit.add_field(layer, &FieldDefn::new(work_name, FieldType::Integer32))?;
    let mut coerced = CoercedField {
        layer: layer.to_owned(),
        field: field.name.clone(),
        copied: 0,
        dropped: 0,
    };
    for (fid, cell) in edit.integer_values(layer, &field.name)? {
        let subject = format!("{layer}.{}#{fid}", field.name);
        match cell {
            IntegerCell::Null => {}
            IntegerCell::Integer(wide) => match narrow_to_int32(wide) {
                Some(narrow) => {
                    edit.set_integer(layer, work_name, fid, Some(i64::from(narrow)))?;
                    coerced.copied += 1;
                }
                None => {
                    log::warn!("{subject}: value {wide} exceeds 32 bits, dropped");
                    diagnostics.push(Diagnostic::new(
                        Category::ValueOverflow,
                        subject,
                        format!("value {wide} outside 32-bit range dropped"),
                    ));
                    coerced.dropped += 1;
                }
            },
            IntegerCell::Mismatch(found) => {
                log::warn!("{subject}: {found} is not an integer, dropped");
                diagnostics.push(Diagnostic::new(
                    Category::ReadFailure,
                    subject,
                    format!("{found} is not an integer; left empty"),
                ));
                coerced.dropped += 1;
            }
        }
    }
    edit.delete_field(layer, &field.name)?;
    edit.rename_field(layer, work_name, &field.name)?;
    log::debug!("{layer}.{} narrowed to 32 bits", field.name);
    Ok(coerced)
}
