//! Attribute schema and value types shared by containers and artefacts.

use std::fmt;

/// Largest value an [`FieldType::Integer32`] column can hold.
pub const INT32_MAX: i64 = 2_147_483_647;
/// Smallest value an [`FieldType::Integer32`] column can hold.
pub const INT32_MIN: i64 = -2_147_483_648;

/// Logical type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer.
    Integer32,
    /// 64-bit signed integer.
    Integer64,
    /// Double precision floating point.
    Real,
    /// Text.
    String,
    /// Opaque bytes.
    Binary,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Date and time (ISO 8601 text).
    DateTime,
    /// Boolean flag.
    Boolean,
}

impl FieldType {
    /// Human-readable type name used in inspection reports.
    ///
    /// # Examples
    /// ```
    /// use layersync_core::FieldType;
    ///
    /// assert_eq!(FieldType::Integer64.name(), "Integer64");
    /// ```
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer32 => "Integer",
            Self::Integer64 => "Integer64",
            Self::Real => "Real",
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Definition of a single attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefn {
    /// Column name, unique within its layer.
    pub name: String,
    /// Logical column type.
    pub field_type: FieldType,
    /// Declared width, where the source format records one.
    pub width: Option<u16>,
    /// Declared precision for real columns.
    pub precision: Option<u16>,
}

impl FieldDefn {
    /// Create a definition with no declared width or precision.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            width: None,
            precision: None,
        }
    }

    /// Attach a declared width.
    #[must_use]
    pub const fn with_width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    /// Attach a declared precision.
    #[must_use]
    pub const fn with_precision(mut self, precision: u16) -> Self {
        self.precision = Some(precision);
        self
    }
}

/// A typed attribute value. Absence (`NULL`) is modelled as `Option::None`
/// by the owning [`Feature`](crate::Feature).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Integer value of either width.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Date as `YYYY-MM-DD`.
    Date(String),
    /// Date and time as ISO 8601 text.
    DateTime(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Integer payload, if this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

/// Narrow a 64-bit integer to the 32-bit range.
///
/// Returns `None` when `value` lies outside `[INT32_MIN, INT32_MAX]`.
///
/// # Examples
/// ```
/// use layersync_core::narrow_to_int32;
///
/// assert_eq!(narrow_to_int32(2_147_483_647), Some(2_147_483_647));
/// assert_eq!(narrow_to_int32(2_147_483_648), None);
/// ```
#[must_use]
pub fn narrow_to_int32(value: i64) -> Option<i32> {
    i32::try_from(value).ok()
}
