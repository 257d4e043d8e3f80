//! Access to multi-layer containers.
//!
//! A [`Container`] exposes read access to its layers and hands out a
//! [`ContainerEdit`] for schema rewrites. An edit is a single transaction:
//! nothing it does is visible until [`ContainerEdit::commit`] succeeds, and
//! dropping an uncommitted edit discards every change it made.

use thiserror::Error;

use crate::{Feature, FieldDefn, LayerSchema};

/// Boxed error used where the backing store decides the concrete cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Callback receiving each feature of a layer in storage order.
pub type FeatureVisitor<'v> = dyn FnMut(Result<Feature, ContainerError>) + 'v;

/// One stored value of an integer field, as read inside an edit.
///
/// Stores with loose typing can hold a value of another type in an integer
/// column. Such a value is reported as [`IntegerCell::Mismatch`] so the
/// caller can skip that feature alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegerCell {
    /// No value.
    Null,
    /// An integer value.
    Integer(i64),
    /// A value of another type, described for diagnostics.
    Mismatch(String),
}

/// Read access to a multi-layer store.
///
/// # Examples
///
/// ```
/// use layersync_core::{Container, FieldType, FieldDefn, LayerSchema};
/// use layersync_core::test_support::MemoryContainer;
///
/// # fn main() -> Result<(), layersync_core::ContainerError> {
/// let container = MemoryContainer::default().with_layer(
///     LayerSchema::new("Lokality_p").with_field(FieldDefn::new("kod", FieldType::Integer64)),
///     Vec::new(),
/// );
/// assert_eq!(container.layer_names()?, vec!["Lokality_p".to_owned()]);
/// assert_eq!(container.feature_count("Lokality_p")?, 0);
/// # Ok(())
/// # }
/// ```
pub trait Container {
    /// Transactional edit handle borrowed from the container.
    type Edit<'a>: ContainerEdit
    where
        Self: 'a;

    /// Human-readable location, usually the file path.
    fn location(&self) -> &str;

    /// Names of all layers, sorted.
    fn layer_names(&self) -> Result<Vec<String>, ContainerError>;

    /// Schema of `layer`.
    fn layer_schema(&self, layer: &str) -> Result<LayerSchema, ContainerError>;

    /// Number of features stored in `layer`.
    fn feature_count(&self, layer: &str) -> Result<u64, ContainerError>;

    /// Feed every feature of `layer` to `visitor`.
    ///
    /// A feature that cannot be decoded is passed as `Err` and iteration
    /// continues. An `Err` return means the layer itself could not be read.
    fn visit_features(
        &self,
        layer: &str,
        visitor: &mut FeatureVisitor<'_>,
    ) -> Result<(), ContainerError>;

    /// Start a transactional edit.
    fn begin_edit(&mut self) -> Result<Self::Edit<'_>, ContainerError>;
}

/// Schema and attribute writes performed inside one transaction.
pub trait ContainerEdit {
    /// Names of all layers visible to the edit, sorted.
    fn layer_names(&self) -> Result<Vec<String>, ContainerError>;

    /// Current field definitions of `layer`.
    fn fields(&self, layer: &str) -> Result<Vec<FieldDefn>, ContainerError>;

    /// Append a field; existing features hold `NULL` for it.
    fn add_field(&mut self, layer: &str, field: &FieldDefn) -> Result<(), ContainerError>;

    /// `(feature id, cell)` pairs of an integer field.
    ///
    /// A cell holding a non-integer value is returned as
    /// [`IntegerCell::Mismatch`] rather than failing the whole read.
    fn integer_values(
        &self,
        layer: &str,
        field: &str,
    ) -> Result<Vec<(i64, IntegerCell)>, ContainerError>;

    /// Overwrite one feature's integer value.
    fn set_integer(
        &mut self,
        layer: &str,
        field: &str,
        fid: i64,
        value: Option<i64>,
    ) -> Result<(), ContainerError>;

    /// Remove a field and its values.
    fn delete_field(&mut self, layer: &str, field: &str) -> Result<(), ContainerError>;

    /// Rename a field in place.
    fn rename_field(&mut self, layer: &str, from: &str, to: &str) -> Result<(), ContainerError>;

    /// Make every change durable.
    fn commit(self) -> Result<(), ContainerError>
    where
        Self: Sized;
}

/// Errors raised by container backends.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container could not be opened.
    #[error("failed to open container {location}")]
    Open {
        /// Path or identifier of the container.
        location: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// The named layer does not exist.
    #[error("layer {layer} not found")]
    MissingLayer {
        /// Requested layer.
        layer: String,
    },
    /// The named field does not exist.
    #[error("field {field} not found on layer {layer}")]
    MissingField {
        /// Layer searched.
        layer: String,
        /// Requested field.
        field: String,
    },
    /// A field with the same name is already present.
    #[error("field {field} already exists on layer {layer}")]
    DuplicateField {
        /// Layer being edited.
        layer: String,
        /// Conflicting field.
        field: String,
    },
    /// Reading layer data failed.
    #[error("failed to read layer {layer}")]
    Read {
        /// Layer being read.
        layer: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// A single feature could not be decoded.
    #[error("failed to decode feature {fid} of layer {layer}")]
    Feature {
        /// Layer being read.
        layer: String,
        /// Identifier of the feature.
        fid: i64,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// Writing layer data failed.
    #[error("failed to write layer {layer}")]
    Write {
        /// Layer being written.
        layer: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// Starting, committing or rolling back a transaction failed.
    #[error("transaction on {location} failed")]
    Transaction {
        /// Path or identifier of the container.
        location: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
}

impl ContainerError {
    /// Whether the error means the container is unusable as a whole.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Transaction { .. })
    }
}
