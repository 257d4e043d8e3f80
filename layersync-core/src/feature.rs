//! Feature records: one optional geometry plus named attribute values.

use std::collections::BTreeMap;

use geo::Geometry;

use crate::FieldValue;

/// One geometry + attribute record owned by a layer.
///
/// Attributes absent from the map are `NULL`. Cloning produces an
/// independent copy; features never share mutable state across layers.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use layersync_core::{Feature, FieldValue};
///
/// let feature = Feature::new(Some(Geometry::Point(Point::new(1.0, 2.0))))
///     .with_attribute("kod", FieldValue::Integer(7));
/// assert_eq!(feature.attribute("kod"), Some(&FieldValue::Integer(7)));
/// assert_eq!(feature.attribute("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    /// Source identifier, when the container assigns one.
    pub fid: Option<i64>,
    /// Geometry, if any.
    pub geometry: Option<Geometry<f64>>,
    attributes: BTreeMap<String, FieldValue>,
}

impl Feature {
    /// Create a feature with the given geometry and no attributes.
    #[must_use]
    pub const fn new(geometry: Option<Geometry<f64>>) -> Self {
        Self {
            fid: None,
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the source identifier.
    #[must_use]
    pub const fn with_fid(mut self, fid: i64) -> Self {
        self.fid = Some(fid);
        self
    }

    /// Set an attribute and return the feature.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.set_attribute(name, Some(value));
        self
    }

    /// Value of `name`, or `None` when the attribute is `NULL`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    /// Set or clear an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Option<FieldValue>) {
        let key = name.into();
        match value {
            Some(present) => {
                self.attributes.insert(key, present);
            }
            None => {
                self.attributes.remove(&key);
            }
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn take_attribute(&mut self, name: &str) -> Option<FieldValue> {
        self.attributes.remove(name)
    }

    /// Iterate non-null attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}
