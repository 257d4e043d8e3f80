//! Layer schemas, geometry kinds and spatial references.

use std::fmt;

use crate::FieldDefn;

/// Declared geometry kind of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryKind {
    /// No geometry column (attribute-only table).
    None,
    /// Any geometry; concrete type decided per feature.
    #[default]
    Unknown,
    /// Single points.
    Point,
    /// Single line strings.
    LineString,
    /// Single polygons.
    Polygon,
    /// Point collections.
    MultiPoint,
    /// Line string collections.
    MultiLineString,
    /// Polygon collections.
    MultiPolygon,
    /// Heterogeneous collections.
    GeometryCollection,
}

impl GeometryKind {
    /// Parse a GeoPackage / OGC geometry type name (case-insensitive).
    ///
    /// # Examples
    /// ```
    /// use layersync_core::GeometryKind;
    ///
    /// assert_eq!(GeometryKind::from_type_name("MULTIPOLYGON"), GeometryKind::MultiPolygon);
    /// assert_eq!(GeometryKind::from_type_name("CURVE"), GeometryKind::Unknown);
    /// ```
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "POINT" => Self::Point,
            "LINESTRING" => Self::LineString,
            "POLYGON" => Self::Polygon,
            "MULTIPOINT" => Self::MultiPoint,
            "MULTILINESTRING" => Self::MultiLineString,
            "MULTIPOLYGON" => Self::MultiPolygon,
            "GEOMETRYCOLLECTION" => Self::GeometryCollection,
            _ => Self::Unknown,
        }
    }

    /// OGC type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Unknown => "Geometry",
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinate reference identifier with an optional WKT definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialRef {
    /// Authority name, e.g. `EPSG`.
    pub authority: String,
    /// Code assigned by the authority.
    pub code: i32,
    /// WKT definition, when known.
    pub definition: Option<String>,
}

impl SpatialRef {
    /// EPSG reference without a stored definition.
    pub fn epsg(code: i32) -> Self {
        Self {
            authority: "EPSG".into(),
            code,
            definition: None,
        }
    }

    /// Attach a WKT definition.
    #[must_use]
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Schema of a layer: everything except its features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSchema {
    /// Stable layer identifier.
    pub name: String,
    /// Attribute columns in declaration order.
    pub fields: Vec<FieldDefn>,
    /// Spatial reference, when the layer is tagged with one.
    pub srs: Option<SpatialRef>,
    /// Declared geometry kind.
    pub geometry_kind: GeometryKind,
}

impl LayerSchema {
    /// Create an untagged schema of unknown geometry with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            srs: None,
            geometry_kind: GeometryKind::Unknown,
        }
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDefn) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the spatial reference.
    #[must_use]
    pub fn with_srs(mut self, srs: SpatialRef) -> Self {
        self.srs = Some(srs);
        self
    }

    /// Set the geometry kind.
    #[must_use]
    pub const fn with_geometry_kind(mut self, kind: GeometryKind) -> Self {
        self.geometry_kind = kind;
        self
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefn> {
        self.fields.iter().find(|field| field.name == name)
    }
}
