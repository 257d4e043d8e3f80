//! Shape records and the main-file header shared by `.shp` and `.shx`.

use std::fmt;

use geo::orient::{Direction, Orient};
use geo::{BoundingRect, Coord, Geometry, LineString, MultiPolygon, Polygon, Rect};
use layersync_core::GeometryKind;

use super::ShapefileError;
use super::bytes::{put_f64_le, put_i32_be, put_i32_le, read_f64_le, read_i32_be, read_i32_le};

pub(crate) const HEADER_LEN: usize = 100;
const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;

/// Shape type stored in the main-file header and every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeType {
    /// Records carry no geometry.
    Null,
    /// Single points.
    Point,
    /// One or more line strings.
    PolyLine,
    /// One or more rings.
    Polygon,
    /// Point sets.
    MultiPoint,
}

impl ShapeType {
    const fn code(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::Point => 1,
            Self::PolyLine => 3,
            Self::Polygon => 5,
            Self::MultiPoint => 8,
        }
    }

    /// Shape type for a declared layer geometry kind; `None` when the first
    /// geometry decides.
    pub(crate) const fn for_kind(kind: GeometryKind) -> Option<Self> {
        match kind {
            GeometryKind::None => Some(Self::Null),
            GeometryKind::Point => Some(Self::Point),
            GeometryKind::MultiPoint => Some(Self::MultiPoint),
            GeometryKind::LineString | GeometryKind::MultiLineString => Some(Self::PolyLine),
            GeometryKind::Polygon | GeometryKind::MultiPolygon => Some(Self::Polygon),
            GeometryKind::Unknown | GeometryKind::GeometryCollection => None,
        }
    }

    /// Shape type able to hold `geometry`, if any.
    pub(crate) const fn for_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(Self::Point),
            Geometry::MultiPoint(_) => Some(Self::MultiPoint),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(Self::PolyLine)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(Self::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }

    /// Geometry kind reported when reading a header. Z and M variants map to
    /// their 2D counterparts.
    pub(crate) const fn kind_from_code(code: i32) -> Option<GeometryKind> {
        match code {
            0 => Some(GeometryKind::None),
            1 | 11 | 21 => Some(GeometryKind::Point),
            3 | 13 | 23 => Some(GeometryKind::LineString),
            5 | 15 | 25 => Some(GeometryKind::Polygon),
            8 | 18 | 28 => Some(GeometryKind::MultiPoint),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null",
            Self::Point => "point",
            Self::PolyLine => "polyline",
            Self::Polygon => "polygon",
            Self::MultiPoint => "multipoint",
        })
    }
}

/// Encoded record content plus its bounds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShapeRecord {
    pub content: Vec<u8>,
    pub bounds: Option<Rect<f64>>,
}

/// Encode the record content for `geometry` in a file of `shape_type`.
pub(crate) fn encode_shape(
    geometry: Option<&Geometry<f64>>,
    shape_type: ShapeType,
) -> Result<ShapeRecord, ShapefileError> {
    let Some(geometry) = geometry else {
        return Ok(null_record());
    };
    let incompatible = || ShapefileError::IncompatibleGeometry {
        shape_type,
        geometry: geometry_name(geometry),
    };
    if ShapeType::for_geometry(geometry) != Some(shape_type)
        && !(shape_type == ShapeType::MultiPoint && matches!(geometry, Geometry::Point(_)))
    {
        return Err(incompatible());
    }
    let Some(bounds) = geometry.bounding_rect() else {
        return Ok(null_record());
    };

    let mut content = Vec::new();
    put_i32_le(&mut content, shape_type.code());
    match (shape_type, geometry) {
        (ShapeType::Point, Geometry::Point(point)) => {
            put_f64_le(&mut content, point.x());
            put_f64_le(&mut content, point.y());
        }
        (ShapeType::MultiPoint, _) => {
            let points: Vec<Coord<f64>> = match geometry {
                Geometry::Point(point) => vec![point.0],
                Geometry::MultiPoint(points) => points.0.iter().map(|point| point.0).collect(),
                _ => return Err(incompatible()),
            };
            put_bounds(&mut content, bounds);
            put_i32_le(&mut content, count(points.len())?);
            put_points(&mut content, &points);
        }
        (ShapeType::PolyLine, _) => {
            let parts: Vec<LineString<f64>> = match geometry {
                Geometry::Line(line) => vec![LineString::from(*line)],
                Geometry::LineString(line) => vec![line.clone()],
                Geometry::MultiLineString(lines) => lines.0.clone(),
                _ => return Err(incompatible()),
            };
            put_parts(&mut content, bounds, &parts)?;
        }
        (ShapeType::Polygon, _) => {
            let polygons: MultiPolygon<f64> = match geometry {
                Geometry::Polygon(polygon) => MultiPolygon(vec![polygon.clone()]),
                Geometry::MultiPolygon(polygons) => polygons.clone(),
                Geometry::Rect(rect) => MultiPolygon(vec![rect.to_polygon()]),
                Geometry::Triangle(triangle) => MultiPolygon(vec![triangle.to_polygon()]),
                _ => return Err(incompatible()),
            };
            let rings: Vec<LineString<f64>> = polygons
                .orient(Direction::Reversed)
                .into_iter()
                .flat_map(|polygon: Polygon<f64>| {
                    let (exterior, interiors) = polygon.into_inner();
                    std::iter::once(exterior).chain(interiors)
                })
                .collect();
            put_parts(&mut content, bounds, &rings)?;
        }
        _ => return Err(incompatible()),
    }
    Ok(ShapeRecord {
        content,
        bounds: Some(bounds),
    })
}

fn null_record() -> ShapeRecord {
    let mut content = Vec::with_capacity(4);
    put_i32_le(&mut content, ShapeType::Null.code());
    ShapeRecord {
        content,
        bounds: None,
    }
}

const fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn count(len: usize) -> Result<i32, ShapefileError> {
    i32::try_from(len).map_err(|_| ShapefileError::TooLarge { what: "shape" })
}

fn put_bounds(out: &mut Vec<u8>, bounds: Rect<f64>) {
    put_f64_le(out, bounds.min().x);
    put_f64_le(out, bounds.min().y);
    put_f64_le(out, bounds.max().x);
    put_f64_le(out, bounds.max().y);
}

fn put_points(out: &mut Vec<u8>, points: &[Coord<f64>]) {
    for point in points {
        put_f64_le(out, point.x);
        put_f64_le(out, point.y);
    }
}

fn put_parts(
    out: &mut Vec<u8>,
    bounds: Rect<f64>,
    parts: &[LineString<f64>],
) -> Result<(), ShapefileError> {
    put_bounds(out, bounds);
    let total: usize = parts.iter().map(|part| part.0.len()).sum();
    put_i32_le(out, count(parts.len())?);
    put_i32_le(out, count(total)?);
    let mut start = 0;
    for part in parts {
        put_i32_le(out, count(start)?);
        start += part.0.len();
    }
    for part in parts {
        put_points(out, &part.0);
    }
    Ok(())
}

/// Smallest rectangle covering both inputs.
pub(crate) fn merge_bounds(current: Option<Rect<f64>>, next: Rect<f64>) -> Rect<f64> {
    current.map_or(next, |rect| {
        Rect::new(
            Coord {
                x: rect.min().x.min(next.min().x),
                y: rect.min().y.min(next.min().y),
            },
            Coord {
                x: rect.max().x.max(next.max().x),
                y: rect.max().y.max(next.max().y),
            },
        )
    })
}

/// The 100-byte header of a `.shp` or `.shx` file.
pub(crate) fn encode_header(
    shape_type: ShapeType,
    file_len_bytes: u64,
    bounds: Option<Rect<f64>>,
) -> Result<Vec<u8>, ShapefileError> {
    let words = i32::try_from(file_len_bytes >> 1)
        .map_err(|_| ShapefileError::TooLarge { what: "file" })?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    put_i32_be(&mut header, FILE_CODE);
    for _ in 0..5 {
        put_i32_be(&mut header, 0);
    }
    put_i32_be(&mut header, words);
    put_i32_le(&mut header, VERSION);
    put_i32_le(&mut header, shape_type.code());
    match bounds {
        Some(rect) => put_bounds(&mut header, rect),
        None => {
            for _ in 0..4 {
                put_f64_le(&mut header, 0.0);
            }
        }
    }
    for _ in 0..4 {
        put_f64_le(&mut header, 0.0);
    }
    Ok(header)
}

/// Fields of a main-file header that inspection needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ShapeHeader {
    pub shape_code: i32,
    pub file_len_bytes: u64,
    pub bounds: [f64; 4],
}

pub(crate) fn decode_header(bytes: &[u8]) -> Result<ShapeHeader, ShapefileError> {
    let invalid = |reason: &str| ShapefileError::InvalidHeader {
        file: "shp",
        reason: reason.to_owned(),
    };
    if read_i32_be(bytes, 0) != Some(FILE_CODE) {
        return Err(invalid("bad file code"));
    }
    let words = read_i32_be(bytes, 24).ok_or_else(|| invalid("truncated"))?;
    let shape_code = read_i32_le(bytes, 32).ok_or_else(|| invalid("truncated"))?;
    let mut bounds = [0.0; 4];
    for (slot, offset) in bounds.iter_mut().zip([36, 44, 52, 60]) {
        *slot = read_f64_le(bytes, offset).ok_or_else(|| invalid("truncated"))?;
    }
    let file_len_bytes = u64::try_from(words)
        .map_err(|_| invalid("negative file length"))?
        << 1;
    Ok(ShapeHeader {
        shape_code,
        file_len_bytes,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};
    use rstest::rstest;

    #[rstest]
    fn point_record_layout() {
        let geometry = Geometry::Point(point!(x: 1.0, y: 2.0));
        let record = encode_shape(Some(&geometry), ShapeType::Point).expect("encode");
        assert_eq!(record.content.len(), 20);
        assert_eq!(read_i32_le(&record.content, 0), Some(1));
        assert_eq!(read_f64_le(&record.content, 12), Some(2.0));
    }

    #[rstest]
    fn polygon_exterior_is_written_clockwise() {
        let counter_clockwise = polygon![
            (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)
        ];
        let record = encode_shape(Some(&Geometry::Polygon(counter_clockwise)), ShapeType::Polygon)
            .expect("encode");
        assert_eq!(read_i32_le(&record.content, 36), Some(1));
        assert_eq!(read_i32_le(&record.content, 40), Some(5));
        // Reversed ring: (0 0, 0 4, 4 4, 4 0, 0 0).
        assert_eq!(read_f64_le(&record.content, 64), Some(0.0));
        assert_eq!(read_f64_le(&record.content, 72), Some(4.0));
        assert_eq!(read_f64_le(&record.content, 96), Some(4.0));
        assert_eq!(read_f64_le(&record.content, 104), Some(0.0));
    }

    #[rstest]
    fn multi_line_parts_are_indexed() {
        let geometry = Geometry::MultiLineString(geo::MultiLineString(vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)],
            line_string![(x: 2.0, y: 2.0), (x: 3.0, y: 3.0), (x: 4.0, y: 2.0)],
        ]));
        let record = encode_shape(Some(&geometry), ShapeType::PolyLine).expect("encode");
        assert_eq!(read_i32_le(&record.content, 36), Some(2));
        assert_eq!(read_i32_le(&record.content, 40), Some(5));
        assert_eq!(read_i32_le(&record.content, 48), Some(2));
    }

    #[rstest]
    #[case(Geometry::Point(point!(x: 1.0, y: 1.0)), ShapeType::Polygon)]
    #[case(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]), ShapeType::Point)]
    #[case(Geometry::GeometryCollection(geo::GeometryCollection(Vec::new())), ShapeType::PolyLine)]
    fn rejects_incompatible_geometry(#[case] geometry: Geometry<f64>, #[case] shape_type: ShapeType) {
        assert!(matches!(
            encode_shape(Some(&geometry), shape_type),
            Err(ShapefileError::IncompatibleGeometry { .. })
        ));
    }

    #[rstest]
    fn null_geometry_is_a_null_shape() {
        let record = encode_shape(None, ShapeType::Polygon).expect("encode");
        assert_eq!(record.content, vec![0, 0, 0, 0]);
        assert_eq!(record.bounds, None);
    }

    #[rstest]
    fn header_reads_back() {
        let bounds = Rect::new(Coord { x: -1.0, y: -2.0 }, Coord { x: 3.0, y: 4.0 });
        let header = encode_header(ShapeType::Polygon, 236, Some(bounds)).expect("header");
        assert_eq!(header.len(), HEADER_LEN);
        let decoded = decode_header(&header).expect("decode");
        assert_eq!(decoded.shape_code, 5);
        assert_eq!(decoded.file_len_bytes, 236);
        assert_eq!(decoded.bounds, [-1.0, -2.0, 3.0, 4.0]);
    }
}
