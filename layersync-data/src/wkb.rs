//! GeoPackage geometry blobs: the `GP` binary header followed by ISO WKB.
//!
//! Decoding accepts either byte order, any envelope variant, and Z/M/ZM
//! ordinates (which are read and discarded). Encoding always produces a
//! little-endian 2D blob without an envelope.
#![expect(
    clippy::little_endian_bytes,
    clippy::big_endian_bytes,
    reason = "WKB and the GeoPackage header declare their byte order per value"
)]

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use thiserror::Error;

const MAGIC: [u8; 2] = *b"GP";
const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_EMPTY: u8 = 0b0001_0000;
const ENVELOPE_SHIFT: u8 = 1;
const ENVELOPE_MASK: u8 = 0b0000_0111;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;
/// Deepest member nesting accepted inside a collection.
pub const MAX_NESTING: usize = 32;

/// Errors raised while decoding geometry blobs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryCodecError {
    /// The blob ended before a complete value could be read.
    #[error("geometry blob truncated at byte {offset}")]
    Truncated {
        /// Offset of the incomplete read.
        offset: usize,
    },
    /// The blob does not start with the `GP` magic.
    #[error("missing GeoPackage geometry magic")]
    InvalidMagic,
    /// The header declares an envelope layout the standard does not define.
    #[error("invalid envelope indicator {indicator}")]
    InvalidEnvelope {
        /// Raw indicator value.
        indicator: u8,
    },
    /// A WKB byte-order marker was neither 0 nor 1.
    #[error("invalid WKB byte order {marker}")]
    InvalidByteOrder {
        /// Raw marker byte.
        marker: u8,
    },
    /// The WKB geometry type is not a simple-feature type.
    #[error("unsupported WKB geometry type {code}")]
    UnsupportedType {
        /// Raw type code.
        code: u32,
    },
    /// Collections are nested deeper than [`MAX_NESTING`].
    #[error("geometry nested deeper than {limit} levels at byte {offset}")]
    TooDeep {
        /// Nesting limit that was exceeded.
        limit: usize,
        /// Offset of the member that exceeded it.
        offset: usize,
    },
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], GeometryCodecError> {
        let end = self.offset.checked_add(N);
        let chunk = end
            .and_then(|stop| self.bytes.get(self.offset..stop))
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(GeometryCodecError::Truncated {
                offset: self.offset,
            })?;
        self.offset += N;
        Ok(chunk)
    }

    fn skip(&mut self, count: usize) -> Result<(), GeometryCodecError> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|stop| *stop <= self.bytes.len())
            .ok_or(GeometryCodecError::Truncated {
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, GeometryCodecError> {
        let [byte] = self.take::<1>()?;
        Ok(byte)
    }

    fn u32(&mut self, order: ByteOrder) -> Result<u32, GeometryCodecError> {
        let raw = self.take::<4>()?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }

    fn f64(&mut self, order: ByteOrder) -> Result<f64, GeometryCodecError> {
        let raw = self.take::<8>()?;
        Ok(match order {
            ByteOrder::Big => f64::from_be_bytes(raw),
            ByteOrder::Little => f64::from_le_bytes(raw),
        })
    }

    fn count(&mut self, order: ByteOrder) -> Result<usize, GeometryCodecError> {
        let value = self.u32(order)?;
        let count = usize::try_from(value).map_err(|_| GeometryCodecError::Truncated {
            offset: self.offset,
        })?;
        // Every element needs at least one byte; reject counts the blob cannot hold.
        if count > self.bytes.len().saturating_sub(self.offset) {
            return Err(GeometryCodecError::Truncated {
                offset: self.offset,
            });
        }
        Ok(count)
    }
}

/// Decode a GeoPackage geometry blob. Empty geometries decode to `None`.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use layersync_data::wkb::{decode_gpkg_geometry, encode_gpkg_geometry};
///
/// let point = Geometry::Point(Point::new(14.42, 50.08));
/// let blob = encode_gpkg_geometry(&point, 4326);
/// assert_eq!(decode_gpkg_geometry(&blob), Ok(Some(point)));
/// ```
pub fn decode_gpkg_geometry(blob: &[u8]) -> Result<Option<Geometry<f64>>, GeometryCodecError> {
    let mut reader = Reader::new(blob);
    if reader.take::<2>()? != MAGIC {
        return Err(GeometryCodecError::InvalidMagic);
    }
    let _version = reader.u8()?;
    let flags = reader.u8()?;
    let header_order = if flags & FLAG_LITTLE_ENDIAN == 0 {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
    let _srs_id = reader.u32(header_order)?;
    let indicator = (flags >> ENVELOPE_SHIFT) & ENVELOPE_MASK;
    let envelope_len = match indicator {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        _ => return Err(GeometryCodecError::InvalidEnvelope { indicator }),
    };
    reader.skip(envelope_len)?;
    if flags & FLAG_EMPTY != 0 {
        return Ok(None);
    }
    read_geometry(&mut reader, 0).map(Some)
}

/// Decode a bare ISO WKB geometry.
pub fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>, GeometryCodecError> {
    read_geometry(&mut Reader::new(bytes), 0)
}

fn read_geometry(
    reader: &mut Reader<'_>,
    depth: usize,
) -> Result<Geometry<f64>, GeometryCodecError> {
    if depth > MAX_NESTING {
        return Err(GeometryCodecError::TooDeep {
            limit: MAX_NESTING,
            offset: reader.offset,
        });
    }
    let order = match reader.u8()? {
        0 => ByteOrder::Big,
        1 => ByteOrder::Little,
        marker => return Err(GeometryCodecError::InvalidByteOrder { marker }),
    };
    let raw = reader.u32(order)?;
    let (base, extra_dims) = split_type(raw)?;
    let geometry = match base {
        WKB_POINT => Geometry::Point(Point(read_coord(reader, order, extra_dims)?)),
        WKB_LINESTRING => Geometry::LineString(read_line(reader, order, extra_dims)?),
        WKB_POLYGON => Geometry::Polygon(read_polygon(reader, order, extra_dims)?),
        WKB_MULTIPOINT => Geometry::MultiPoint(MultiPoint(read_members(
            reader,
            order,
            depth,
            |g| match g {
                Geometry::Point(point) => Some(point),
                _ => None,
            },
        )?)),
        WKB_MULTILINESTRING => Geometry::MultiLineString(MultiLineString(read_members(
            reader,
            order,
            depth,
            |g| match g {
                Geometry::LineString(line) => Some(line),
                _ => None,
            },
        )?)),
        WKB_MULTIPOLYGON => Geometry::MultiPolygon(MultiPolygon(read_members(
            reader,
            order,
            depth,
            |g| match g {
                Geometry::Polygon(polygon) => Some(polygon),
                _ => None,
            },
        )?)),
        WKB_GEOMETRYCOLLECTION => {
            let count = reader.count(order)?;
            let members = (0..count)
                .map(|_| read_geometry(reader, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Geometry::GeometryCollection(GeometryCollection(members))
        }
        _ => return Err(GeometryCodecError::UnsupportedType { code: raw }),
    };
    Ok(geometry)
}

/// Split a raw type code into the base type and the number of ordinates
/// beyond X and Y.
fn split_type(raw: u32) -> Result<(u32, usize), GeometryCodecError> {
    const EWKB_Z: u32 = 0x8000_0000;
    const EWKB_M: u32 = 0x4000_0000;
    const EWKB_SRID: u32 = 0x2000_0000;
    if raw & (EWKB_Z | EWKB_M | EWKB_SRID) != 0 {
        if raw & EWKB_SRID != 0 {
            return Err(GeometryCodecError::UnsupportedType { code: raw });
        }
        let extra = usize::from(raw & EWKB_Z != 0) + usize::from(raw & EWKB_M != 0);
        return Ok((raw & 0x0FFF_FFFF, extra));
    }
    let (base, extra) = match raw {
        1..=7 => (raw, 0),
        1001..=1007 => (raw - 1000, 1),
        2001..=2007 => (raw - 2000, 1),
        3001..=3007 => (raw - 3000, 2),
        _ => return Err(GeometryCodecError::UnsupportedType { code: raw }),
    };
    Ok((base, extra))
}

fn read_coord(
    reader: &mut Reader<'_>,
    order: ByteOrder,
    extra_dims: usize,
) -> Result<Coord<f64>, GeometryCodecError> {
    let x = reader.f64(order)?;
    let y = reader.f64(order)?;
    reader.skip(extra_dims * 8)?;
    Ok(Coord { x, y })
}

fn read_line(
    reader: &mut Reader<'_>,
    order: ByteOrder,
    extra_dims: usize,
) -> Result<LineString<f64>, GeometryCodecError> {
    let count = reader.count(order)?;
    let coords = (0..count)
        .map(|_| read_coord(reader, order, extra_dims))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString(coords))
}

fn read_polygon(
    reader: &mut Reader<'_>,
    order: ByteOrder,
    extra_dims: usize,
) -> Result<Polygon<f64>, GeometryCodecError> {
    let count = reader.count(order)?;
    let mut rings = (0..count)
        .map(|_| read_line(reader, order, extra_dims))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings.next().unwrap_or_else(|| LineString(Vec::new()));
    Ok(Polygon::new(exterior, rings.collect()))
}

fn read_members<T>(
    reader: &mut Reader<'_>,
    order: ByteOrder,
    depth: usize,
    pick: impl Fn(Geometry<f64>) -> Option<T>,
) -> Result<Vec<T>, GeometryCodecError> {
    let count = reader.count(order)?;
    (0..count)
        .map(|_| {
            let offset = reader.offset;
            let member = read_geometry(reader, depth + 1)?;
            pick(member).ok_or(GeometryCodecError::UnsupportedType {
                code: u32::try_from(offset).unwrap_or(u32::MAX),
            })
        })
        .collect()
}

/// Encode a geometry as a little-endian GeoPackage blob without envelope.
#[must_use]
pub fn encode_gpkg_geometry(geometry: &Geometry<f64>, srs_id: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&MAGIC);
    out.push(0);
    out.push(FLAG_LITTLE_ENDIAN);
    out.extend_from_slice(&srs_id.to_le_bytes());
    write_geometry(&mut out, geometry);
    out
}

fn write_header(out: &mut Vec<u8>, code: u32) {
    out.push(1);
    out.extend_from_slice(&code.to_le_bytes());
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    let value = u32::try_from(count).unwrap_or(u32::MAX);
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_coords(out: &mut Vec<u8>, line: &LineString<f64>) {
    write_count(out, line.0.len());
    for coord in &line.0 {
        out.extend_from_slice(&coord.x.to_le_bytes());
        out.extend_from_slice(&coord.y.to_le_bytes());
    }
}

fn write_polygon_body(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    write_count(out, 1 + polygon.interiors().len());
    write_coords(out, polygon.exterior());
    for ring in polygon.interiors() {
        write_coords(out, ring);
    }
}

fn write_geometry(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    match geometry {
        Geometry::Point(point) => {
            write_header(out, WKB_POINT);
            out.extend_from_slice(&point.x().to_le_bytes());
            out.extend_from_slice(&point.y().to_le_bytes());
        }
        Geometry::Line(line) => {
            write_geometry(out, &Geometry::LineString(LineString::from(*line)));
        }
        Geometry::LineString(line) => {
            write_header(out, WKB_LINESTRING);
            write_coords(out, line);
        }
        Geometry::Polygon(polygon) => {
            write_header(out, WKB_POLYGON);
            write_polygon_body(out, polygon);
        }
        Geometry::Rect(rect) => write_geometry(out, &Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => {
            write_geometry(out, &Geometry::Polygon(triangle.to_polygon()));
        }
        Geometry::MultiPoint(points) => {
            write_header(out, WKB_MULTIPOINT);
            write_count(out, points.0.len());
            for point in &points.0 {
                write_geometry(out, &Geometry::Point(*point));
            }
        }
        Geometry::MultiLineString(lines) => {
            write_header(out, WKB_MULTILINESTRING);
            write_count(out, lines.0.len());
            for line in &lines.0 {
                write_header(out, WKB_LINESTRING);
                write_coords(out, line);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_header(out, WKB_MULTIPOLYGON);
            write_count(out, polygons.0.len());
            for polygon in &polygons.0 {
                write_header(out, WKB_POLYGON);
                write_polygon_body(out, polygon);
            }
        }
        Geometry::GeometryCollection(collection) => {
            write_header(out, WKB_GEOMETRYCOLLECTION);
            write_count(out, collection.0.len());
            for member in &collection.0 {
                write_geometry(out, member);
            }
        }
    }
}
