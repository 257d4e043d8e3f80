//! dBASE III attribute tables.

use chrono::{Datelike, NaiveDate, Utc};
use encoding_rs::Encoding;
use layersync_core::{FieldDefn, FieldType, FieldValue};

use super::ShapefileError;
use super::bytes::{put_u16_le, put_u32_le, read_u16_le, read_u32_le};

pub(crate) const MAX_NAME_LEN: usize = 10;
const DESCRIPTOR_LEN: usize = 32;
const HEADER_PREFIX_LEN: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
pub(crate) const END_OF_FILE: u8 = 0x1A;
const VERSION: u8 = 0x03;
const DEFAULT_STRING_WIDTH: u16 = 80;
const MAX_STRING_WIDTH: u16 = 254;
/// Offset of the record count inside the header.
pub(crate) const RECORD_COUNT_OFFSET: u64 = 4;

/// Storage class of a dBASE column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Character,
    Numeric,
    Date,
    Logical,
}

impl ColumnKind {
    const fn code(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Date => b'D',
            Self::Logical => b'L',
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Column {
    /// Name stored in the file, as read back in the declared encoding.
    pub name: String,
    /// Encoded name, at most [`MAX_NAME_LEN`] bytes.
    pub stored: Vec<u8>,
    /// Name of the source field the values come from.
    pub source: String,
    pub kind: ColumnKind,
    pub width: u8,
    pub decimals: u8,
}

/// Build the column for `field`, shortening its encoded name to fit the
/// format and keeping it unique among `existing` (compared case-insensitively).
pub(crate) fn column_for(
    field: &FieldDefn,
    existing: &[Column],
    encoding: &'static Encoding,
) -> Result<Column, ShapefileError> {
    let (kind, width, decimals) = match field.field_type {
        FieldType::Integer32 => (ColumnKind::Numeric, 11, 0),
        FieldType::Integer64 => (ColumnKind::Numeric, 20, 0),
        FieldType::Real => (ColumnKind::Numeric, 24, 15),
        FieldType::String => {
            let declared = field
                .width
                .filter(|width| *width > 0)
                .unwrap_or(DEFAULT_STRING_WIDTH)
                .min(MAX_STRING_WIDTH);
            (
                ColumnKind::Character,
                u8::try_from(declared).unwrap_or(u8::MAX),
                0,
            )
        }
        FieldType::Date => (ColumnKind::Date, 8, 0),
        FieldType::DateTime => (ColumnKind::Character, 24, 0),
        FieldType::Boolean => (ColumnKind::Logical, 1, 0),
        FieldType::Binary => {
            return Err(ShapefileError::UnsupportedField {
                field: field.name.clone(),
                field_type: field.field_type,
            });
        }
    };
    let stored = unique_name(&field.name, existing, encoding)?;
    let (name, _) = encoding.decode_without_bom_handling(&stored);
    Ok(Column {
        name: name.into_owned(),
        stored,
        source: field.name.clone(),
        kind,
        width,
        decimals,
    })
}

/// `name` in `encoding`, cut to at most `max` bytes without splitting a
/// character. Characters the encoding lacks become `_`.
fn encode_name(name: &str, max: usize, encoding: &'static Encoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(max);
    let mut buffer = [0_u8; 4];
    for ch in name.chars() {
        let (bytes, _, had_errors) = encoding.encode(ch.encode_utf8(&mut buffer));
        let piece: &[u8] = if had_errors { b"_" } else { &bytes };
        if out.len() + piece.len() > max {
            break;
        }
        out.extend_from_slice(piece);
    }
    out
}

fn unique_name(
    name: &str,
    existing: &[Column],
    encoding: &'static Encoding,
) -> Result<Vec<u8>, ShapefileError> {
    let taken = |candidate: &[u8]| {
        existing
            .iter()
            .any(|column| column.stored.eq_ignore_ascii_case(candidate))
    };
    let base = encode_name(name, MAX_NAME_LEN, encoding);
    if !taken(&base) {
        return Ok(base);
    }
    for index in 1..100_u32 {
        let suffix = format!("_{index}");
        let mut candidate = encode_name(name, MAX_NAME_LEN - suffix.len(), encoding);
        candidate.extend_from_slice(suffix.as_bytes());
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ShapefileError::NameExhausted {
        field: name.to_owned(),
    })
}

/// Header and column descriptors, with `records` as the record count.
pub(crate) fn encode_header(columns: &[Column], records: u32) -> Result<Vec<u8>, ShapefileError> {
    let too_large = || ShapefileError::TooLarge { what: "table" };
    let header_len = u16::try_from(HEADER_PREFIX_LEN + DESCRIPTOR_LEN * columns.len() + 1)
        .map_err(|_| too_large())?;
    let record_len = u16::try_from(record_len(columns)).map_err(|_| too_large())?;
    let (year, month, day) = today();

    let mut out = Vec::with_capacity(usize::from(header_len));
    out.push(VERSION);
    out.extend_from_slice(&[year, month, day]);
    put_u32_le(&mut out, records);
    put_u16_le(&mut out, header_len);
    put_u16_le(&mut out, record_len);
    out.resize(HEADER_PREFIX_LEN, 0);
    for column in columns {
        let mut name = column.stored.clone();
        name.resize(11, 0);
        out.extend_from_slice(&name);
        out.push(column.kind.code());
        out.extend_from_slice(&[0; 4]);
        out.push(column.width);
        out.push(column.decimals);
        out.extend_from_slice(&[0; 14]);
    }
    out.push(HEADER_TERMINATOR);
    Ok(out)
}

fn record_len(columns: &[Column]) -> usize {
    1 + columns
        .iter()
        .map(|column| usize::from(column.width))
        .sum::<usize>()
}

/// Encode one record: the deletion flag followed by every column.
pub(crate) fn encode_record(
    columns: &[Column],
    value_of: impl Fn(&str) -> Option<FieldValue>,
    encoding: &'static Encoding,
) -> Result<Vec<u8>, ShapefileError> {
    let mut out = Vec::with_capacity(record_len(columns));
    out.push(b' ');
    for column in columns {
        let value = value_of(&column.source);
        out.extend_from_slice(&encode_value(column, value.as_ref(), encoding)?);
    }
    Ok(out)
}

fn encode_value(
    column: &Column,
    slot: Option<&FieldValue>,
    encoding: &'static Encoding,
) -> Result<Vec<u8>, ShapefileError> {
    let width = usize::from(column.width);
    let mismatch = |found: &FieldValue| ShapefileError::ValueMismatch {
        field: column.source.clone(),
        value: format!("{found:?}"),
    };
    let Some(value) = slot else {
        let fill = if column.kind == ColumnKind::Logical { b'?' } else { b' ' };
        return Ok(vec![fill; width]);
    };

    let (bytes, right_align) = match (column.kind, value) {
        (ColumnKind::Numeric, FieldValue::Integer(number)) => (number.to_string().into_bytes(), true),
        (ColumnKind::Numeric, FieldValue::Boolean(flag)) => {
            (i64::from(*flag).to_string().into_bytes(), true)
        }
        (ColumnKind::Numeric, FieldValue::Real(number)) if number.is_finite() => {
            // Precision gives way before the value is declared too wide.
            let text = (0..=usize::from(column.decimals))
                .rev()
                .map(|decimals| format!("{number:.decimals$}"))
                .find(|formatted| formatted.len() <= width)
                .unwrap_or_else(|| format!("{number:.0}"));
            (text.into_bytes(), true)
        }
        (
            ColumnKind::Character,
            FieldValue::String(text) | FieldValue::Date(text) | FieldValue::DateTime(text),
        ) => {
            (encode_text(&column.source, text, encoding)?, false)
        }
        (ColumnKind::Character, FieldValue::Integer(number)) => {
            (number.to_string().into_bytes(), false)
        }
        (ColumnKind::Character, FieldValue::Real(number)) => {
            (number.to_string().into_bytes(), false)
        }
        (ColumnKind::Character | ColumnKind::Logical, FieldValue::Boolean(flag)) => {
            (if *flag { b"T".to_vec() } else { b"F".to_vec() }, false)
        }
        (ColumnKind::Logical, FieldValue::Integer(number)) => {
            (if *number == 0 { b"F".to_vec() } else { b"T".to_vec() }, false)
        }
        (ColumnKind::Date, FieldValue::Date(text) | FieldValue::DateTime(text)) => {
            (compact_date(text).ok_or_else(|| mismatch(value))?.into_bytes(), false)
        }
        _ => return Err(mismatch(value)),
    };

    if bytes.len() > width {
        return Err(ShapefileError::ValueTooWide {
            field: column.source.clone(),
            width: column.width,
            len: bytes.len(),
        });
    }
    let padding = vec![b' '; width - bytes.len()];
    Ok(if right_align {
        [padding, bytes].concat()
    } else {
        [bytes, padding].concat()
    })
}

fn encode_text(
    field: &str,
    text: &str,
    encoding: &'static Encoding,
) -> Result<Vec<u8>, ShapefileError> {
    let (bytes, used, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(ShapefileError::Unencodable {
            field: field.to_owned(),
            encoding: used.name(),
        });
    }
    Ok(bytes.into_owned())
}

/// `YYYY-MM-DD` (optionally followed by a time) as `YYYYMMDD`.
fn compact_date(text: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.format("%Y%m%d").to_string())
}

/// Header date as years since 1900, month and day.
fn today() -> (u8, u8, u8) {
    let date = Utc::now().date_naive();
    (
        u8::try_from(date.year() - 1900).unwrap_or(u8::MAX),
        u8::try_from(date.month()).unwrap_or(1),
        u8::try_from(date.day()).unwrap_or(1),
    )
}

/// What inspection reads back from a table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableHeader {
    pub records: u32,
    pub fields: Vec<FieldDefn>,
}

/// Decode the header of a table. Field names are decoded with `encoding`.
pub(crate) fn decode_header(
    bytes: &[u8],
    encoding: &'static Encoding,
) -> Result<TableHeader, ShapefileError> {
    let invalid = |reason: &str| ShapefileError::InvalidHeader {
        file: "dbf",
        reason: reason.to_owned(),
    };
    let records = read_u32_le(bytes, 4).ok_or_else(|| invalid("truncated"))?;
    let header_len = usize::from(read_u16_le(bytes, 8).ok_or_else(|| invalid("truncated"))?);

    let mut fields = Vec::new();
    let mut offset = HEADER_PREFIX_LEN;
    while offset < header_len {
        let Some(descriptor) = bytes.get(offset..offset + DESCRIPTOR_LEN) else {
            if bytes.get(offset) == Some(&HEADER_TERMINATOR) {
                break;
            }
            return Err(invalid("truncated descriptor"));
        };
        if descriptor.first() == Some(&HEADER_TERMINATOR) {
            break;
        }
        fields.push(decode_descriptor(descriptor, encoding).ok_or_else(|| invalid("bad descriptor"))?);
        offset += DESCRIPTOR_LEN;
    }
    Ok(TableHeader { records, fields })
}

fn decode_descriptor(descriptor: &[u8], encoding: &'static Encoding) -> Option<FieldDefn> {
    let raw_name = descriptor.get(..11)?;
    let name_len = raw_name.iter().position(|byte| *byte == 0).unwrap_or(11);
    let (name, _) = encoding.decode_without_bom_handling(raw_name.get(..name_len)?);
    let code = *descriptor.get(11)?;
    let width = *descriptor.get(16)?;
    let decimals = *descriptor.get(17)?;
    let field_type = match code {
        b'N' | b'F' if decimals > 0 => FieldType::Real,
        b'N' if width <= 11 => FieldType::Integer32,
        b'N' if width <= 20 => FieldType::Integer64,
        b'N' | b'F' => FieldType::Real,
        b'D' => FieldType::Date,
        b'L' => FieldType::Boolean,
        _ => FieldType::String,
    };
    let defn = FieldDefn::new(name.trim(), field_type).with_width(u16::from(width));
    Some(if field_type == FieldType::Real {
        defn.with_precision(u16::from(decimals))
    } else {
        defn
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{UTF_8, WINDOWS_1250};
    use rstest::rstest;

    fn columns(fields: &[FieldDefn]) -> Vec<Column> {
        fields.iter().fold(Vec::new(), |mut acc, field| {
            let column = column_for(field, &acc, UTF_8).expect("column");
            acc.push(column);
            acc
        })
    }

    #[rstest]
    fn shortens_and_deduplicates_names() {
        let built = columns(&[
            FieldDefn::new("druh_pozemku", FieldType::String),
            FieldDefn::new("druh_pozemku_2", FieldType::String),
            FieldDefn::new("DRUH_POZEM", FieldType::String),
            FieldDefn::new("kod", FieldType::Integer32),
        ]);
        let names: Vec<&str> = built.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["druh_pozem", "druh_poz_1", "DRUH_POZ_2", "kod"]);
    }

    #[rstest]
    #[case(FieldType::Integer32, ColumnKind::Numeric, 11, 0)]
    #[case(FieldType::Integer64, ColumnKind::Numeric, 20, 0)]
    #[case(FieldType::Real, ColumnKind::Numeric, 24, 15)]
    #[case(FieldType::String, ColumnKind::Character, 80, 0)]
    #[case(FieldType::Date, ColumnKind::Date, 8, 0)]
    #[case(FieldType::DateTime, ColumnKind::Character, 24, 0)]
    #[case(FieldType::Boolean, ColumnKind::Logical, 1, 0)]
    fn maps_field_types(
        #[case] field_type: FieldType,
        #[case] kind: ColumnKind,
        #[case] width: u8,
        #[case] decimals: u8,
    ) {
        let column = column_for(&FieldDefn::new("f", field_type), &[], UTF_8).expect("column");
        assert_eq!((column.kind, column.width, column.decimals), (kind, width, decimals));
    }

    #[rstest]
    fn rejects_binary_fields() {
        assert!(matches!(
            column_for(&FieldDefn::new("data", FieldType::Binary), &[], UTF_8),
            Err(ShapefileError::UnsupportedField { .. })
        ));
    }

    #[rstest]
    fn encodes_padded_values_in_the_declared_encoding() {
        let built = columns(&[
            FieldDefn::new("kod", FieldType::Integer32),
            FieldDefn::new("nazev", FieldType::String).with_width(6),
            FieldDefn::new("platnost", FieldType::Date),
        ]);
        let record = encode_record(
            &built,
            |name| match name {
                "kod" => Some(FieldValue::Integer(-42)),
                "nazev" => Some(FieldValue::String("Žďár".into())),
                "platnost" => Some(FieldValue::Date("2024-01-31".into())),
                _ => None,
            },
            WINDOWS_1250,
        )
        .expect("record");
        let mut expected = format!("{:>11}", -42).into_bytes();
        expected.extend_from_slice(&[0x8E, 0xEF, 0xE1, b'r', b' ', b' ']);
        expected.extend_from_slice(b"20240131");
        assert_eq!(record.first(), Some(&b' '));
        assert_eq!(record.get(1..), Some(&expected[..]));
    }

    #[rstest]
    fn too_wide_values_fail() {
        let built = columns(&[FieldDefn::new("nazev", FieldType::String).with_width(3)]);
        let result = encode_record(
            &built,
            |_| Some(FieldValue::String("Praha".into())),
            UTF_8,
        );
        assert!(matches!(result, Err(ShapefileError::ValueTooWide { width: 3, len: 5, .. })));
    }

    #[rstest]
    fn header_reads_back() {
        let built = columns(&[
            FieldDefn::new("kod", FieldType::Integer32),
            FieldDefn::new("nazev", FieldType::String).with_width(40),
            FieldDefn::new("plocha", FieldType::Real),
        ]);
        let header = encode_header(&built, 12).expect("header");
        assert_eq!(header.len(), 32 + 3 * 32 + 1);
        let decoded = decode_header(&header, UTF_8).expect("decode");
        assert_eq!(decoded.records, 12);
        assert_eq!(
            decoded.fields,
            vec![
                FieldDefn::new("kod", FieldType::Integer32).with_width(11),
                FieldDefn::new("nazev", FieldType::String).with_width(40),
                FieldDefn::new("plocha", FieldType::Real)
                    .with_width(24)
                    .with_precision(15),
            ]
        );
    }

    #[rstest]
    #[case("2024-13-45")]
    #[case("2023-02-29")]
    #[case("31.01.2024")]
    fn impossible_dates_are_rejected(#[case] text: &str) {
        let built = columns(&[FieldDefn::new("platnost", FieldType::Date)]);
        let result = encode_record(&built, |_| Some(FieldValue::Date(text.into())), UTF_8);
        assert!(matches!(result, Err(ShapefileError::ValueMismatch { .. })));
    }

    #[rstest]
    fn datetime_values_keep_their_date() {
        let built = columns(&[FieldDefn::new("zmena", FieldType::Date)]);
        let record = encode_record(
            &built,
            |_| Some(FieldValue::DateTime("2000-02-29T10:15:00Z".into())),
            UTF_8,
        )
        .expect("record");
        assert_eq!(record.get(1..), Some(&b"20000229"[..]));
    }

    #[rstest]
    fn header_is_stamped_with_the_current_year() {
        let header = encode_header(&[], 0).expect("header");
        let year = header.get(1).map(|offset| 1900 + i32::from(*offset));
        assert_eq!(year, Some(Utc::now().year()));
    }

    fn windows_1250_columns(fields: &[FieldDefn]) -> Vec<Column> {
        fields.iter().fold(Vec::new(), |mut acc, field| {
            let column = column_for(field, &acc, WINDOWS_1250).expect("column");
            acc.push(column);
            acc
        })
    }

    #[rstest]
    fn names_are_encoded_before_they_are_shortened() {
        let built = windows_1250_columns(&[
            FieldDefn::new("plocha_č", FieldType::Real),
            FieldDefn::new("způsob_využití", FieldType::String),
            FieldDefn::new("způsob_využití_2", FieldType::String),
        ]);
        let names: Vec<&str> = built.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["plocha_č", "způsob_vyu", "způsob_v_1"]);
        assert_eq!(
            built.first().map(|column| column.stored.as_slice()),
            Some(&b"plocha_\xE8"[..])
        );
        assert!(built.iter().all(|column| column.stored.len() <= MAX_NAME_LEN));

        let header = encode_header(&built, 0).expect("header");
        let decoded = decode_header(&header, WINDOWS_1250).expect("decode");
        let read_back: Vec<&str> = decoded.fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(read_back, names);
    }

    #[rstest]
    fn utf8_names_are_cut_on_character_boundaries() {
        let built = columns(&[FieldDefn::new("využitíúzemí", FieldType::String)]);
        let column = built.first().expect("column");
        assert_eq!(column.name, "využití");
        assert!(column.stored.len() <= MAX_NAME_LEN);
    }

    #[rstest]
    fn characters_missing_from_the_encoding_become_underscores() {
        let built = windows_1250_columns(&[FieldDefn::new("plocha水m", FieldType::Real)]);
        assert_eq!(built.first().map(|column| column.name.as_str()), Some("plocha_m"));
    }
}
