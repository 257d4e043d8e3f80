//! ESRI Shapefile artifacts.
//!
//! A layer becomes `<layer>.shp` + `.shx` + `.dbf`, with `.cpg` naming the
//! text encoding and `.prj` holding the projection definition when one is
//! known. Geometry and index records stream to disk as features arrive; the
//! headers are patched with final lengths, bounds and counts in
//! [`ArtifactWriter::finish`].

mod bytes;
mod dbf;
mod shp;

use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::File;
use encoding_rs::{Encoding, UTF_8};
use geo::Rect;
use layersync_core::{
    ArtifactDriver, ArtifactError, ArtifactInfo, ArtifactSpec, ArtifactWriter, Feature, FieldDefn,
    FieldType, GeometryKind,
};
use layersync_fs::{
    create_utf8_file, ensure_dir, list_files_with_extension, open_utf8_file, read_sidecar,
    remove_file_if_exists, sidecar_path,
};
use thiserror::Error;

use bytes::put_i32_be;
use dbf::Column;
pub use shp::ShapeType;

/// Format name reported in diagnostics.
pub const DRIVER_NAME: &str = "ESRI Shapefile";
/// Extension of the main file.
pub const EXTENSION: &str = "shp";
/// Every file that may belong to one shapefile.
pub const COMPONENT_EXTENSIONS: [&str; 8] = ["shp", "shx", "dbf", "prj", "cpg", "qix", "sbn", "sbx"];

/// Format-level causes wrapped by [`ArtifactError`].
#[derive(Debug, Error)]
pub enum ShapefileError {
    /// A header could not be parsed.
    #[error("invalid {file} header: {reason}")]
    InvalidHeader {
        /// Component file extension.
        file: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// A geometry does not match the file's shape type.
    #[error("{geometry} geometry cannot be stored in a {shape_type} shapefile")]
    IncompatibleGeometry {
        /// Shape type of the file.
        shape_type: ShapeType,
        /// Geometry type offered.
        geometry: &'static str,
    },
    /// The format cannot hold a field type.
    #[error("field {field} of type {field_type} cannot be stored in dBASE")]
    UnsupportedField {
        /// Field name.
        field: String,
        /// Declared type.
        field_type: FieldType,
    },
    /// No unique short name could be derived for a field.
    #[error("no unique short name left for field {field}")]
    NameExhausted {
        /// Field name.
        field: String,
    },
    /// A value does not fit its column.
    #[error("value of {field} needs {len} bytes but the column holds {width}")]
    ValueTooWide {
        /// Source field.
        field: String,
        /// Column width.
        width: u8,
        /// Encoded length.
        len: usize,
    },
    /// A value has a type the column cannot hold.
    #[error("value {value} does not match the column of {field}")]
    ValueMismatch {
        /// Source field.
        field: String,
        /// Offending value.
        value: String,
    },
    /// Text cannot be represented in the declared encoding.
    #[error("value of {field} is not representable in {encoding}")]
    Unencodable {
        /// Source field.
        field: String,
        /// Encoding name.
        encoding: &'static str,
    },
    /// A count or length exceeds what the headers can record.
    #[error("{what} exceeds the shapefile size limits")]
    TooLarge {
        /// What overflowed.
        what: &'static str,
    },
    /// Fields were declared after the first feature.
    #[error("field {field} declared after features were written")]
    LateField {
        /// Field name.
        field: String,
    },
}

/// Artifact driver writing ESRI Shapefiles.
///
/// # Examples
/// ```
/// use camino::Utf8Path;
/// use layersync_core::ArtifactDriver;
/// use layersync_data::shapefile::ShapefileDriver;
///
/// let driver = ShapefileDriver;
/// assert_eq!(
///     driver.artifact_path(Utf8Path::new("shp"), "Lokality_p"),
///     Utf8Path::new("shp/Lokality_p.shp")
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapefileDriver;

impl ArtifactDriver for ShapefileDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn extension(&self) -> &str {
        EXTENSION
    }

    fn check_writable(&self, encoding: &str) -> Result<(), ArtifactError> {
        resolve_encoding(encoding).map(|_| ())
    }

    fn ensure_directory(&self, dir: &Utf8Path) -> Result<(), ArtifactError> {
        ensure_dir(dir).map_err(|source| ArtifactError::Directory {
            path: dir.to_path_buf(),
            source: Box::new(source),
        })
    }

    fn list_artifacts(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ArtifactError> {
        list_files_with_extension(dir, EXTENSION).map_err(|source| ArtifactError::Directory {
            path: dir.to_path_buf(),
            source: Box::new(source),
        })
    }

    fn remove_artifact(&self, path: &Utf8Path) -> Result<(), ArtifactError> {
        for extension in COMPONENT_EXTENSIONS {
            let component = sidecar_path(path, extension);
            remove_file_if_exists(&component).map_err(|source| ArtifactError::Remove {
                path: component.clone(),
                source: Box::new(source),
            })?;
        }
        Ok(())
    }

    fn create(
        &self,
        path: &Utf8Path,
        spec: &ArtifactSpec,
    ) -> Result<Box<dyn ArtifactWriter + '_>, ArtifactError> {
        let encoding = resolve_encoding(&spec.encoding)?;
        let create_error = |source: io::Error| ArtifactError::Create {
            path: path.to_path_buf(),
            source: Box::new(source),
        };

        let cpg = sidecar_path(path, "cpg");
        write_text(&cpg, &spec.encoding).map_err(create_error)?;
        if let Some(definition) = spec.srs.as_ref().and_then(|srs| srs.definition.as_deref()) {
            write_text(&sidecar_path(path, "prj"), definition).map_err(create_error)?;
        }

        let mut shp = BufWriter::new(create_utf8_file(path).map_err(create_error)?);
        let mut shx =
            BufWriter::new(create_utf8_file(&sidecar_path(path, "shx")).map_err(create_error)?);
        let dbf = BufWriter::new(create_utf8_file(&sidecar_path(path, "dbf")).map_err(create_error)?);
        let placeholder = [0_u8; shp::HEADER_LEN];
        shp.write_all(&placeholder).map_err(create_error)?;
        shx.write_all(&placeholder).map_err(create_error)?;

        log::debug!("creating {path} ({}, {})", spec.geometry_kind, encoding.name());
        Ok(Box::new(ShapefileWriter {
            path: path.to_path_buf(),
            encoding,
            shape_type: ShapeType::for_kind(spec.geometry_kind),
            shp,
            shx,
            dbf,
            columns: Vec::new(),
            table_started: false,
            records: 0,
            shp_len: u64::try_from(shp::HEADER_LEN).unwrap_or_default(),
            bounds: None,
        }))
    }

    fn inspect(&self, path: &Utf8Path) -> Result<ArtifactInfo, ArtifactError> {
        let open_error = |source: Box<dyn std::error::Error + Send + Sync>| ArtifactError::Open {
            path: path.to_path_buf(),
            source,
        };
        let shp_header = read_prefix(path, shp::HEADER_LEN).map_err(|err| open_error(Box::new(err)))?;
        let header = shp::decode_header(&shp_header).map_err(|err| open_error(Box::new(err)))?;
        let geometry_kind =
            ShapeType::kind_from_code(header.shape_code).unwrap_or(GeometryKind::Unknown);

        let encoding_label = optional_sidecar(path, "cpg");
        let encoding = encoding_label
            .as_deref()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        let dbf_bytes = read_all(&sidecar_path(path, "dbf")).map_err(|err| open_error(Box::new(err)))?;
        let table = dbf::decode_header(&dbf_bytes, encoding).map_err(|err| open_error(Box::new(err)))?;
        let srs_definition = optional_sidecar(path, "prj");

        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            srs: None,
            srs_definition,
            encoding: encoding_label,
            geometry_kind,
            feature_count: u64::from(table.records),
            fields: table.fields,
        })
    }
}

fn resolve_encoding(label: &str) -> Result<&'static Encoding, ArtifactError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ArtifactError::UnsupportedEncoding {
        label: label.to_owned(),
    })
}

/// Sidecar text, or `None` when it is missing, empty or unreadable.
fn optional_sidecar(path: &Utf8Path, extension: &str) -> Option<String> {
    let sidecar = sidecar_path(path, extension);
    match read_sidecar(&sidecar) {
        Ok(text) => text.filter(|text| !text.is_empty()),
        Err(err) => {
            log::warn!("ignoring unreadable {sidecar}: {err}");
            None
        }
    }
}

fn write_text(path: &Utf8Path, text: &str) -> io::Result<()> {
    let mut file = create_utf8_file(path)?;
    file.write_all(text.as_bytes())
}

fn read_prefix(path: &Utf8Path, len: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; len];
    open_utf8_file(path)?.read_exact(&mut buffer)?;
    Ok(buffer)
}

fn read_all(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    open_utf8_file(path)?.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Streaming writer for one shapefile.
#[derive(Debug)]
pub struct ShapefileWriter {
    path: Utf8PathBuf,
    encoding: &'static Encoding,
    shape_type: Option<ShapeType>,
    shp: BufWriter<File>,
    shx: BufWriter<File>,
    dbf: BufWriter<File>,
    columns: Vec<Column>,
    table_started: bool,
    records: u32,
    shp_len: u64,
    bounds: Option<Rect<f64>>,
}

impl ShapefileWriter {
    fn write_error(&self, source: io::Error) -> ArtifactError {
        ArtifactError::Write {
            path: self.path.clone(),
            source: Box::new(source),
        }
    }

    fn start_table(&mut self) -> Result<(), ArtifactError> {
        if self.table_started {
            return Ok(());
        }
        let header = dbf::encode_header(&self.columns, 0).map_err(|err| ArtifactError::Write {
            path: self.path.clone(),
            source: Box::new(err),
        })?;
        self.dbf
            .write_all(&header)
            .map_err(|source| self.write_error(source))?;
        self.table_started = true;
        Ok(())
    }

    fn patch_headers(&mut self, shape_type: ShapeType) -> io::Result<()> {
        let records = u64::from(self.records);
        let shx_len = u64::try_from(shp::HEADER_LEN).unwrap_or_default() + records * 8;
        for (file, len) in [(&mut self.shp, self.shp_len), (&mut self.shx, shx_len)] {
            let header = shp::encode_header(shape_type, len, self.bounds)
                .map_err(io::Error::other)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header)?;
            file.flush()?;
        }

        self.dbf.write_all(&[dbf::END_OF_FILE])?;
        self.dbf.seek(SeekFrom::Start(dbf::RECORD_COUNT_OFFSET))?;
        let mut count = Vec::with_capacity(4);
        bytes::put_u32_le(&mut count, self.records);
        self.dbf.write_all(&count)?;
        self.dbf.flush()
    }
}

impl ArtifactWriter for ShapefileWriter {
    fn create_field(&mut self, field: &FieldDefn) -> Result<String, ArtifactError> {
        let rejected = |err: ShapefileError| ArtifactError::Field {
            field: field.name.clone(),
            reason: err.to_string(),
        };
        if self.table_started {
            return Err(rejected(ShapefileError::LateField {
                field: field.name.clone(),
            }));
        }
        let column = dbf::column_for(field, &self.columns, self.encoding).map_err(rejected)?;
        let stored = column.name.clone();
        self.columns.push(column);
        Ok(stored)
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<(), ArtifactError> {
        let rejected = |err: ShapefileError| ArtifactError::Feature {
            fid: feature.fid,
            reason: err.to_string(),
        };
        let shape_type = match self.shape_type {
            Some(known) => known,
            None => feature
                .geometry
                .as_ref()
                .map_or(Ok(None), |geometry| {
                    ShapeType::for_geometry(geometry).map(Some).ok_or_else(|| {
                        ShapefileError::IncompatibleGeometry {
                            shape_type: ShapeType::Null,
                            geometry: "GeometryCollection",
                        }
                    })
                })
                .map_err(rejected)?
                .unwrap_or(ShapeType::Null),
        };
        let shape = shp::encode_shape(feature.geometry.as_ref(), shape_type).map_err(rejected)?;
        let record = dbf::encode_record(
            &self.columns,
            |name| feature.attribute(name).cloned(),
            self.encoding,
        )
        .map_err(rejected)?;
        let record_number = self
            .records
            .checked_add(1)
            .and_then(|next| i32::try_from(next).ok().map(|number| (next, number)))
            .ok_or_else(|| rejected(ShapefileError::TooLarge { what: "record count" }))?;
        let content_words = i32::try_from(shape.content.len() >> 1)
            .map_err(|_| rejected(ShapefileError::TooLarge { what: "shape" }))?;
        let offset_words = i32::try_from(self.shp_len >> 1)
            .map_err(|_| rejected(ShapefileError::TooLarge { what: "file" }))?;

        self.start_table()?;
        if self.shape_type.is_none() && feature.geometry.is_some() {
            self.shape_type = Some(shape_type);
        }

        let mut record_header = Vec::with_capacity(8);
        put_i32_be(&mut record_header, record_number.1);
        put_i32_be(&mut record_header, content_words);
        let mut index_entry = Vec::with_capacity(8);
        put_i32_be(&mut index_entry, offset_words);
        put_i32_be(&mut index_entry, content_words);

        let written = self
            .shp
            .write_all(&record_header)
            .and_then(|()| self.shp.write_all(&shape.content))
            .and_then(|()| self.shx.write_all(&index_entry))
            .and_then(|()| self.dbf.write_all(&record));
        written.map_err(|source| self.write_error(source))?;

        self.records = record_number.0;
        self.shp_len += u64::try_from(record_header.len() + shape.content.len()).unwrap_or_default();
        if let Some(bounds) = shape.bounds {
            self.bounds = Some(shp::merge_bounds(self.bounds, bounds));
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64, ArtifactError> {
        self.start_table()?;
        let shape_type = self.shape_type.unwrap_or(ShapeType::Null);
        self.patch_headers(shape_type)
            .map_err(|source| self.write_error(source))?;
        log::debug!("wrote {} records to {}", self.records, self.path);
        Ok(u64::from(self.records))
    }
}

#[cfg(test)]
mod tests;
