//! In-memory collaborators used by unit, doc and behaviour tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    ArtifactDriver, ArtifactError, ArtifactInfo, ArtifactSpec, ArtifactWriter, Container,
    ContainerEdit, ContainerError, Feature, FeatureVisitor, FieldDefn, FieldType, FieldValue,
    GeometryKind, IntegerCell, LayerSchema, ToolOutcome, VersionControl, VersionControlError,
};

#[derive(Debug, Clone, PartialEq)]
struct MemoryLayer {
    schema: LayerSchema,
    features: Vec<Feature>,
}

/// Container holding its layers in memory.
///
/// Edits work on a staged copy that replaces the layers on commit, so an
/// uncommitted edit leaves the container untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContainer {
    location: String,
    layers: BTreeMap<String, MemoryLayer>,
    failing_writes: BTreeSet<String>,
    unopenable: bool,
}

impl Default for MemoryContainer {
    fn default() -> Self {
        Self {
            location: "memory".to_owned(),
            layers: BTreeMap::new(),
            failing_writes: BTreeSet::new(),
            unopenable: false,
        }
    }
}

impl MemoryContainer {
    /// Add a layer. Features without an identifier are numbered from 1.
    #[must_use]
    pub fn with_layer(mut self, schema: LayerSchema, features: Vec<Feature>) -> Self {
        let features = features
            .into_iter()
            .zip(1_i64..)
            .map(|(feature, fid)| match feature.fid {
                Some(_) => feature,
                None => feature.with_fid(fid),
            })
            .collect();
        self.layers
            .insert(schema.name.clone(), MemoryLayer { schema, features });
        self
    }

    /// Make every schema write to `layer` fail.
    #[must_use]
    pub fn failing_writes_to(mut self, layer: &str) -> Self {
        self.failing_writes.insert(layer.to_owned());
        self
    }

    /// Make every access fail as if the container could not be opened.
    #[must_use]
    pub const fn unopenable(mut self) -> Self {
        self.unopenable = true;
        self
    }

    /// Features of `layer`, or an empty slice when it does not exist.
    #[must_use]
    pub fn features(&self, layer: &str) -> &[Feature] {
        self.layers
            .get(layer)
            .map(|stored| stored.features.as_slice())
            .unwrap_or_default()
    }

    fn check_open(&self) -> Result<(), ContainerError> {
        if self.unopenable {
            return Err(ContainerError::Open {
                location: self.location.clone(),
                source: "container is unopenable".into(),
            });
        }
        Ok(())
    }

    fn layer(&self, layer: &str) -> Result<&MemoryLayer, ContainerError> {
        self.check_open()?;
        self.layers
            .get(layer)
            .ok_or_else(|| ContainerError::MissingLayer {
                layer: layer.to_owned(),
            })
    }
}

impl Container for MemoryContainer {
    type Edit<'a> = MemoryEdit<'a>;

    fn location(&self) -> &str {
        &self.location
    }

    fn layer_names(&self) -> Result<Vec<String>, ContainerError> {
        self.check_open()?;
        Ok(self.layers.keys().cloned().collect())
    }

    fn layer_schema(&self, layer: &str) -> Result<LayerSchema, ContainerError> {
        Ok(self.layer(layer)?.schema.clone())
    }

    fn feature_count(&self, layer: &str) -> Result<u64, ContainerError> {
        Ok(self.layer(layer)?.features.len() as u64)
    }

    fn visit_features(
        &self,
        layer: &str,
        visitor: &mut FeatureVisitor<'_>,
    ) -> Result<(), ContainerError> {
        for feature in &self.layer(layer)?.features {
            visitor(Ok(feature.clone()));
        }
        Ok(())
    }

    fn begin_edit(&mut self) -> Result<Self::Edit<'_>, ContainerError> {
        self.check_open()?;
        let staged = self.layers.clone();
        Ok(MemoryEdit {
            container: self,
            staged,
        })
    }
}

/// Staged edit of a [`MemoryContainer`].
#[derive(Debug)]
pub struct MemoryEdit<'a> {
    container: &'a mut MemoryContainer,
    staged: BTreeMap<String, MemoryLayer>,
}

impl MemoryEdit<'_> {
    fn layer(&self, layer: &str) -> Result<&MemoryLayer, ContainerError> {
        self.staged
            .get(layer)
            .ok_or_else(|| ContainerError::MissingLayer {
                layer: layer.to_owned(),
            })
    }

    fn layer_mut(&mut self, layer: &str) -> Result<&mut MemoryLayer, ContainerError> {
        if self.container.failing_writes.contains(layer) {
            return Err(ContainerError::Write {
                layer: layer.to_owned(),
                source: "injected write failure".into(),
            });
        }
        self.staged
            .get_mut(layer)
            .ok_or_else(|| ContainerError::MissingLayer {
                layer: layer.to_owned(),
            })
    }

    fn require_field(stored: &MemoryLayer, layer: &str, field: &str) -> Result<(), ContainerError> {
        if stored.schema.field(field).is_none() {
            return Err(ContainerError::MissingField {
                layer: layer.to_owned(),
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

impl ContainerEdit for MemoryEdit<'_> {
    fn layer_names(&self) -> Result<Vec<String>, ContainerError> {
        Ok(self.staged.keys().cloned().collect())
    }

    fn fields(&self, layer: &str) -> Result<Vec<FieldDefn>, ContainerError> {
        Ok(self.layer(layer)?.schema.fields.clone())
    }

    fn add_field(&mut self, layer: &str, field: &FieldDefn) -> Result<(), ContainerError> {
        let stored = self.layer_mut(layer)?;
        if stored.schema.field(&field.name).is_some() {
            return Err(ContainerError::DuplicateField {
                layer: layer.to_owned(),
                field: field.name.clone(),
            });
        }
        stored.schema.fields.push(field.clone());
        Ok(())
    }

    fn integer_values(
        &self,
        layer: &str,
        field: &str,
    ) -> Result<Vec<(i64, IntegerCell)>, ContainerError> {
        let stored = self.layer(layer)?;
        Self::require_field(stored, layer, field)?;
        Ok(stored
            .features
            .iter()
            .map(|feature| {
                let cell = match feature.attribute(field) {
                    None => IntegerCell::Null,
                    Some(FieldValue::Integer(number)) => IntegerCell::Integer(*number),
                    Some(other) => IntegerCell::Mismatch(format!("{other:?}")),
                };
                (feature.fid.unwrap_or_default(), cell)
            })
            .collect())
    }

    fn set_integer(
        &mut self,
        layer: &str,
        field: &str,
        fid: i64,
        value: Option<i64>,
    ) -> Result<(), ContainerError> {
        let stored = self.layer_mut(layer)?;
        Self::require_field(stored, layer, field)?;
        if let Some(feature) = stored.features.iter_mut().find(|f| f.fid == Some(fid)) {
            feature.set_attribute(field, value.map(FieldValue::Integer));
        }
        Ok(())
    }

    fn delete_field(&mut self, layer: &str, field: &str) -> Result<(), ContainerError> {
        let stored = self.layer_mut(layer)?;
        Self::require_field(stored, layer, field)?;
        stored.schema.fields.retain(|defn| defn.name != field);
        for feature in &mut stored.features {
            feature.take_attribute(field);
        }
        Ok(())
    }

    fn rename_field(&mut self, layer: &str, from: &str, to: &str) -> Result<(), ContainerError> {
        let stored = self.layer_mut(layer)?;
        Self::require_field(stored, layer, from)?;
        if stored.schema.field(to).is_some() {
            return Err(ContainerError::DuplicateField {
                layer: layer.to_owned(),
                field: to.to_owned(),
            });
        }
        for defn in &mut stored.schema.fields {
            if defn.name == from {
                to.clone_into(&mut defn.name);
            }
        }
        for feature in &mut stored.features {
            let value = feature.take_attribute(from);
            feature.set_attribute(to, value);
        }
        Ok(())
    }

    fn commit(self) -> Result<(), ContainerError> {
        self.container.layers = self.staged;
        Ok(())
    }
}

/// Artifact captured by a [`MemoryDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryArtifact {
    /// Creation parameters.
    pub spec: ArtifactSpec,
    /// Declared fields, with stored names.
    pub fields: Vec<FieldDefn>,
    /// Written features.
    pub features: Vec<Feature>,
}

impl MemoryArtifact {
    fn empty(layer_name: &str) -> Self {
        Self {
            spec: ArtifactSpec {
                layer_name: layer_name.to_owned(),
                srs: None,
                geometry_kind: GeometryKind::Unknown,
                encoding: crate::DEFAULT_ENCODING.to_owned(),
            },
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Stored field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
enum StoredArtifact {
    Written(MemoryArtifact),
    Described(ArtifactInfo),
    Partial,
    Unreadable,
}

/// Artifact driver that keeps artifacts in memory under `.mem` paths.
///
/// Binary fields are rejected, mirroring formats without a byte type.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    artifacts: RefCell<BTreeMap<Utf8PathBuf, StoredArtifact>>,
    directories: RefCell<Vec<Utf8PathBuf>>,
    failing_layers: BTreeSet<String>,
    fatal_fields: BTreeSet<String>,
    rejected_encodings: BTreeSet<String>,
    max_field_len: Option<usize>,
    unavailable: bool,
    unlistable: bool,
}

impl MemoryDriver {
    /// Fail creation of the artifact for `layer`.
    #[must_use]
    pub fn failing_layer(mut self, layer: &str) -> Self {
        self.failing_layers.insert(layer.to_owned());
        self
    }

    /// Fail declaration of `field` with an error that stops the pass.
    #[must_use]
    pub fn fatal_on_field(mut self, field: &str) -> Self {
        self.fatal_fields.insert(field.to_owned());
        self
    }

    /// Refuse to write artifacts declaring `label`.
    #[must_use]
    pub fn rejecting_encoding(mut self, label: &str) -> Self {
        self.rejected_encodings.insert(label.to_owned());
        self
    }

    /// Report the driver as unavailable on every creation.
    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fail every directory listing.
    #[must_use]
    pub const fn unlistable(mut self) -> Self {
        self.unlistable = true;
        self
    }

    /// Truncate field names to `len` characters.
    #[must_use]
    pub const fn with_max_field_len(mut self, len: usize) -> Self {
        self.max_field_len = Some(len);
        self
    }

    /// Seed empty artifacts for `layers` inside `dir`.
    #[must_use]
    pub fn with_artifacts<I, S>(self, dir: &str, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for layer in layers {
            let path = self.artifact_path(Utf8Path::new(dir), layer.as_ref());
            self.artifacts.borrow_mut().insert(
                path,
                StoredArtifact::Written(MemoryArtifact::empty(layer.as_ref())),
            );
        }
        self
    }

    /// Seed an artifact that inspects as `info`.
    #[must_use]
    pub fn with_info(self, info: ArtifactInfo) -> Self {
        self.artifacts
            .borrow_mut()
            .insert(info.path.clone(), StoredArtifact::Described(info));
        self
    }

    /// Seed an artifact that cannot be opened.
    #[must_use]
    pub fn with_unreadable(self, path: &str) -> Self {
        self.artifacts
            .borrow_mut()
            .insert(Utf8PathBuf::from(path), StoredArtifact::Unreadable);
        self
    }

    /// Artifact written at `path`, if any.
    #[must_use]
    pub fn artifact(&self, path: &Utf8Path) -> Option<MemoryArtifact> {
        match self.artifacts.borrow().get(path) {
            Some(StoredArtifact::Written(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// Directories created so far.
    #[must_use]
    pub fn directories(&self) -> Vec<Utf8PathBuf> {
        self.directories.borrow().clone()
    }
}

impl ArtifactDriver for MemoryDriver {
    fn name(&self) -> &str {
        "Memory"
    }

    fn extension(&self) -> &str {
        "mem"
    }

    fn check_writable(&self, encoding: &str) -> Result<(), ArtifactError> {
        if self.unavailable {
            return Err(ArtifactError::DriverUnavailable {
                driver: self.name().to_owned(),
                reason: "disabled for this test".to_owned(),
            });
        }
        if self.rejected_encodings.contains(encoding) {
            return Err(ArtifactError::UnsupportedEncoding {
                label: encoding.to_owned(),
            });
        }
        Ok(())
    }

    fn ensure_directory(&self, dir: &Utf8Path) -> Result<(), ArtifactError> {
        let mut directories = self.directories.borrow_mut();
        if !directories.iter().any(|known| known == dir) {
            directories.push(dir.to_path_buf());
        }
        Ok(())
    }

    fn list_artifacts(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ArtifactError> {
        if self.unlistable {
            return Err(ArtifactError::Directory {
                path: dir.to_path_buf(),
                source: "directory is unlistable".into(),
            });
        }
        Ok(self
            .artifacts
            .borrow()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn remove_artifact(&self, path: &Utf8Path) -> Result<(), ArtifactError> {
        self.artifacts.borrow_mut().remove(path);
        Ok(())
    }

    fn create(
        &self,
        path: &Utf8Path,
        spec: &ArtifactSpec,
    ) -> Result<Box<dyn ArtifactWriter + '_>, ArtifactError> {
        self.check_writable(&spec.encoding)?;
        if self.failing_layers.contains(&spec.layer_name) {
            return Err(ArtifactError::Create {
                path: path.to_path_buf(),
                source: "injected creation failure".into(),
            });
        }
        self.artifacts
            .borrow_mut()
            .insert(path.to_path_buf(), StoredArtifact::Partial);
        Ok(Box::new(MemoryWriter {
            driver: self,
            path: path.to_path_buf(),
            artifact: MemoryArtifact {
                spec: spec.clone(),
                fields: Vec::new(),
                features: Vec::new(),
            },
        }))
    }

    fn inspect(&self, path: &Utf8Path) -> Result<ArtifactInfo, ArtifactError> {
        let open_error = || ArtifactError::Open {
            path: path.to_path_buf(),
            source: "artifact cannot be read".into(),
        };
        match self.artifacts.borrow().get(path) {
            Some(StoredArtifact::Written(artifact)) => Ok(ArtifactInfo {
                path: path.to_path_buf(),
                srs: artifact.spec.srs.clone(),
                srs_definition: None,
                encoding: Some(artifact.spec.encoding.clone()),
                geometry_kind: artifact.spec.geometry_kind,
                feature_count: artifact.features.len() as u64,
                fields: artifact.fields.clone(),
            }),
            Some(StoredArtifact::Described(info)) => Ok(info.clone()),
            Some(StoredArtifact::Partial | StoredArtifact::Unreadable) | None => Err(open_error()),
        }
    }
}

struct MemoryWriter<'a> {
    driver: &'a MemoryDriver,
    path: Utf8PathBuf,
    artifact: MemoryArtifact,
}

impl ArtifactWriter for MemoryWriter<'_> {
    fn create_field(&mut self, field: &FieldDefn) -> Result<String, ArtifactError> {
        if self.driver.fatal_fields.contains(&field.name) {
            return Err(ArtifactError::DriverUnavailable {
                driver: self.driver.name().to_owned(),
                reason: format!("lost while declaring {}", field.name),
            });
        }
        if field.field_type == FieldType::Binary {
            return Err(ArtifactError::Field {
                field: field.name.clone(),
                reason: "binary fields are not supported".to_owned(),
            });
        }
        let stored: String = match self.driver.max_field_len {
            Some(len) => field.name.chars().take(len).collect(),
            None => field.name.clone(),
        };
        let mut defn = field.clone();
        defn.name.clone_from(&stored);
        self.artifact.fields.push(defn);
        Ok(stored)
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<(), ArtifactError> {
        self.artifact.features.push(feature.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, ArtifactError> {
        let Self {
            driver,
            path,
            artifact,
        } = *self;
        let count = artifact.features.len() as u64;
        driver
            .artifacts
            .borrow_mut()
            .insert(path, StoredArtifact::Written(artifact));
        Ok(count)
    }
}

/// One recorded import call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCall {
    /// Artifact passed to the tool.
    pub artifact: Utf8PathBuf,
    /// Replace policy passed to the tool.
    pub replace_existing: bool,
    /// Working tree in effect during the call.
    pub working_tree: Option<Utf8PathBuf>,
}

/// Version-control double recording every call.
#[derive(Debug, Default)]
pub struct RecordingVersionControl {
    working_tree: Option<Utf8PathBuf>,
    calls: Vec<ImportCall>,
    failing: BTreeSet<String>,
    panicking: BTreeSet<String>,
    tracked: Vec<String>,
    listing_fails: bool,
}

impl RecordingVersionControl {
    /// Start with `tree` as the working tree.
    #[must_use]
    pub fn with_working_tree(mut self, tree: &str) -> Self {
        self.working_tree = Some(Utf8PathBuf::from(tree));
        self
    }

    /// Reject artifacts whose file name is `file_name`.
    #[must_use]
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_owned());
        self
    }

    /// Panic when importing artifacts whose file name is `file_name`.
    #[must_use]
    pub fn panicking_on(mut self, file_name: &str) -> Self {
        self.panicking.insert(file_name.to_owned());
        self
    }

    /// Report `layers` as tracked.
    #[must_use]
    pub fn with_tracked_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked = layers.into_iter().map(Into::into).collect();
        self
    }

    /// Make every layer listing fail as the tool would.
    #[must_use]
    pub const fn failing_to_list(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> &[ImportCall] {
        &self.calls
    }
}

impl VersionControl for RecordingVersionControl {
    fn working_tree(&self) -> Option<&Utf8Path> {
        self.working_tree.as_deref()
    }

    fn set_working_tree(&mut self, tree: Option<Utf8PathBuf>) -> Option<Utf8PathBuf> {
        std::mem::replace(&mut self.working_tree, tree)
    }

    #[expect(
        clippy::panic_in_result_fn,
        reason = "simulates a collaborator that unwinds mid-batch"
    )]
    fn import(
        &mut self,
        artifact: &Utf8Path,
        replace_existing: bool,
    ) -> Result<ToolOutcome, VersionControlError> {
        if self.working_tree.is_none() {
            return Err(VersionControlError::NoWorkingTree);
        }
        self.calls.push(ImportCall {
            artifact: artifact.to_path_buf(),
            replace_existing,
            working_tree: self.working_tree.clone(),
        });
        let file_name = artifact.file_name().unwrap_or_default();
        if self.panicking.contains(file_name) {
            panic!("import of {artifact} panicked");
        }
        if self.failing.contains(file_name) {
            return Ok(ToolOutcome::failed(1, format!("cannot import {file_name}")));
        }
        Ok(ToolOutcome::succeeded(format!("imported {file_name}")))
    }

    fn list_layers(&mut self) -> Result<Vec<String>, VersionControlError> {
        if self.working_tree.is_none() {
            return Err(VersionControlError::NoWorkingTree);
        }
        if self.listing_fails {
            return Err(VersionControlError::Failed {
                command: "data ls".to_owned(),
                status: Some(1),
                detail: "not a repository".to_owned(),
            });
        }
        Ok(self.tracked.clone())
    }
}
