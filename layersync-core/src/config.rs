//! Explicit configuration for one synchronisation pass.

use camino::Utf8PathBuf;

use crate::selection::{DEFAULT_EXTRA_PREFIX, STANDARD_LAYERS, SYSTEM_TABLES};

/// Encoding declared on exported artifacts unless configured otherwise.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Settings read once per pass and passed to each engine entry point.
///
/// # Examples
/// ```
/// use layersync_core::SyncConfig;
///
/// let config = SyncConfig::default();
/// assert_eq!(config.encoding, "UTF-8");
/// assert_eq!(config.extra_prefix.as_deref(), Some("X"));
/// assert!(config.exclude_layers.iter().any(|name| name == "qgis_projects"));
/// assert!(!config.export_empty_layers);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Directory receiving exported artifacts.
    pub output_dir: Utf8PathBuf,
    /// Layers always eligible for export unless excluded.
    pub include_layers: Vec<String>,
    /// Layers never exported.
    pub exclude_layers: Vec<String>,
    /// Case-sensitive name prefix marking additional eligible layers.
    pub extra_prefix: Option<String>,
    /// Text encoding label for exported attribute tables.
    pub encoding: String,
    /// Export layers that hold no features.
    pub export_empty_layers: bool,
    /// Replace tracked layers of the same name on import.
    pub replace_existing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("shp"),
            include_layers: STANDARD_LAYERS.iter().map(|name| (*name).to_owned()).collect(),
            exclude_layers: SYSTEM_TABLES.iter().map(|name| (*name).to_owned()).collect(),
            extra_prefix: Some(DEFAULT_EXTRA_PREFIX.to_owned()),
            encoding: DEFAULT_ENCODING.to_owned(),
            export_empty_layers: false,
            replace_existing: true,
        }
    }
}
