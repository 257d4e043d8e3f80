//! Static registry of the artifact formats this build can write.

use layersync_core::{ArtifactDriver, ArtifactError};

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    /// Canonical format name.
    pub name: &'static str,
    /// Short aliases accepted on the command line.
    pub aliases: &'static [&'static str],
    /// Whether the driver was compiled in.
    pub available: bool,
}

impl DriverInfo {
    fn matches(&self, name: &str) -> bool {
        let wanted = name.trim();
        self.name.eq_ignore_ascii_case(wanted)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(wanted))
    }
}

/// Every known artifact format.
pub const DRIVERS: &[DriverInfo] = &[DriverInfo {
    name: "ESRI Shapefile",
    aliases: &["shapefile", "shp"],
    available: cfg!(feature = "shapefile"),
}];

/// Name of the driver used when none is configured.
pub const DEFAULT_DRIVER: &str = "ESRI Shapefile";

/// Look up a driver by name or alias.
///
/// Unknown names and drivers left out of this build are both reported as
/// [`ArtifactError::DriverUnavailable`], which aborts an export pass.
///
/// # Examples
/// ```
/// use layersync_data::drivers::artifact_driver;
///
/// assert!(artifact_driver("GML").is_err());
/// ```
pub fn artifact_driver(name: &str) -> Result<Box<dyn ArtifactDriver>, ArtifactError> {
    let unavailable = |reason: &str| ArtifactError::DriverUnavailable {
        driver: name.to_owned(),
        reason: reason.to_owned(),
    };
    let info = DRIVERS
        .iter()
        .find(|info| info.matches(name))
        .ok_or_else(|| unavailable("unknown format"))?;
    if !info.available {
        return Err(unavailable("not compiled into this build"));
    }
    build(info.name).ok_or_else(|| unavailable("not compiled into this build"))
}

#[cfg(feature = "shapefile")]
fn build(name: &str) -> Option<Box<dyn ArtifactDriver>> {
    (name == crate::shapefile::DRIVER_NAME)
        .then(|| Box::new(crate::shapefile::ShapefileDriver) as Box<dyn ArtifactDriver>)
}

#[cfg(not(feature = "shapefile"))]
const fn build(_name: &str) -> Option<Box<dyn ArtifactDriver>> {
    None
}
