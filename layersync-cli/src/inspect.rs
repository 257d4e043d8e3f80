//! `inspect` command.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use layersync_core::{inspect_artifacts, inspect_container};
use layersync_data::{DEFAULT_DRIVER, artifact_driver};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_ARTIFACT_DIR, ARG_CONTAINER, ARG_FORMAT, CliError, ENV_INSPECT_ARTIFACT_DIR,
    open_container, render,
};

/// CLI arguments for the `inspect` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "inspect",
    long_about = "Report spatial reference, text encoding, geometry kind, \
                 feature count and fields for every artifact in a directory, \
                 or for every layer of a GeoPackage.",
    about = "Summarise artifacts or the layers of a GeoPackage"
)]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct InspectArgs {
    /// Directory of artifacts to inspect.
    #[arg(long = ARG_ARTIFACT_DIR, value_name = "dir", conflicts_with = ARG_CONTAINER)]
    #[serde(default)]
    pub(crate) artifact_dir: Option<Utf8PathBuf>,
    /// GeoPackage whose layers are inspected instead.
    #[arg(long = ARG_CONTAINER, value_name = "gpkg")]
    #[serde(default)]
    pub(crate) container: Option<Utf8PathBuf>,
    /// Artifact format (default `ESRI Shapefile`).
    #[arg(long = ARG_FORMAT, value_name = "name")]
    #[serde(default)]
    pub(crate) format: Option<String>,
}

/// What the `inspect` command looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InspectTarget {
    Artifacts { dir: Utf8PathBuf, format: String },
    Container(Utf8PathBuf),
}

impl TryFrom<InspectArgs> for InspectTarget {
    type Error = CliError;

    fn try_from(args: InspectArgs) -> Result<Self, Self::Error> {
        match (args.artifact_dir, args.container) {
            (Some(_), Some(_)) => Err(CliError::ConflictingArguments {
                first: ARG_ARTIFACT_DIR,
                second: ARG_CONTAINER,
            }),
            (Some(dir), None) => Ok(Self::Artifacts {
                dir,
                format: args.format.unwrap_or_else(|| DEFAULT_DRIVER.to_owned()),
            }),
            (None, Some(container)) => Ok(Self::Container(container)),
            (None, None) => Err(CliError::MissingArgument {
                field: ARG_ARTIFACT_DIR,
                env: ENV_INSPECT_ARTIFACT_DIR,
            }),
        }
    }
}

pub(crate) fn run_inspect(args: InspectArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    inspect_target(&InspectTarget::try_from(merged)?, writer)
}

pub(crate) fn inspect_target(
    target: &InspectTarget,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    match target {
        InspectTarget::Artifacts { dir, format } => {
            let driver = artifact_driver(format)?;
            let report = inspect_artifacts(driver.as_ref(), dir)?;
            render::write_artifacts(writer, &report).map_err(CliError::WriteOutput)
        }
        InspectTarget::Container(path) => {
            let geopackage = open_container(path)?;
            let report = inspect_container(&geopackage)?;
            render::write_layers(writer, &report).map_err(CliError::WriteOutput)
        }
    }
}
