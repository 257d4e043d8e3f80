//! `project-save` command.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use layersync_data::{PROJECT_TABLE, ProjectSaveMode, prepare_project_table};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{ARG_CONTAINER, ARG_INITIAL, CliError, ENV_PROJECT_SAVE_CONTAINER, open_container};

/// CLI arguments for the `project-save` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "project-save",
    long_about = "Normalise the column types of the QGIS project table so \
                 the project can be versioned. Use --initial the first time \
                 a project is saved into the GeoPackage.",
    about = "Normalise the QGIS project table"
)]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct ProjectSaveArgs {
    /// GeoPackage holding the project table.
    #[arg(long = ARG_CONTAINER, value_name = "gpkg")]
    #[serde(default)]
    pub(crate) container: Option<Utf8PathBuf>,
    /// Also convert the metadata column, as needed on the first save.
    #[arg(long = ARG_INITIAL)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) initial: bool,
}

pub(crate) fn run_project_save(
    args: ProjectSaveArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let path = merged.container.ok_or(CliError::MissingArgument {
        field: ARG_CONTAINER,
        env: ENV_PROJECT_SAVE_CONTAINER,
    })?;
    let mode = if merged.initial {
        ProjectSaveMode::Initial
    } else {
        ProjectSaveMode::Subsequent
    };
    save_project(&path, mode, writer)
}

pub(crate) fn save_project(
    path: &Utf8Path,
    mode: ProjectSaveMode,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let mut geopackage = open_container(path)?;
    prepare_project_table(&mut geopackage, mode).map_err(|source| CliError::ProjectTable {
        path: path.to_path_buf(),
        source,
    })?;
    let label = match mode {
        ProjectSaveMode::Initial => "initial",
        ProjectSaveMode::Subsequent => "subsequent",
    };
    writeln!(writer, "prepared {PROJECT_TABLE} in {path} ({label} save)")
        .map_err(CliError::WriteOutput)
}
