//! Command-line interface for synchronising GeoPackage layers with a Kart
//! working tree.
//!
//! Each subcommand layers its options from CLI flags, `LAYERSYNC_*`
//! environment variables and configuration files, resolves them into a
//! config record and runs one engine pass, rendering the report as text.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use layersync_data::{GeoPackage, KartCli};

mod error;
mod export;
mod import;
mod inspect;
mod project;
mod render;

pub use error::CliError;

use export::{CoerceArgs, ExportArgs};
use import::{ImportArgs, LayersArgs};
use inspect::InspectArgs;
use project::ProjectSaveArgs;

const ARG_CONTAINER: &str = "container";
const ARG_OUTPUT_DIR: &str = "output-dir";
const ARG_INCLUDE: &str = "include";
const ARG_EXCLUDE: &str = "exclude";
const ARG_EXTRA_PREFIX: &str = "extra-prefix";
const ARG_ENCODING: &str = "encoding";
const ARG_FORMAT: &str = "format";
const ARG_EXPORT_EMPTY_LAYERS: &str = "export-empty-layers";
const ARG_TRACKED: &str = "tracked";
const ARG_ARTIFACT_DIR: &str = "artifact-dir";
const ARG_WORKING_TREE: &str = "working-tree";
const ARG_NO_REPLACE: &str = "no-replace";
const ARG_KART_PROGRAM: &str = "kart-program";
const ARG_INITIAL: &str = "initial";

const ENV_COERCE_CONTAINER: &str = "LAYERSYNC_CMDS_COERCE_CONTAINER";
const ENV_EXPORT_CONTAINER: &str = "LAYERSYNC_CMDS_EXPORT_CONTAINER";
const ENV_EXPORT_WORKING_TREE: &str = "LAYERSYNC_CMDS_EXPORT_WORKING_TREE";
const ENV_IMPORT_WORKING_TREE: &str = "LAYERSYNC_CMDS_IMPORT_WORKING_TREE";
const ENV_LAYERS_WORKING_TREE: &str = "LAYERSYNC_CMDS_LAYERS_WORKING_TREE";
const ENV_INSPECT_ARTIFACT_DIR: &str = "LAYERSYNC_CMDS_INSPECT_ARTIFACT_DIR";
const ENV_PROJECT_SAVE_CONTAINER: &str = "LAYERSYNC_CMDS_PROJECT_SAVE_CONTAINER";

/// Run the layersync CLI with the current process arguments and environment.
///
/// Reports are written to standard output.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_command(cli.command, &mut stdout)
}

fn run_command(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Coerce(args) => export::run_coerce(args, writer),
        Command::Export(args) => export::run_export(args, writer),
        Command::Sync(args) => export::run_sync(args, writer),
        Command::Import(args) => import::run_import(args, writer),
        Command::Layers(args) => import::run_layers(args, writer),
        Command::Inspect(args) => inspect::run_inspect(args, writer),
        Command::ProjectSave(args) => project::run_project_save(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "layersync",
    about = "Synchronise GeoPackage layers with a version-controlled working tree",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Narrow 64-bit integer fields to 32 bits.
    Coerce(CoerceArgs),
    /// Write eligible layers to single-layer artifacts.
    Export(ExportArgs),
    /// Coerce, then export, with the export options.
    Sync(ExportArgs),
    /// Hand exported artifacts to Kart.
    Import(ImportArgs),
    /// List the layers Kart tracks.
    Layers(LayersArgs),
    /// Summarise artifacts or the layers of a GeoPackage.
    Inspect(InspectArgs),
    /// Normalise the QGIS project table before saving a project.
    ProjectSave(ProjectSaveArgs),
}

/// Fail unless `path` names an existing regular file.
fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match layersync_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) if path.exists() => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn kart_cli(program: Option<&str>) -> KartCli {
    program.map_or_else(KartCli::default, KartCli::new)
}

fn open_container(path: &Utf8Path) -> Result<GeoPackage, CliError> {
    require_existing(path, ARG_CONTAINER)?;
    GeoPackage::open(path).map_err(|source| CliError::OpenContainer {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests;
