//! `import` and `layers` commands, both driving Kart.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use layersync_core::{ImportRequest, SyncConfig, VersionControl, import_artifacts};
use layersync_data::{DEFAULT_DRIVER, artifact_driver};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::export::tracked_layers;
use crate::{
    ARG_ARTIFACT_DIR, ARG_FORMAT, ARG_KART_PROGRAM, ARG_NO_REPLACE, ARG_WORKING_TREE, CliError,
    ENV_IMPORT_WORKING_TREE, ENV_LAYERS_WORKING_TREE, kart_cli, render,
};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "import",
    long_about = "Run `kart import` for every artifact in a directory, inside \
                 the given working tree. A rejected artifact is reported and \
                 the batch continues.",
    about = "Hand exported artifacts to Kart"
)]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct ImportArgs {
    /// Directory holding the artifacts (default `shp`).
    #[arg(long = ARG_ARTIFACT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) artifact_dir: Option<Utf8PathBuf>,
    /// Kart working tree receiving the layers.
    #[arg(long = ARG_WORKING_TREE, value_name = "dir")]
    #[serde(default)]
    pub(crate) working_tree: Option<Utf8PathBuf>,
    /// Keep tracked layers of the same name instead of replacing them.
    #[arg(long = ARG_NO_REPLACE)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) no_replace: bool,
    /// Kart program to run (default `kart`).
    #[arg(long = ARG_KART_PROGRAM, value_name = "program")]
    #[serde(default)]
    pub(crate) kart_program: Option<String>,
    /// Artifact format (default `ESRI Shapefile`).
    #[arg(long = ARG_FORMAT, value_name = "name")]
    #[serde(default)]
    pub(crate) format: Option<String>,
}

impl ImportArgs {
    pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportConfig {
    pub(crate) request: ImportRequest,
    pub(crate) format: String,
    pub(crate) kart_program: Option<String>,
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let working_tree = args.working_tree.ok_or(CliError::MissingArgument {
            field: ARG_WORKING_TREE,
            env: ENV_IMPORT_WORKING_TREE,
        })?;
        let artifact_dir = args
            .artifact_dir
            .unwrap_or_else(|| SyncConfig::default().output_dir);
        Ok(Self {
            request: ImportRequest {
                artifact_dir,
                working_tree,
                replace_existing: !args.no_replace,
            },
            format: args.format.unwrap_or_else(|| DEFAULT_DRIVER.to_owned()),
            kart_program: args.kart_program,
        })
    }
}

/// CLI arguments for the `layers` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "layers", about = "List the layers Kart tracks")]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct LayersArgs {
    /// Kart working tree to query.
    #[arg(long = ARG_WORKING_TREE, value_name = "dir")]
    #[serde(default)]
    pub(crate) working_tree: Option<Utf8PathBuf>,
    /// Kart program to run (default `kart`).
    #[arg(long = ARG_KART_PROGRAM, value_name = "program")]
    #[serde(default)]
    pub(crate) kart_program: Option<String>,
}

pub(crate) fn run_import(args: ImportArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let mut kart = kart_cli(config.kart_program.as_deref());
    import_with(&config, &mut kart, writer)
}

/// Import through `vcs`, whatever tool stands behind it.
pub(crate) fn import_with(
    config: &ImportConfig,
    vcs: &mut dyn VersionControl,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let driver = artifact_driver(&config.format)?;
    let report = import_artifacts(driver.as_ref(), vcs, &config.request)?;
    render::write_import(writer, &report).map_err(CliError::WriteOutput)
}

pub(crate) fn run_layers(args: LayersArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let working_tree = merged.working_tree.ok_or(CliError::MissingArgument {
        field: ARG_WORKING_TREE,
        env: ENV_LAYERS_WORKING_TREE,
    })?;
    let mut kart = kart_cli(merged.kart_program.as_deref());
    let names = tracked_layers(&mut kart, &working_tree)?;
    render::write_names(writer, &names).map_err(CliError::WriteOutput)
}
