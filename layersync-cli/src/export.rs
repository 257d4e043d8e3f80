//! `coerce`, `export` and `sync` commands.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use layersync_core::{
    ExportRequest, SyncConfig, VersionControl, WorkingTreeScope, coerce_integer_fields,
    export_layers,
};
use layersync_data::{DEFAULT_DRIVER, artifact_driver};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_CONTAINER, ARG_ENCODING, ARG_EXCLUDE, ARG_EXPORT_EMPTY_LAYERS, ARG_EXTRA_PREFIX,
    ARG_FORMAT, ARG_INCLUDE, ARG_KART_PROGRAM, ARG_OUTPUT_DIR, ARG_TRACKED, ARG_WORKING_TREE,
    CliError, ENV_COERCE_CONTAINER, ENV_EXPORT_CONTAINER, ENV_EXPORT_WORKING_TREE, kart_cli,
    open_container, render,
};

/// CLI arguments for the `coerce` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "coerce",
    long_about = "Rewrite every 64-bit integer field of every layer as a \
                 32-bit field of the same name. Values that do not fit are \
                 dropped and reported. Safe to re-run.",
    about = "Narrow 64-bit integer fields to 32 bits"
)]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct CoerceArgs {
    /// Path to the GeoPackage to rewrite.
    #[arg(long = ARG_CONTAINER, value_name = "gpkg")]
    #[serde(default)]
    pub(crate) container: Option<Utf8PathBuf>,
}

impl CoerceArgs {
    fn into_container(self) -> Result<Utf8PathBuf, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        merged.container.ok_or(CliError::MissingArgument {
            field: ARG_CONTAINER,
            env: ENV_COERCE_CONTAINER,
        })
    }
}

/// CLI arguments shared by the `export` and `sync` subcommands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "export",
    long_about = "Write every eligible layer of a GeoPackage to its own \
                 artifact. Layers are eligible when named with --include or \
                 carrying the extra prefix, and never when named with \
                 --exclude. With --tracked the candidates come from the \
                 layers Kart already tracks.",
    about = "Write eligible layers to single-layer artifacts"
)]
#[ortho_config(prefix = "LAYERSYNC")]
pub(crate) struct ExportArgs {
    /// Path to the source GeoPackage.
    #[arg(long = ARG_CONTAINER, value_name = "gpkg")]
    #[serde(default)]
    pub(crate) container: Option<Utf8PathBuf>,
    /// Directory receiving the artifacts (default `shp`).
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Layers always eligible, replacing the standard plan layer set.
    #[arg(long = ARG_INCLUDE, value_name = "layers", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) include: Option<Vec<String>>,
    /// Layers never exported, replacing the system table set.
    #[arg(long = ARG_EXCLUDE, value_name = "layers", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) exclude: Option<Vec<String>>,
    /// Name prefix marking additional eligible layers (default `X`).
    #[arg(long = ARG_EXTRA_PREFIX, value_name = "prefix")]
    #[serde(default)]
    pub(crate) extra_prefix: Option<String>,
    /// Text encoding declared on artifacts (default `UTF-8`).
    #[arg(long = ARG_ENCODING, value_name = "label")]
    #[serde(default)]
    pub(crate) encoding: Option<String>,
    /// Artifact format (default `ESRI Shapefile`).
    #[arg(long = ARG_FORMAT, value_name = "name")]
    #[serde(default)]
    pub(crate) format: Option<String>,
    /// Export layers that hold no features.
    #[arg(long = ARG_EXPORT_EMPTY_LAYERS)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) export_empty_layers: bool,
    /// Take candidate layers from the Kart working tree.
    #[arg(long = ARG_TRACKED)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) tracked: bool,
    /// Kart working tree queried by --tracked.
    #[arg(long = ARG_WORKING_TREE, value_name = "dir")]
    #[serde(default)]
    pub(crate) working_tree: Option<Utf8PathBuf>,
    /// Kart program to run (default `kart`).
    #[arg(long = ARG_KART_PROGRAM, value_name = "program")]
    #[serde(default)]
    pub(crate) kart_program: Option<String>,
}

impl ExportArgs {
    pub(crate) fn into_config(self) -> Result<ExportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ExportConfig::try_from(merged)
    }
}

/// Where candidate layer names come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidates {
    /// Every layer of the container.
    Container,
    /// Layers tracked in a Kart working tree.
    Tracked { working_tree: Utf8PathBuf },
}

/// Resolved `export` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExportConfig {
    pub(crate) container: Utf8PathBuf,
    pub(crate) format: String,
    pub(crate) sync: SyncConfig,
    pub(crate) candidates: Candidates,
    pub(crate) kart_program: Option<String>,
}

impl TryFrom<ExportArgs> for ExportConfig {
    type Error = CliError;

    fn try_from(args: ExportArgs) -> Result<Self, Self::Error> {
        let container = args.container.ok_or(CliError::MissingArgument {
            field: ARG_CONTAINER,
            env: ENV_EXPORT_CONTAINER,
        })?;
        let candidates = if args.tracked {
            let working_tree = args.working_tree.ok_or(CliError::MissingArgument {
                field: ARG_WORKING_TREE,
                env: ENV_EXPORT_WORKING_TREE,
            })?;
            Candidates::Tracked { working_tree }
        } else {
            Candidates::Container
        };

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            output_dir: args.output_dir.unwrap_or(defaults.output_dir),
            include_layers: args.include.unwrap_or(defaults.include_layers),
            exclude_layers: args.exclude.unwrap_or(defaults.exclude_layers),
            extra_prefix: args.extra_prefix.or(defaults.extra_prefix),
            encoding: args.encoding.unwrap_or(defaults.encoding),
            export_empty_layers: args.export_empty_layers,
            replace_existing: defaults.replace_existing,
        };
        Ok(Self {
            container,
            format: args.format.unwrap_or_else(|| DEFAULT_DRIVER.to_owned()),
            sync,
            candidates,
            kart_program: args.kart_program,
        })
    }
}

pub(crate) fn run_coerce(args: CoerceArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let path = args.into_container()?;
    let mut geopackage = open_container(&path)?;
    let report = coerce_integer_fields(&mut geopackage)?;
    render::write_coercion(writer, &report).map_err(CliError::WriteOutput)
}

pub(crate) fn run_export(args: ExportArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let driver = artifact_driver(&config.format)?;
    let geopackage = open_container(&config.container)?;
    let mut kart = kart_cli(config.kart_program.as_deref());
    let request = export_request(&config, &mut kart)?;
    let report = export_layers(&geopackage, driver.as_ref(), &request)?;
    render::write_export(writer, &report).map_err(CliError::WriteOutput)
}

pub(crate) fn run_sync(args: ExportArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let driver = artifact_driver(&config.format)?;
    let mut geopackage = open_container(&config.container)?;
    let mut kart = kart_cli(config.kart_program.as_deref());
    let request = export_request(&config, &mut kart)?;
    let coercion = coerce_integer_fields(&mut geopackage)?;
    render::write_coercion(writer, &coercion).map_err(CliError::WriteOutput)?;
    let report = export_layers(&geopackage, driver.as_ref(), &request)?;
    render::write_export(writer, &report).map_err(CliError::WriteOutput)
}

/// Build the export request, asking `vcs` for candidates when the config
/// selects tracked layers.
pub(crate) fn export_request(
    config: &ExportConfig,
    vcs: &mut dyn VersionControl,
) -> Result<ExportRequest, CliError> {
    let request = ExportRequest::from_config(&config.sync);
    match &config.candidates {
        Candidates::Container => Ok(request),
        Candidates::Tracked { working_tree } => {
            Ok(request.with_candidates(tracked_layers(vcs, working_tree)?))
        }
    }
}

pub(crate) fn tracked_layers(
    vcs: &mut dyn VersionControl,
    working_tree: &Utf8Path,
) -> Result<Vec<String>, CliError> {
    WorkingTreeScope::enter(vcs, working_tree)
        .list_layers()
        .map_err(|source| CliError::TrackedLayers {
            working_tree: working_tree.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ExportConfig, CliError> {
    let merged = ExportArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ExportConfig::try_from(merged)
}
