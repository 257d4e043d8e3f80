//! The Kart command-line tool as the version-control collaborator.

use std::path::PathBuf;
use std::process::{Command, Output};

use camino::{Utf8Path, Utf8PathBuf};
use layersync_core::{ToolOutcome, VersionControl, VersionControlError};

/// Program run when no other is configured.
pub const DEFAULT_PROGRAM: &str = "kart";

/// Runs `kart` subcommands inside the current working tree.
///
/// # Examples
/// ```
/// use camino::Utf8Path;
/// use layersync_core::VersionControl;
/// use layersync_data::kart::KartCli;
///
/// let mut kart = KartCli::default();
/// assert_eq!(kart.program(), "kart");
/// kart.set_working_tree(Some("/srv/plan".into()));
/// assert_eq!(kart.working_tree(), Some(Utf8Path::new("/srv/plan")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KartCli {
    program: String,
    working_tree: Option<Utf8PathBuf>,
}

impl Default for KartCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl KartCli {
    /// Use `program` instead of `kart` found on `PATH`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            working_tree: None,
        }
    }

    /// Program that is run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<Output, VersionControlError> {
        let tree = self
            .working_tree
            .as_deref()
            .ok_or(VersionControlError::NoWorkingTree)?;
        log::debug!("{} {} (in {tree})", self.program, args.join(" "));
        Command::new(&self.program)
            .args(args)
            .current_dir(tree)
            .output()
            .map_err(|source| VersionControlError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// Artifact paths are resolved before the tool runs in another directory.
fn resolve_against(
    path: &Utf8Path,
    current: std::io::Result<PathBuf>,
) -> Result<Utf8PathBuf, VersionControlError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let unresolved = |source| VersionControlError::ResolvePath {
        path: path.to_path_buf(),
        source,
    };
    let base = Utf8PathBuf::from_path_buf(current.map_err(unresolved)?)
        .map_err(|_| unresolved(std::io::Error::other("current directory is not UTF-8")))?;
    Ok(base.join(path))
}

fn outcome(output: &Output) -> ToolOutcome {
    ToolOutcome {
        success: output.status.success(),
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

impl VersionControl for KartCli {
    fn working_tree(&self) -> Option<&Utf8Path> {
        self.working_tree.as_deref()
    }

    fn set_working_tree(&mut self, tree: Option<Utf8PathBuf>) -> Option<Utf8PathBuf> {
        std::mem::replace(&mut self.working_tree, tree)
    }

    fn import(
        &mut self,
        artifact: &Utf8Path,
        replace_existing: bool,
    ) -> Result<ToolOutcome, VersionControlError> {
        let target = resolve_against(artifact, std::env::current_dir())?;
        let mut args = vec!["import"];
        if replace_existing {
            args.push("--replace-existing");
        }
        args.push(target.as_str());
        Ok(outcome(&self.run(&args)?))
    }

    fn list_layers(&mut self) -> Result<Vec<String>, VersionControlError> {
        let output = self.run(&["data", "ls"])?;
        let result = outcome(&output);
        if !result.success {
            return Err(VersionControlError::Failed {
                command: format!("{} data ls", self.program),
                status: result.status,
                detail: result.diagnostic_text().to_owned(),
            });
        }
        Ok(result
            .stdout
            .split_whitespace()
            .map(str::to_owned)
            .collect())
    }
}
