use std::env;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{CliError, ExitStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

/// Resolves `raw` against the current directory.
pub fn absolutize(raw: &str) -> Result<PathBuf, CliError> {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        return Ok(candidate);
    }
    Ok(env::current_dir()?.join(candidate))
}

/// Path of `path` relative to the project root, falling back to the full path.
pub fn project_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|relative| relative.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Parses an inline JSON document passed on the command line.
pub fn parse_content(raw: Option<&String>) -> Result<Option<Value>, CliError> {
    raw.map(|raw| {
        serde_json::from_str(raw).map_err(|err| {
            CliError::new(format!("--content is not valid JSON: {err}"), ExitStatus::Usage)
        })
    })
    .transpose()
}
