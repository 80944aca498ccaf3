use std::path::PathBuf;
use std::sync::Arc;

use cardstore::{ProjectPaths, StoreEnv, TracingSink, discover_project};

use crate::error::CliError;
use crate::util::{self, Verbosity};

pub struct CliSession {
    pub paths: ProjectPaths,
    pub env: StoreEnv,
    pub verbosity: Verbosity,
}

impl CliSession {
    /// Locates the project from `--project` or the current directory.
    pub fn bootstrap(
        project_override: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let start = match project_override {
            Some(path) => util::absolutize(&path)?,
            None => std::env::current_dir()?,
        };
        let paths = discover_project(&start)?;
        let env = Self::store_env()?;
        Ok(Self {
            paths,
            env,
            verbosity,
        })
    }

    pub fn store_env() -> Result<StoreEnv, CliError> {
        Ok(StoreEnv::with_events(Arc::new(TracingSink))?)
    }

    pub fn root(&self) -> PathBuf {
        self.paths.root().to_path_buf()
    }
}
