use clap::{Arg, ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util;

pub fn command() -> Command {
    Command::new("init")
        .about("Create a new card project")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("Project root to create. Defaults to the current directory."),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .value_name("PREFIX")
                .required(true)
                .help("Card key prefix: 3-10 lowercase letters."),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("NAME")
                .help("Human readable project name. Defaults to the prefix."),
        )
}

pub fn run(
    project_override: Option<String>,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let positional = matches.get_one::<String>("path").cloned();
    let target = project_override
        .or(positional)
        .unwrap_or_else(|| ".".to_string());
    let root = util::absolutize(&target)?;
    if root.exists() && !root.is_dir() {
        return Err(CliError::new(
            format!("project root {} is not a directory", root.display()),
            ExitStatus::Usage,
        ));
    }

    let prefix = matches
        .get_one::<String>("prefix")
        .ok_or_else(|| CliError::new("--prefix is required", ExitStatus::Usage))?;
    let name = matches
        .get_one::<String>("name")
        .cloned()
        .unwrap_or_else(|| prefix.clone());

    let env = CliSession::store_env()?;
    let paths = cardstore::create_project(&env, &root, prefix, &name)?;
    Ok(CommandResult::ProjectInitialized {
        root: paths.root().display().to_string(),
        prefix: prefix.clone(),
        name,
    })
}
