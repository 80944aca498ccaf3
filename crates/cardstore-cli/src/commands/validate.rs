use clap::{ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;

pub fn command() -> Command {
    Command::new("validate")
        .about("Check directory shape, resources and card metadata")
}

pub fn run(session: &CliSession, _matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let report = cardstore::validate_project(&session.env, session.root())?;
    Ok(CommandResult::Validated {
        violations: report.violations,
    })
}
