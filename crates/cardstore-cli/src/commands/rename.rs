use clap::{Arg, ArgMatches, Command};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};

pub fn command() -> Command {
    Command::new("rename")
        .about("Change the card key prefix and rename every card")
        .arg(
            Arg::new("prefix")
                .value_name("PREFIX")
                .required(true)
                .help("New card key prefix: 3-10 lowercase letters."),
        )
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let prefix = matches
        .get_one::<String>("prefix")
        .ok_or_else(|| CliError::new("prefix is required", ExitStatus::Usage))?;
    let result = cardstore::rename_project(&session.env, session.root(), prefix)?;
    Ok(CommandResult::PrefixRenamed {
        from: result.from,
        to: result.to,
        cards: result.cards,
        attachments: result.attachments,
    })
}
