use clap::{ArgMatches, Command};

use crate::commands::CommandResult;
use crate::commands::create::{link_command, link_options};
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};

pub fn command() -> Command {
    Command::new("remove")
        .about("Remove links between cards")
        .subcommand_required(true)
        .subcommand(link_command("link", "Remove a link from its source card"))
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    match matches.subcommand() {
        Some(("link", sub)) => {
            let opts = link_options(sub)?;
            match sub.get_one::<String>("template") {
                Some(template) => cardstore::remove_template_link(
                    &session.env,
                    session.root(),
                    template,
                    opts.clone(),
                )?,
                None => cardstore::remove_link(&session.env, session.root(), opts.clone())?,
            }
            Ok(CommandResult::LinkRemoved {
                from: opts.from_key,
                to: opts.to_key,
                link_type: opts.link_type,
            })
        }
        _ => Err(CliError::new("unsupported remove command", ExitStatus::Usage)),
    }
}
