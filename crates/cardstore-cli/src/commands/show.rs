use clap::{Arg, ArgMatches, Command};
use serde::Serialize;

use cardstore::{Card, FetchCardDetails, Link};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util;

#[derive(Clone, Debug, Serialize)]
pub struct CardView {
    pub key: String,
    pub path: String,
    pub card_type: String,
    pub title: String,
    pub workflow_state: String,
    pub children: Vec<String>,
    pub attachments: Vec<String>,
    pub links: Vec<Link>,
}

pub fn command() -> Command {
    Command::new("show")
        .about("Show one card")
        .arg(Arg::new("key").value_name("CARD_KEY").required(true))
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let key = matches
        .get_one::<String>("key")
        .ok_or_else(|| CliError::new("card key is required", ExitStatus::Usage))?;
    let project = session.env.project(session.root())?;
    let card = project
        .find_card_anywhere(key, FetchCardDetails::all())?
        .ok_or_else(|| CliError::new(format!("card '{key}' does not exist"), ExitStatus::Data))?;
    Ok(CommandResult::CardShown {
        card: view(session, card),
    })
}

fn view(session: &CliSession, card: Card) -> CardView {
    let metadata = card.metadata.unwrap_or_else(|| cardstore::CardMetadata::new("", "", ""));
    CardView {
        path: util::project_relative(session.paths.root(), &card.path),
        key: card.key,
        card_type: metadata.card_type,
        title: metadata.title,
        workflow_state: metadata.workflow_state,
        children: card.children.into_iter().map(|child| child.key).collect(),
        attachments: card
            .attachments
            .into_iter()
            .map(|attachment| attachment.file_name)
            .collect(),
        links: metadata.links,
    }
}
