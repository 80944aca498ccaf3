use std::path::Path;

use cardstore::{AddCardsOptions, LinkOptions, ResourceKind};
use clap::{Arg, ArgMatches, Command, value_parser};

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util;

pub fn command() -> Command {
    Command::new("create")
        .about("Create resources, cards, attachments and links")
        .subcommand_required(true)
        .subcommand(
            Command::new("cardtype")
                .about("Create a card type bound to a workflow")
                .arg(name_arg())
                .arg(Arg::new("workflow").value_name("WORKFLOW").required(true)),
        )
        .subcommand(
            Command::new("fieldtype")
                .about("Create a field type")
                .arg(name_arg())
                .arg(
                    Arg::new("data-type")
                        .value_name("DATA_TYPE")
                        .required(true)
                        .help("One of the data types declared by the field type schema."),
                ),
        )
        .subcommand(
            Command::new("linktype")
                .about("Create a link type")
                .arg(name_arg())
                .arg(content_arg()),
        )
        .subcommand(
            Command::new("workflow")
                .about("Create a workflow")
                .arg(name_arg())
                .arg(content_arg()),
        )
        .subcommand(
            Command::new("template")
                .about("Create an empty template")
                .arg(name_arg())
                .arg(content_arg()),
        )
        .subcommand(
            Command::new("cards")
                .about("Add blueprint cards to a template")
                .arg(Arg::new("card-type").value_name("CARD_TYPE").required(true))
                .arg(Arg::new("template").value_name("TEMPLATE").required(true))
                .arg(parent_arg())
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("1"),
                ),
        )
        .subcommand(
            Command::new("card")
                .about("Instantiate a template into the project")
                .arg(Arg::new("template").value_name("TEMPLATE").required(true))
                .arg(parent_arg()),
        )
        .subcommand(
            Command::new("attachment")
                .about("Attach a file to a card")
                .arg(Arg::new("card").value_name("CARD_KEY").required(true))
                .arg(Arg::new("file").value_name("FILE").required(true)),
        )
        .subcommand(link_command("link", "Link two cards"))
}

pub(crate) fn link_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(Arg::new("from").value_name("FROM_KEY").required(true))
        .arg(Arg::new("to").value_name("TO_KEY").required(true))
        .arg(Arg::new("link-type").value_name("LINK_TYPE").required(true))
        .arg(
            Arg::new("description")
                .long("description")
                .value_name("TEXT"),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .value_name("TEMPLATE")
                .help("Link blueprints inside this template instead of live cards."),
        )
}

fn name_arg() -> Arg {
    Arg::new("name").value_name("NAME").required(true)
}

fn content_arg() -> Arg {
    Arg::new("content")
        .long("content")
        .value_name("JSON")
        .help("Inline JSON document. Defaults are used when omitted.")
}

fn parent_arg() -> Arg {
    Arg::new("parent")
        .long("parent")
        .value_name("CARD_KEY")
        .help("Create below this card instead of at the top level.")
}

pub fn run(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    match matches.subcommand() {
        Some(("cardtype", sub)) => {
            let name = required(sub, "name")?;
            let workflow = required(sub, "workflow")?;
            let path = cardstore::create_card_type(&session.env, session.root(), name, workflow)?;
            Ok(resource_created(session, ResourceKind::CardType, name, &path))
        }
        Some(("fieldtype", sub)) => {
            let name = required(sub, "name")?;
            let path = cardstore::create_field_type(
                &session.env,
                session.root(),
                name,
                required(sub, "data-type")?,
            )?;
            Ok(resource_created(session, ResourceKind::FieldType, name, &path))
        }
        Some(("linktype", sub)) => {
            let name = required(sub, "name")?;
            let content = util::parse_content(sub.get_one::<String>("content"))?;
            let path = cardstore::create_link_type(&session.env, session.root(), name, content)?;
            Ok(resource_created(session, ResourceKind::LinkType, name, &path))
        }
        Some(("workflow", sub)) => {
            let name = required(sub, "name")?;
            let content = util::parse_content(sub.get_one::<String>("content"))?;
            let path = cardstore::create_workflow(&session.env, session.root(), name, content)?;
            Ok(resource_created(session, ResourceKind::Workflow, name, &path))
        }
        Some(("template", sub)) => {
            let content = util::parse_content(sub.get_one::<String>("content"))?;
            let name = cardstore::create_template(
                &session.env,
                session.root(),
                required(sub, "name")?,
                content,
            )?;
            Ok(CommandResult::TemplateCreated { name })
        }
        Some(("cards", sub)) => add_cards(session, sub),
        Some(("card", sub)) => {
            let template = required(sub, "template")?;
            let parent = sub.get_one::<String>("parent").map(String::as_str);
            let cards = cardstore::create_card(&session.env, session.root(), template, parent)?;
            Ok(CommandResult::CardsCreated {
                template: template.to_string(),
                cards,
            })
        }
        Some(("attachment", sub)) => create_attachment(session, sub),
        Some(("link", sub)) => {
            let opts = link_options(sub)?;
            let link = match sub.get_one::<String>("template") {
                Some(template) => cardstore::create_template_link(
                    &session.env,
                    session.root(),
                    template,
                    opts.clone(),
                )?,
                None => cardstore::create_link(&session.env, session.root(), opts.clone())?,
            };
            Ok(CommandResult::LinkCreated {
                from: opts.from_key,
                to: link.card_key,
                link_type: link.link_type,
                description: link.link_description,
            })
        }
        _ => Err(CliError::new("unsupported create command", ExitStatus::Usage)),
    }
}

fn add_cards(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let template = required(matches, "template")?.to_string();
    let count = matches.get_one::<usize>("count").copied().unwrap_or(1);
    let result = cardstore::add_cards(
        &session.env,
        session.root(),
        AddCardsOptions {
            card_type: required(matches, "card-type")?.to_string(),
            template: template.clone(),
            parent_card_key: matches.get_one::<String>("parent").cloned(),
            count,
        },
    )?;
    Ok(CommandResult::CardsAdded {
        template,
        cards: result.cards,
        failures: result.failures,
        message: result.message,
    })
}

fn create_attachment(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let card = required(matches, "card")?;
    let source = util::absolutize(required(matches, "file")?)?;
    if !source.is_file() {
        return Err(CliError::new(
            format!("attachment source {} is not a file", source.display()),
            ExitStatus::Usage,
        ));
    }
    let stored = cardstore::create_attachment(&session.env, session.root(), card, &source, None)?;
    Ok(CommandResult::AttachmentCreated {
        card: card.to_string(),
        path: util::project_relative(session.paths.root(), &stored),
    })
}

pub(crate) fn link_options(matches: &ArgMatches) -> Result<LinkOptions, CliError> {
    Ok(LinkOptions {
        from_key: required(matches, "from")?.to_string(),
        to_key: required(matches, "to")?.to_string(),
        link_type: required(matches, "link-type")?.to_string(),
        description: matches.get_one::<String>("description").cloned(),
    })
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str, CliError> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| CliError::new(format!("missing argument {id}"), ExitStatus::Usage))
}

fn resource_created(
    session: &CliSession,
    kind: ResourceKind,
    name: &str,
    path: &Path,
) -> CommandResult {
    CommandResult::ResourceCreated {
        kind: kind.label().to_string(),
        name: name.to_string(),
        path: util::project_relative(session.paths.root(), path),
    }
}
