use std::process::ExitCode;

use serde_json::json;

use crate::commands::CommandResult;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as text or a single JSON line and maps it to an exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result)?,
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::ProjectInitialized { root, prefix, name } => {
            println!("Created project '{name}' at {root} (prefix: {prefix})");
        }
        CommandResult::ResourceCreated { kind, name, path } => {
            println!("Created {kind} '{name}' at {path}");
        }
        CommandResult::TemplateCreated { name } => {
            println!("Created template '{name}'");
        }
        CommandResult::CardsAdded {
            cards,
            failures,
            message,
            ..
        } => {
            println!("{message}: {}", cards.join(", "));
            for failure in failures {
                println!("  [ERR] {failure}");
            }
        }
        CommandResult::CardsCreated { template, cards } => {
            println!(
                "Created {} card(s) from template '{template}': {}",
                cards.len(),
                cards.join(", ")
            );
        }
        CommandResult::AttachmentCreated { card, path } => {
            println!("Attached {path} to card '{card}'");
        }
        CommandResult::LinkCreated {
            from,
            to,
            link_type,
            description,
        } => match description {
            Some(description) => {
                println!("Linked '{from}' -> '{to}' ({link_type}): {description}")
            }
            None => println!("Linked '{from}' -> '{to}' ({link_type})"),
        },
        CommandResult::LinkRemoved {
            from,
            to,
            link_type,
        } => {
            println!("Removed link '{from}' -> '{to}' ({link_type})");
        }
        CommandResult::PrefixRenamed {
            from,
            to,
            cards,
            attachments,
        } => {
            if from == to {
                println!("Prefix is already '{to}'");
            } else {
                println!(
                    "Renamed prefix '{from}' to '{to}' ({cards} cards, {attachments} attachments)"
                );
            }
        }
        CommandResult::CardShown { card } => {
            println!("{} [{}] {}", card.key, card.card_type, card.title);
            println!("  state: {}", card.workflow_state);
            println!("  path: {}", card.path);
            if !card.children.is_empty() {
                println!("  children: {}", card.children.join(", "));
            }
            if !card.attachments.is_empty() {
                println!("  attachments: {}", card.attachments.join(", "));
            }
            for link in &card.links {
                match &link.link_description {
                    Some(description) => println!(
                        "  link: {} -> {} ({description})",
                        link.link_type, link.card_key
                    ),
                    None => println!("  link: {} -> {}", link.link_type, link.card_key),
                }
            }
        }
        CommandResult::Validated { violations } => {
            if violations.is_empty() {
                println!("Project status: OK");
            } else {
                println!("Project status: FAIL ({} problems)", violations.len());
                for violation in violations {
                    println!("  [ERR] {violation}");
                }
            }
        }
    }
}

fn print_json(result: &CommandResult) -> Result<(), CliError> {
    let payload = json!(result);
    println!("{payload}");
    Ok(())
}
