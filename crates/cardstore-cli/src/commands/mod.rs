use serde::Serialize;

use crate::error::ExitStatus;

pub mod create;
pub mod init;
pub mod remove;
pub mod rename;
pub mod show;
pub mod validate;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    ProjectInitialized {
        root: String,
        prefix: String,
        name: String,
    },
    ResourceCreated {
        kind: String,
        name: String,
        path: String,
    },
    TemplateCreated {
        name: String,
    },
    CardsAdded {
        template: String,
        cards: Vec<String>,
        failures: Vec<String>,
        message: String,
    },
    CardsCreated {
        template: String,
        cards: Vec<String>,
    },
    AttachmentCreated {
        card: String,
        path: String,
    },
    LinkCreated {
        from: String,
        to: String,
        link_type: String,
        description: Option<String>,
    },
    LinkRemoved {
        from: String,
        to: String,
        link_type: String,
    },
    PrefixRenamed {
        from: String,
        to: String,
        cards: usize,
        attachments: usize,
    },
    CardShown {
        card: show::CardView,
    },
    Validated {
        violations: Vec<String>,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CommandResult::Validated { violations } => {
                if violations.is_empty() {
                    ExitStatus::Ok
                } else {
                    ExitStatus::Data
                }
            }
            _ => ExitStatus::Ok,
        }
    }
}
