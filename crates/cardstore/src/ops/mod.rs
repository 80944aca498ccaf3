pub mod create;
pub mod link;
pub mod rename;
pub mod validate;

pub use create::{
    AddCardsOptions, AddCardsResult, add_cards, create_attachment, create_card, create_card_type,
    create_field_type, create_link_type, create_project, create_template, create_workflow,
};
pub use link::{
    LinkOptions, create_link, create_template_link, remove_link, remove_template_link,
};
pub use rename::{RenameResult, rename_project};
pub use validate::{ValidationReport, validate_project};
