pub mod card;
pub mod env;
pub mod error;
pub mod events;
pub mod locator;
pub mod ops;
pub mod persistence;
pub mod project;
pub mod resources;
pub mod schema;
pub mod shape;
pub mod template;

pub use card::{
    Card, CardAttachment, CardMetadata, FIRST_RANK, FetchCardDetails, Link, is_valid_card_key,
};
pub use env::StoreEnv;
pub use error::StoreError;
pub use events::{EventQueue, EventSink, NoopSink, StoreEvent, TracingSink};
pub use locator::{ProjectPaths, ResourceKind, discover as discover_project};
pub use ops::{
    AddCardsOptions, AddCardsResult, LinkOptions, RenameResult, ValidationReport, add_cards,
    create_attachment, create_card, create_card_type, create_field_type, create_link,
    create_link_type, create_project, create_template, create_template_link, create_workflow,
    remove_link, remove_template_link, rename_project, validate_project,
};
pub use project::{Project, ProjectConfiguration};
pub use resources::{
    CardType, CustomField, EnumValue, FieldType, LinkType, StateCategory, TemplateDescriptor,
    Workflow, WorkflowState, WorkflowTransition,
};
pub use schema::{JsonSchemaValidator, SchemaValidator, supported_field_data_types};
pub use shape::validate_project_shape;
pub use template::{Template, TemplateName};
