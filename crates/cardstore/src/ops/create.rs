use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::card::{Card, FetchCardDetails, last_rank, rank_after, read_cards};
use crate::env::StoreEnv;
use crate::error::StoreError;
use crate::events::StoreEvent;
use crate::locator::{
    GITKEEP, IGNORE_FILE, ProjectPaths, ResourceKind, SCHEMA_STUB, attachments_dir,
};
use crate::persistence::{copy_new, ensure_safe_name, write_json_new, write_new};
use crate::project::{Project, ProjectConfiguration};
use crate::resources::{CardType, FieldType, LinkType, TemplateDescriptor, Workflow};
use crate::schema::{
    CARD_TYPE_SCHEMA, CARDS_CONFIG_SCHEMA, FIELD_TYPE_SCHEMA, LINK_TYPE_SCHEMA, TEMPLATE_SCHEMA,
    WORKFLOW_SCHEMA, ensure_valid, supported_field_data_types,
};

const DEFAULT_IGNORE: &str = "\
.calc
.asciidoctor
.vscode
*.html
*.pdf
*.puml
**/.DS_Store
*-debug.log
*-error.log
";

fn resource_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("resource name regex"))
}

fn prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^[a-z]{3,10}$").expect("prefix regex"))
}

/// Validates a project key prefix (3–10 lowercase letters).
pub fn ensure_valid_prefix(prefix: &str) -> Result<(), StoreError> {
    if prefix_regex().is_match(prefix) {
        Ok(())
    } else {
        Err(StoreError::InvalidInput(format!(
            "invalid card key prefix '{prefix}': use 3-10 lowercase letters"
        )))
    }
}

fn ensure_resource_name(name: &str, kind: ResourceKind) -> Result<(), StoreError> {
    ensure_safe_name(name, kind.label())?;
    if !resource_name_regex().is_match(name) {
        return Err(StoreError::InvalidInput(format!(
            "{kind} name '{name}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

fn ensure_unique(project: &Project, kind: ResourceKind, name: &str) -> Result<(), StoreError> {
    if project.local_resource_exists(kind, name) {
        return Err(StoreError::AlreadyExists(format!(
            "{kind} '{name}' already exists in the project"
        )));
    }
    Ok(())
}

/// Builds the fixed skeleton of a new project at `path`.
pub fn create_project(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    prefix: &str,
    name: &str,
) -> Result<ProjectPaths, StoreError> {
    let paths = ProjectPaths::new(path.as_ref());
    if Project::is_created(paths.root()) || paths.cards_dir().exists() {
        return Err(StoreError::AlreadyExists(format!(
            "a project already exists at {}",
            paths.root().display()
        )));
    }
    ensure_valid_prefix(prefix)?;
    if name.trim().is_empty() {
        return Err(StoreError::InvalidInput("project name must not be empty".into()));
    }
    let configuration = ProjectConfiguration::new(prefix, name.trim());
    ensure_valid(
        env.validator.as_ref(),
        &serde_json::to_value(&configuration)?,
        CARDS_CONFIG_SCHEMA,
    )?;

    let mut directories: Vec<(PathBuf, &str)> = ResourceKind::ALL
        .iter()
        .map(|kind| {
            let schema = match kind {
                ResourceKind::CardType => "cardtype-directory-schema",
                ResourceKind::FieldType => "fieldtype-directory-schema",
                ResourceKind::LinkType => "linktype-directory-schema",
                ResourceKind::Workflow => "workflow-directory-schema",
                ResourceKind::Template => "template-directory-schema",
            };
            (paths.resource_dir(*kind), schema)
        })
        .collect();
    directories.push((paths.calculations_dir(), "calculation-directory-schema"));
    directories.push((paths.card_root(), "cardroot-directory-schema"));

    fs::create_dir_all(paths.local_dir())
        .map_err(|err| StoreError::io_at(err, &paths.local_dir()))?;
    thread::scope(|scope| {
        let handles: Vec<_> = directories
            .iter()
            .map(|(dir, schema)| scope.spawn(move || create_collection_dir(dir, schema)))
            .collect();
        handles
            .into_iter()
            .map(|handle| worker_outcome(handle.join()))
            .collect::<Result<Vec<()>, StoreError>>()
    })?;

    write_json_new(&paths.config_file(), &configuration)?;
    write_schema_stub(paths.root(), "project-directory-schema")?;
    write_schema_stub(&paths.local_dir(), "cardsconfig-directory-schema")?;
    write_new(&paths.root().join(IGNORE_FILE), DEFAULT_IGNORE.as_bytes())?;

    for dir in [paths.card_root(), paths.calculations_dir()] {
        let marker = dir.join(GITKEEP);
        if let Err(err) = write_new(&marker, b"") {
            tracing::warn!(path = %marker.display(), error = %err, "failed to write marker file");
        }
    }

    tracing::info!(root = %paths.root().display(), prefix, "created project");
    Ok(paths)
}

fn create_collection_dir(dir: &Path, schema: &str) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|err| StoreError::io_at(err, dir))?;
    write_schema_stub(dir, schema)
}

fn write_schema_stub(dir: &Path, schema: &str) -> Result<(), StoreError> {
    write_json_new(
        &dir.join(SCHEMA_STUB),
        &json!([{ "id": schema, "version": 1 }]),
    )
}

/// Writes a resource document after uniqueness and schema checks.
fn write_resource(
    env: &StoreEnv,
    project: &Project,
    kind: ResourceKind,
    name: &str,
    document: &Value,
    schema: &str,
) -> Result<PathBuf, StoreError> {
    ensure_valid(env.validator.as_ref(), document, schema)
        .map_err(|err| err.context(format!("{kind} '{name}'")))?;
    let path = project.paths().resource_file(kind, name);
    write_json_new(&path, document).map_err(|err| match err {
        StoreError::AlreadyExists(_) => {
            StoreError::AlreadyExists(format!("{kind} '{name}' already exists in the project"))
        }
        other => other,
    })?;
    tracing::debug!(kind = kind.label(), name, "created resource");
    Ok(path)
}

pub fn create_card_type(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    name: &str,
    workflow: &str,
) -> Result<PathBuf, StoreError> {
    let project = env.project(path)?;
    ensure_resource_name(name, ResourceKind::CardType)?;
    ensure_unique(&project, ResourceKind::CardType, name)?;
    if project
        .resolve_resource_path(ResourceKind::Workflow, workflow)
        .is_none()
    {
        return Err(StoreError::NotFound(format!(
            "workflow '{workflow}' does not exist in the project"
        )));
    }

    let document = serde_json::to_value(CardType::new(name, workflow))?;
    write_resource(
        env,
        &project,
        ResourceKind::CardType,
        name,
        &document,
        CARD_TYPE_SCHEMA,
    )
}

pub fn create_field_type(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    name: &str,
    data_type: &str,
) -> Result<PathBuf, StoreError> {
    let project = env.project(path)?;
    ensure_resource_name(name, ResourceKind::FieldType)?;
    ensure_unique(&project, ResourceKind::FieldType, name)?;

    let supported = supported_field_data_types(env.validator.as_ref())?;
    if !supported.iter().any(|candidate| candidate == data_type) {
        return Err(StoreError::InvalidInput(format!(
            "field type '{name}' has unsupported data type '{data_type}'; supported: {}",
            supported.join(", ")
        )));
    }

    let document = serde_json::to_value(FieldType {
        name: name.to_string(),
        display_name: None,
        data_type: data_type.to_string(),
        enum_values: None,
    })?;
    write_resource(
        env,
        &project,
        ResourceKind::FieldType,
        name,
        &document,
        FIELD_TYPE_SCHEMA,
    )
}

/// Creates a link type. Without `content` a symmetric default named after the type is used.
pub fn create_link_type(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    name: &str,
    content: Option<Value>,
) -> Result<PathBuf, StoreError> {
    let project = env.project(path)?;
    ensure_resource_name(name, ResourceKind::LinkType)?;
    ensure_unique(&project, ResourceKind::LinkType, name)?;

    let document = with_name(
        content.map_or_else(|| serde_json::to_value(LinkType::named(name)), Ok)?,
        name,
    )?;
    write_resource(
        env,
        &project,
        ResourceKind::LinkType,
        name,
        &document,
        LINK_TYPE_SCHEMA,
    )
}

/// Creates a workflow. Without `content` the Draft/Approved/Archived default is used.
pub fn create_workflow(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    name: &str,
    content: Option<Value>,
) -> Result<PathBuf, StoreError> {
    let project = env.project(path)?;
    ensure_resource_name(name, ResourceKind::Workflow)?;
    ensure_unique(&project, ResourceKind::Workflow, name)?;

    let document = with_name(
        content.map_or_else(|| serde_json::to_value(Workflow::default_named(name)), Ok)?,
        name,
    )?;
    write_resource(
        env,
        &project,
        ResourceKind::Workflow,
        name,
        &document,
        WORKFLOW_SCHEMA,
    )
}

fn with_name(mut document: Value, name: &str) -> Result<Value, StoreError> {
    let object = document.as_object_mut().ok_or_else(|| {
        StoreError::InvalidInput(format!("content for '{name}' must be a JSON object"))
    })?;
    object.insert("name".to_string(), Value::String(name.to_string()));
    Ok(document)
}

/// Creates an empty template; returns its normalized name.
pub fn create_template(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    name: &str,
    content: Option<Value>,
) -> Result<String, StoreError> {
    let project = env.project(path)?;
    let template = project.template(name)?;
    if template.is_module() {
        return Err(StoreError::Forbidden(format!(
            "cannot create template '{}' inside an imported module",
            template.name().qualified()
        )));
    }

    let content = match content {
        Some(content) => content,
        None => serde_json::to_value(TemplateDescriptor::default())?,
    };
    ensure_valid(env.validator.as_ref(), &content, TEMPLATE_SCHEMA)
        .map_err(|err| err.context(format!("template '{}'", template.name().qualified())))?;

    if template.path().exists() {
        return Err(StoreError::AlreadyExists(format!(
            "template '{}' already exists in the project",
            template.name().qualified()
        )));
    }

    let descriptor: TemplateDescriptor = serde_json::from_value(content)?;
    template.create(&descriptor)?;
    Ok(template.name().qualified())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCardsOptions {
    pub card_type: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_card_key: Option<String>,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct AddCardsResult {
    pub cards: Vec<String>,
    pub failures: Vec<String>,
    pub message: String,
}

/// Adds `count` blueprints of one card type to a local template.
///
/// Keys and ranks are reserved up front; the writes then run concurrently.
/// The call fails only when every add fails.
pub fn add_cards(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    opts: AddCardsOptions,
) -> Result<AddCardsResult, StoreError> {
    if opts.count == 0 {
        return Err(StoreError::InvalidInput(
            "card count must be at least 1".into(),
        ));
    }
    let project = env.project(path)?;
    let template = project.template(&opts.template)?;
    if !template.exists() {
        return Err(StoreError::NotFound(format!(
            "template '{}' does not exist in the project",
            opts.template
        )));
    }
    if template.is_module() {
        return Err(StoreError::Forbidden(format!(
            "cannot add cards to template '{}' of an imported module",
            template.name().qualified()
        )));
    }
    project.card_type(&opts.card_type)?;

    let parent = match &opts.parent_card_key {
        Some(key) => Some(
            template
                .find_specific_card(key, FetchCardDetails::metadata())?
                .ok_or_else(|| {
                    StoreError::NotFound(format!(
                        "card '{key}' does not exist in template '{}'",
                        template.name().qualified()
                    ))
                })?,
        ),
        None => None,
    };

    let container = template.blueprint_container(parent.as_ref())?;
    let siblings = read_cards(&container, FetchCardDetails::metadata())?;
    let mut rank = last_rank(&siblings).unwrap_or_default();
    let planned: Vec<(String, String)> = template
        .next_card_keys(opts.count)
        .into_iter()
        .map(|key| {
            rank = rank_after(&rank);
            (key, rank.clone())
        })
        .collect();

    let outcomes: Vec<Result<Card, StoreError>> = thread::scope(|scope| {
        let handles: Vec<_> = planned
            .iter()
            .map(|(key, rank)| {
                let template = &template;
                let parent = parent.as_ref();
                let card_type = opts.card_type.as_str();
                scope.spawn(move || template.add_card_as(card_type, parent, key, rank))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| worker_outcome(handle.join()))
            .collect()
    });

    let mut cards = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(card) => cards.push(card.key),
            Err(err) => failures.push(err.to_string()),
        }
    }
    if cards.is_empty() {
        return Err(StoreError::Aggregate(failures));
    }

    let noun = if cards.len() == 1 { "card" } else { "cards" };
    let message = format!(
        "Added {} {noun} to template '{}'",
        cards.len(),
        template.name().qualified()
    );
    for failure in &failures {
        tracing::warn!(template = %template.name().qualified(), error = %failure, "failed to add card");
    }
    Ok(AddCardsResult {
        cards,
        failures,
        message,
    })
}

/// Instantiates a template into the card root or under `parent_card_key`.
///
/// Returns the keys of every created card, parents before children.
pub fn create_card(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    template_name: &str,
    parent_card_key: Option<&str>,
) -> Result<Vec<String>, StoreError> {
    let project = env.project(path)?;
    let template = project.template(template_name)?;
    if !template.exists() {
        return Err(StoreError::NotFound(format!(
            "template '{template_name}' does not exist in the project"
        )));
    }
    ensure_valid(
        env.validator.as_ref(),
        &template.descriptor_value()?,
        TEMPLATE_SCHEMA,
    )
    .map_err(|err| err.context(format!("template '{}'", template.name().qualified())))?;

    let parent = match parent_card_key {
        Some(key) => Some(
            project
                .find_specific_card(
                    key,
                    FetchCardDetails {
                        metadata: true,
                        children: true,
                        ..FetchCardDetails::default()
                    },
                )?
                .ok_or_else(|| StoreError::NotFound(format!("card '{key}' does not exist")))?,
        ),
        None => None,
    };

    let cards = template.create_cards(parent.as_ref())?;
    let keys: Vec<String> = cards
        .iter()
        .flat_map(Card::flatten)
        .map(|card| card.key.clone())
        .collect();

    tracing::info!(
        template = %template.name().qualified(),
        created = keys.len(),
        "created cards from template"
    );
    env.events.publish(StoreEvent::Created { cards });
    Ok(keys)
}

/// Stores an attachment on card `card_key`. `buffer`, when given, is written
/// under the file name of `source`; otherwise `source` is copied.
pub fn create_attachment(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    card_key: &str,
    source: &Path,
    buffer: Option<&[u8]>,
) -> Result<PathBuf, StoreError> {
    let project = env.project(path)?;
    let card = project
        .find_card_anywhere(card_key, FetchCardDetails::default())?
        .ok_or_else(|| StoreError::NotFound(format!("card '{card_key}' does not exist")))?;
    if project.paths().is_module_path(&card.path) {
        return Err(StoreError::Forbidden(format!(
            "card '{card_key}' belongs to an imported module"
        )));
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| {
            StoreError::InvalidInput(format!("{} has no file name", source.display()))
        })?
        .to_owned();
    let dir = attachments_dir(&card.path);
    fs::create_dir_all(&dir).map_err(|err| StoreError::io_at(err, &dir))?;
    let target = dir.join(&file_name);

    match buffer {
        Some(bytes) => write_new(&target, bytes)?,
        None => {
            if !source.is_file() {
                return Err(StoreError::NotFound(format!(
                    "attachment source {} does not exist",
                    source.display()
                )));
            }
            copy_new(source, &target)?
        }
    }
    tracing::debug!(card = card_key, attachment = %target.display(), "created attachment");
    Ok(target)
}

fn worker_outcome<T>(joined: thread::Result<Result<T, StoreError>>) -> Result<T, StoreError> {
    joined.unwrap_or_else(|_| Err(StoreError::Unexpected("worker thread panicked".into())))
}
