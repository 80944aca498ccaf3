use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::card::{
    Card, CardAttachment, CardMetadata, FetchCardDetails, card_dirs, find_card_dir, last_rank,
    now_timestamp, rank_after, read_card, read_cards, split_card_key, write_metadata,
};
use crate::error::StoreError;
use crate::locator::{
    CHILDREN_DIR, LOCAL_DIR, ResourceKind, TEMPLATE_DESCRIPTOR, attachments_dir,
    card_content_path, children_dir,
};
use crate::persistence::{copy_new, create_dir_new, write_json_new, write_new};
use crate::project::Project;
use crate::resources::TemplateDescriptor;
use crate::schema::{CARD_BASE_SCHEMA, ensure_valid};

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier regex"))
}

/// Normalized template reference: identifier plus owning module, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateName {
    pub module: Option<String>,
    pub identifier: String,
}

impl TemplateName {
    /// Accepts `name`, `local/name`, `<prefix>/templates/name`, `module/name`
    /// and `module/templates/name`. `prefix` is the project's own key prefix.
    pub fn parse(raw: &str, prefix: &str) -> Result<Self, StoreError> {
        let normalized: String = raw.trim().nfc().collect();
        if normalized.is_empty() {
            return Err(StoreError::InvalidInput(
                "template name must not be empty".into(),
            ));
        }

        let parts: Vec<&str> = normalized.split('/').collect();
        let (owner, identifier) = match parts.as_slice() {
            [identifier] => (None, *identifier),
            [owner, identifier] => (Some(*owner), *identifier),
            [owner, collection, identifier] if *collection == ResourceKind::Template.dir_name() => {
                (Some(*owner), *identifier)
            }
            _ => {
                return Err(StoreError::InvalidInput(format!(
                    "invalid template name '{raw}'"
                )));
            }
        };

        if !identifier_regex().is_match(identifier) {
            return Err(StoreError::InvalidInput(format!(
                "invalid template name '{raw}'"
            )));
        }

        let module = owner
            .filter(|owner| *owner != LOCAL_DIR && *owner != prefix)
            .map(str::to_string);
        if let Some(module) = &module {
            if !identifier_regex().is_match(module) {
                return Err(StoreError::InvalidInput(format!(
                    "invalid module in template name '{raw}'"
                )));
            }
        }

        Ok(Self {
            module,
            identifier: identifier.to_string(),
        })
    }

    pub fn qualified(&self) -> String {
        match &self.module {
            Some(module) => format!("{module}/{}", self.identifier),
            None => self.identifier.clone(),
        }
    }
}

/// One named template inside a project.
pub struct Template<'p> {
    project: &'p Project,
    name: TemplateName,
    path: PathBuf,
}

/// A blueprint scheduled for instantiation, in parent-first order.
struct PlannedCard {
    blueprint_key: String,
    parent: Option<usize>,
    metadata: CardMetadata,
    content: String,
    attachments: Vec<CardAttachment>,
}

impl<'p> Template<'p> {
    pub fn new(project: &'p Project, name: TemplateName) -> Self {
        let path = match &name.module {
            Some(module) => project
                .paths()
                .module_template_dir(module, &name.identifier),
            None => project.paths().template_dir(&name.identifier),
        };
        Self {
            project,
            name,
            path,
        }
    }

    pub fn name(&self) -> &TemplateName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.path.join(CHILDREN_DIR)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.path.join(TEMPLATE_DESCRIPTOR)
    }

    pub fn is_module(&self) -> bool {
        self.name.module.is_some()
    }

    pub fn exists(&self) -> bool {
        self.descriptor_path().is_file()
    }

    pub(crate) fn ensure_mutable(&self) -> Result<(), StoreError> {
        if self.is_module() {
            return Err(StoreError::Forbidden(format!(
                "template '{}' belongs to an imported module",
                self.name.qualified()
            )));
        }
        Ok(())
    }

    pub fn descriptor_value(&self) -> Result<Value, StoreError> {
        let path = self.descriptor_path();
        let raw = fs::read_to_string(&path).map_err(|err| StoreError::io_at(err, &path))?;
        serde_json::from_str(&raw).map_err(|err| {
            StoreError::Serialization(format!("invalid template {}: {err}", path.display()))
        })
    }

    pub fn descriptor(&self) -> Result<TemplateDescriptor, StoreError> {
        Ok(serde_json::from_value(self.descriptor_value()?)?)
    }

    /// Writes the descriptor and the empty blueprint folder.
    pub fn create(&self, content: &TemplateDescriptor) -> Result<(), StoreError> {
        self.ensure_mutable()?;
        write_json_new(&self.descriptor_path(), content)?;
        fs::create_dir_all(self.cards_dir())
            .map_err(|err| StoreError::io_at(err, &self.cards_dir()))?;
        tracing::debug!(template = %self.name.qualified(), "created template");
        Ok(())
    }

    /// Top-level blueprints in rank order.
    pub fn cards(&self, details: FetchCardDetails) -> Result<Vec<Card>, StoreError> {
        read_cards(&self.cards_dir(), details)
    }

    pub fn find_specific_card(
        &self,
        key: &str,
        details: FetchCardDetails,
    ) -> Result<Option<Card>, StoreError> {
        find_card_dir(&self.cards_dir(), key)
            .map(|dir| read_card(&dir, details))
            .transpose()
    }

    /// Next `count` blueprint keys, numbered after the highest suffix in this template.
    pub fn next_card_keys(&self, count: usize) -> Vec<String> {
        let prefix = self.project.prefix();
        let highest = card_dirs(&self.cards_dir())
            .iter()
            .filter_map(|dir| dir.file_name().and_then(|n| n.to_str()))
            .filter_map(split_card_key)
            .filter(|(p, _)| *p == prefix)
            .map(|(_, number)| number)
            .max()
            .unwrap_or(0);
        (1..=count as u64)
            .map(|offset| crate::card::card_key(prefix, highest + offset))
            .collect()
    }

    /// Container a new blueprint goes into: the template root or the parent's `c`.
    pub fn blueprint_container(&self, parent: Option<&Card>) -> Result<PathBuf, StoreError> {
        match parent {
            Some(parent) if parent.path.starts_with(self.cards_dir()) => {
                Ok(children_dir(&parent.path))
            }
            Some(parent) => Err(StoreError::InvalidInput(format!(
                "card '{}' is not part of template '{}'",
                parent.key,
                self.name.qualified()
            ))),
            None => Ok(self.cards_dir()),
        }
    }

    /// Adds one blueprint of `card_type`, numbered within this template.
    pub fn add_card(&self, card_type: &str, parent: Option<&Card>) -> Result<Card, StoreError> {
        let container = self.blueprint_container(parent)?;
        let siblings = read_cards(&container, FetchCardDetails::metadata())?;
        let rank = rank_after(&last_rank(&siblings).unwrap_or_default());
        let key = self
            .next_card_keys(1)
            .pop()
            .ok_or_else(|| StoreError::InvalidInput("no card key available".into()))?;
        self.add_card_as(card_type, parent, &key, &rank)
    }

    /// Adds one blueprint with a caller-chosen key and rank.
    pub fn add_card_as(
        &self,
        card_type: &str,
        parent: Option<&Card>,
        key: &str,
        rank: &str,
    ) -> Result<Card, StoreError> {
        self.ensure_mutable()?;
        let container = self.blueprint_container(parent)?;
        let workflow_state = self.project.initial_workflow_state(card_type)?;
        let metadata = CardMetadata::new(card_type, &workflow_state, rank);
        ensure_valid(
            self.project.validator(),
            &serde_json::to_value(&metadata)?,
            CARD_BASE_SCHEMA,
        )?;

        fs::create_dir_all(&container).map_err(|err| StoreError::io_at(err, &container))?;
        let dir = container.join(key);
        create_dir_new(&dir)?;
        write_metadata(&dir, &metadata)?;
        write_new(&card_content_path(&dir), b"")?;

        tracing::debug!(template = %self.name.qualified(), card = key, "added template card");
        read_card(&dir, FetchCardDetails::metadata())
    }

    /// Instantiates every top-level blueprint into the card root, or under `parent`.
    ///
    /// Every blueprint receives a new project key, depth-first. Links between
    /// blueprints follow the new keys. Content and attachment names are
    /// copied verbatim, since blueprint keys may coincide with live keys.
    /// Returns one card tree per top-level blueprint.
    pub fn create_cards(&self, parent: Option<&Card>) -> Result<Vec<Card>, StoreError> {
        let blueprints = self.cards(FetchCardDetails::all())?;
        if blueprints.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "template '{}' has no cards",
                self.name.qualified()
            )));
        }

        let (destination, siblings) = match parent {
            Some(parent) => (children_dir(&parent.path), parent.children.clone()),
            None => (
                self.project.paths().card_root(),
                self.project.list_cards(FetchCardDetails::metadata())?,
            ),
        };

        let mut plan = Vec::new();
        let mut states = HashMap::new();
        let mut rank = last_rank(&siblings).unwrap_or_default();
        let now = now_timestamp();
        for blueprint in &blueprints {
            rank = rank_after(&rank);
            self.plan_card(blueprint, None, Some(rank.as_str()), &now, &mut states, &mut plan)?;
        }

        for planned in &plan {
            ensure_valid(
                self.project.validator(),
                &serde_json::to_value(&planned.metadata)?,
                CARD_BASE_SCHEMA,
            )
            .map_err(|err| err.context(format!("blueprint '{}'", planned.blueprint_key)))?;
        }

        let keys = self.project.reserve_card_keys(plan.len())?;
        let renames: HashMap<String, String> = plan
            .iter()
            .zip(&keys)
            .map(|(planned, key)| (planned.blueprint_key.clone(), key.clone()))
            .collect();

        let mut targets: Vec<PathBuf> = Vec::with_capacity(plan.len());
        let mut roots = Vec::new();
        for (index, planned) in plan.iter().enumerate() {
            let container = match planned.parent {
                Some(parent) => children_dir(&targets[parent]),
                None => destination.clone(),
            };
            let target = container.join(&keys[index]);
            let created = fs::create_dir_all(&container)
                .map_err(|err| StoreError::io_at(err, &container))
                .and_then(|()| create_dir_new(&target));
            if let Err(err) = created {
                discard_partial(&roots);
                return Err(err);
            }
            if planned.parent.is_none() {
                roots.push(target.clone());
            }
            if let Err(err) = write_planned(planned, &target, &renames) {
                discard_partial(&roots);
                return Err(err);
            }
            targets.push(target);
        }

        tracing::debug!(
            template = %self.name.qualified(),
            created = plan.len(),
            "instantiated template"
        );
        roots
            .iter()
            .map(|dir| read_card(dir, FetchCardDetails::all()))
            .collect()
    }

    fn plan_card(
        &self,
        blueprint: &Card,
        parent: Option<usize>,
        rank: Option<&str>,
        now: &str,
        states: &mut HashMap<String, String>,
        plan: &mut Vec<PlannedCard>,
    ) -> Result<(), StoreError> {
        let mut metadata = blueprint.metadata.clone().ok_or_else(|| {
            StoreError::InvalidInput(format!("blueprint '{}' has no metadata", blueprint.key))
        })?;

        let state = match states.get(&metadata.card_type) {
            Some(state) => state.clone(),
            None => {
                let state = self.project.initial_workflow_state(&metadata.card_type)?;
                states.insert(metadata.card_type.clone(), state.clone());
                state
            }
        };
        metadata.workflow_state = state;
        metadata.last_updated = Some(now.to_string());
        metadata.last_transitioned = Some(now.to_string());
        if let Some(rank) = rank {
            metadata.rank = rank.to_string();
        }

        let index = plan.len();
        plan.push(PlannedCard {
            blueprint_key: blueprint.key.clone(),
            parent,
            metadata,
            content: blueprint.content.clone().unwrap_or_default(),
            attachments: blueprint.attachments.clone(),
        });
        for child in &blueprint.children {
            self.plan_card(child, Some(index), None, now, states, plan)?;
        }
        Ok(())
    }
}

fn write_planned(
    planned: &PlannedCard,
    target: &Path,
    renames: &HashMap<String, String>,
) -> Result<(), StoreError> {
    let mut metadata = planned.metadata.clone();
    for link in &mut metadata.links {
        if let Some(key) = renames.get(&link.card_key) {
            link.card_key = key.clone();
        }
    }
    write_metadata(target, &metadata)?;

    write_new(&card_content_path(target), planned.content.as_bytes())?;

    if !planned.attachments.is_empty() {
        let dir = attachments_dir(target);
        fs::create_dir_all(&dir).map_err(|err| StoreError::io_at(err, &dir))?;
        for attachment in &planned.attachments {
            copy_new(&attachment.path, &dir.join(&attachment.file_name))?;
        }
    }
    Ok(())
}

fn discard_partial(roots: &[PathBuf]) {
    for root in roots {
        if let Err(err) = fs::remove_dir_all(root) {
            tracing::warn!(path = %root.display(), error = %err, "failed to remove partial card");
        }
    }
}
