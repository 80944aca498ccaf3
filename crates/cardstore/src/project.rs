use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::{
    self, Card, FetchCardDetails, card_dirs, card_key, find_card_dir, read_card, read_cards,
};
use crate::error::StoreError;
use crate::locator::{ProjectPaths, ResourceKind, TEMPLATE_DESCRIPTOR};
use crate::persistence::write_json;
use crate::resources::{CardType, LinkType, Workflow};
use crate::schema::{CARD_BASE_SCHEMA, CARDS_CONFIG_SCHEMA, SchemaValidator, ensure_valid};
use crate::template::{Template, TemplateName};

/// Contents of `.cards/local/cardsConfig.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfiguration {
    pub card_key_prefix: String,
    pub name: String,
    pub next_available_card_number: u64,
}

impl ProjectConfiguration {
    pub fn new(prefix: &str, name: &str) -> Self {
        Self {
            card_key_prefix: prefix.to_string(),
            name: name.to_string(),
            next_available_card_number: 1,
        }
    }
}

/// One on-disk project: configuration plus accessors for resources and cards.
pub struct Project {
    paths: ProjectPaths,
    configuration: ProjectConfiguration,
    validator: Arc<dyn SchemaValidator>,
}

impl Project {
    /// True when the fixed top-level structure and configuration file exist.
    pub fn is_created(path: impl AsRef<Path>) -> bool {
        let paths = ProjectPaths::new(path.as_ref());
        paths.local_dir().is_dir() && paths.config_file().is_file() && paths.card_root().is_dir()
    }

    pub fn load(
        path: impl AsRef<Path>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !Self::is_created(path) {
            return Err(StoreError::NotAProject(path.to_path_buf()));
        }
        let paths = ProjectPaths::new(path);
        let configuration = read_configuration(&paths, validator.as_ref())?;
        Ok(Self {
            paths,
            configuration,
            validator,
        })
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn configuration(&self) -> &ProjectConfiguration {
        &self.configuration
    }

    pub fn prefix(&self) -> &str {
        &self.configuration.card_key_prefix
    }

    pub fn name(&self) -> &str {
        &self.configuration.name
    }

    pub fn validator(&self) -> &dyn SchemaValidator {
        self.validator.as_ref()
    }

    /// Changes the key prefix setting. Card directories are not touched.
    pub fn set_card_prefix(&mut self, prefix: &str) -> Result<(), StoreError> {
        let mut configuration = read_configuration(&self.paths, self.validator.as_ref())?;
        configuration.card_key_prefix = prefix.to_string();
        self.write_configuration(&configuration)?;
        self.configuration = configuration;
        Ok(())
    }

    /// Hands out `count` fresh project-scoped keys and advances the counter.
    ///
    /// Numbers already taken by a live card are skipped.
    pub fn reserve_card_keys(&self, count: usize) -> Result<Vec<String>, StoreError> {
        let mut configuration = read_configuration(&self.paths, self.validator.as_ref())?;
        let taken = self.live_card_keys();
        let prefix = configuration.card_key_prefix.clone();

        let mut keys = Vec::with_capacity(count);
        let mut number = configuration.next_available_card_number;
        while keys.len() < count {
            let key = card_key(&prefix, number);
            number += 1;
            if !taken.contains(&key) {
                keys.push(key);
            }
        }

        configuration.next_available_card_number = number;
        self.write_configuration(&configuration)?;
        tracing::debug!(count, next = number, "reserved card keys");
        Ok(keys)
    }

    fn write_configuration(&self, configuration: &ProjectConfiguration) -> Result<(), StoreError> {
        ensure_valid(
            self.validator.as_ref(),
            &serde_json::to_value(configuration)?,
            CARDS_CONFIG_SCHEMA,
        )?;
        write_json(&self.paths.config_file(), configuration)
    }

    /// Names of imported modules, sorted.
    pub fn module_names(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.paths.modules_dir();
        let mut names = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir).map_err(|err| StoreError::io_at(err, &dir))? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Local resource names followed by module resources as `module/name`.
    pub fn resource_names(&self, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = collection_names(&self.paths.resource_dir(kind), kind)?
            .into_iter()
            .collect();
        for module in self.module_names()? {
            let dir = self.paths.module_dir(&module).join(kind.dir_name());
            names.extend(
                collection_names(&dir, kind)?
                    .into_iter()
                    .map(|name| format!("{module}/{name}")),
            );
        }
        Ok(names)
    }

    /// True when the local collection already has a resource named `name`.
    pub fn local_resource_exists(&self, kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Template => self.paths.template_dir(name).exists(),
            _ => self.paths.resource_file(kind, name).exists(),
        }
    }

    /// Resolves a resource reference: `module/name` inside that module, plain
    /// names locally first and then in any module.
    pub fn resolve_resource_path(&self, kind: ResourceKind, name: &str) -> Option<PathBuf> {
        if let Some((module, rest)) = name.split_once('/') {
            let path = if module == crate::locator::LOCAL_DIR {
                self.paths.resource_file(kind, rest)
            } else {
                self.paths.module_resource_file(module, kind, rest)
            };
            return path.is_file().then_some(path);
        }

        let local = self.paths.resource_file(kind, name);
        if local.is_file() {
            return Some(local);
        }
        self.module_names()
            .ok()?
            .into_iter()
            .map(|module| self.paths.module_resource_file(&module, kind, name))
            .find(|path| path.is_file())
    }

    pub fn resource<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, StoreError> {
        let path = self
            .resolve_resource_path(kind, name)
            .ok_or_else(|| StoreError::NotFound(format!("{kind} '{name}' does not exist")))?;
        let raw = fs::read_to_string(&path).map_err(|err| StoreError::io_at(err, &path))?;
        serde_json::from_str(&raw).map_err(|err| {
            StoreError::Serialization(format!("invalid {kind} {}: {err}", path.display()))
        })
    }

    pub fn card_type(&self, name: &str) -> Result<CardType, StoreError> {
        self.resource(ResourceKind::CardType, name)
    }

    pub fn workflow(&self, name: &str) -> Result<Workflow, StoreError> {
        self.resource(ResourceKind::Workflow, name)
    }

    pub fn link_type(&self, name: &str) -> Result<LinkType, StoreError> {
        self.resource(ResourceKind::LinkType, name)
    }

    /// Workflow state new cards of `card_type` start in.
    pub fn initial_workflow_state(&self, card_type: &str) -> Result<String, StoreError> {
        let card_type = self.card_type(card_type)?;
        let workflow = self.workflow(&card_type.workflow)?;
        workflow.initial_state().map(str::to_string)
    }

    /// Resolves a template by (possibly qualified) name. The template may not exist yet.
    pub fn template(&self, name: &str) -> Result<Template<'_>, StoreError> {
        let name = TemplateName::parse(name, self.prefix())?;
        Ok(Template::new(self, name))
    }

    /// Every existing template, local ones first.
    pub fn templates(&self) -> Result<Vec<Template<'_>>, StoreError> {
        let mut templates = Vec::new();
        for name in self.resource_names(ResourceKind::Template)? {
            let template = self.template(&name)?;
            if template.exists() {
                templates.push(template);
            }
        }
        Ok(templates)
    }

    /// Finds a live card by key.
    pub fn find_specific_card(
        &self,
        key: &str,
        details: FetchCardDetails,
    ) -> Result<Option<Card>, StoreError> {
        find_card_dir(&self.paths.card_root(), key)
            .map(|dir| read_card(&dir, details))
            .transpose()
    }

    /// Finds a card by key among live cards, then local and module templates.
    pub fn find_card_anywhere(
        &self,
        key: &str,
        details: FetchCardDetails,
    ) -> Result<Option<Card>, StoreError> {
        let roots = [
            self.paths.card_root(),
            self.paths.resource_dir(ResourceKind::Template),
            self.paths.modules_dir(),
        ];
        roots
            .iter()
            .find_map(|root| find_card_dir(root, key))
            .map(|dir| read_card(&dir, details))
            .transpose()
    }

    /// Top-level live cards, with descendants when `details.children` is set.
    pub fn list_cards(&self, details: FetchCardDetails) -> Result<Vec<Card>, StoreError> {
        read_cards(&self.paths.card_root(), details)
    }

    /// Every live card, flattened, in no particular order.
    pub fn all_cards(&self, details: FetchCardDetails) -> Result<Vec<Card>, StoreError> {
        let details = FetchCardDetails {
            children: false,
            ..details
        };
        card_dirs(&self.paths.card_root())
            .iter()
            .map(|dir| read_card(dir, details))
            .collect()
    }

    pub fn live_card_keys(&self) -> HashSet<String> {
        card_dirs(&self.paths.card_root())
            .iter()
            .filter_map(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    /// Patches one metadata field of live card `key` and rewrites `index.json` whole.
    pub fn update_card_metadata(
        &self,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let card = self
            .find_specific_card(key, FetchCardDetails::default())?
            .ok_or_else(|| StoreError::NotFound(format!("card '{key}' does not exist")))?;
        self.patch_card_metadata(&card, field, value)
    }

    /// Patches one metadata field of an already located card, live or blueprint.
    pub fn patch_card_metadata(
        &self,
        card: &Card,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let key = card.key.as_str();
        if self.paths.is_module_path(&card.path) {
            return Err(StoreError::Forbidden(format!(
                "card '{key}' belongs to an imported module"
            )));
        }

        let mut metadata = card::read_metadata_value(&card.path)?;
        let object = metadata.as_object_mut().ok_or_else(|| {
            StoreError::Serialization(format!("metadata of card '{key}' is not an object"))
        })?;
        object.insert(field.to_string(), value);

        ensure_valid(self.validator.as_ref(), &metadata, CARD_BASE_SCHEMA)
            .map_err(|err| err.context(format!("card '{key}'")))?;
        card::write_metadata_value(&card.path, &metadata)?;
        tracing::debug!(card = key, field, "updated card metadata");
        Ok(())
    }
}

fn read_configuration(
    paths: &ProjectPaths,
    validator: &dyn SchemaValidator,
) -> Result<ProjectConfiguration, StoreError> {
    let path = paths.config_file();
    let raw = fs::read_to_string(&path).map_err(|err| StoreError::io_at(err, &path))?;
    let value: Value = serde_json::from_str(&raw).map_err(|err| {
        StoreError::Serialization(format!("invalid configuration {}: {err}", path.display()))
    })?;
    ensure_valid(validator, &value, CARDS_CONFIG_SCHEMA)?;
    Ok(serde_json::from_value(value)?)
}

fn collection_names(dir: &Path, kind: ResourceKind) -> Result<BTreeSet<String>, StoreError> {
    let mut names = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(dir).map_err(|err| StoreError::io_at(err, dir))? {
        let entry = entry?;
        let path = entry.path();
        match kind {
            ResourceKind::Template => {
                if path.join(TEMPLATE_DESCRIPTOR).is_file() {
                    names.insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
            _ => {
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem() {
                        names.insert(stem.to_string_lossy().into_owned());
                    }
                }
            }
        }
    }
    Ok(names)
}
