use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::card::{card_dirs, find_card_dir, read_metadata_value};
use crate::env::StoreEnv;
use crate::error::StoreError;
use crate::locator::ResourceKind;
use crate::project::Project;
use crate::schema::{
    CARD_BASE_SCHEMA, CARD_TYPE_SCHEMA, FIELD_TYPE_SCHEMA, LINK_TYPE_SCHEMA, TEMPLATE_SCHEMA,
    WORKFLOW_SCHEMA,
};
use crate::shape::validate_project_shape;

#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks directory shape, every resource document and every card's metadata
/// and references. Problems are collected, not raised.
pub fn validate_project(
    env: &StoreEnv,
    path: impl AsRef<Path>,
) -> Result<ValidationReport, StoreError> {
    let project = env.project(path)?;
    let mut violations = validate_project_shape(project.root())?;

    for kind in ResourceKind::ALL {
        for name in project.resource_names(kind)? {
            let Some(file) = resource_document_path(&project, kind, &name) else {
                continue;
            };
            let raw = fs::read_to_string(&file).map_err(|err| StoreError::io_at(err, &file))?;
            let document: Value = match serde_json::from_str(&raw) {
                Ok(document) => document,
                Err(err) => {
                    violations.push(format!("{kind} '{name}': invalid JSON: {err}"));
                    continue;
                }
            };
            for violation in env.validator.validate(&document, schema_for(kind))? {
                violations.push(format!("{kind} '{name}': {violation}"));
            }
        }
    }

    // Live links resolve among live cards, blueprint links within their own template.
    let mut roots = vec![project.paths().card_root()];
    roots.extend(project.templates()?.iter().map(|template| template.cards_dir()));
    for root in roots {
        for dir in card_dirs(&root) {
            let key = dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            check_card(env, &project, &root, &key, &dir, &mut violations)?;
        }
    }

    tracing::debug!(violations = violations.len(), "validated project");
    Ok(ValidationReport { violations })
}

fn resource_document_path(
    project: &Project,
    kind: ResourceKind,
    name: &str,
) -> Option<std::path::PathBuf> {
    match kind {
        ResourceKind::Template => project
            .template(name)
            .ok()
            .map(|template| template.descriptor_path()),
        _ => project.resolve_resource_path(kind, name),
    }
}

fn schema_for(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::CardType => CARD_TYPE_SCHEMA,
        ResourceKind::FieldType => FIELD_TYPE_SCHEMA,
        ResourceKind::LinkType => LINK_TYPE_SCHEMA,
        ResourceKind::Workflow => WORKFLOW_SCHEMA,
        ResourceKind::Template => TEMPLATE_SCHEMA,
    }
}

fn check_card(
    env: &StoreEnv,
    project: &Project,
    tree: &Path,
    key: &str,
    dir: &Path,
    violations: &mut Vec<String>,
) -> Result<(), StoreError> {
    let metadata = match read_metadata_value(dir) {
        Ok(metadata) => metadata,
        Err(err) => {
            violations.push(format!("card '{key}': {err}"));
            return Ok(());
        }
    };
    for violation in env.validator.validate(&metadata, CARD_BASE_SCHEMA)? {
        violations.push(format!("card '{key}': {violation}"));
    }

    if let Some(card_type) = metadata.get("cardType").and_then(Value::as_str) {
        if project
            .resolve_resource_path(ResourceKind::CardType, card_type)
            .is_none()
        {
            violations.push(format!("card '{key}': unknown card type '{card_type}'"));
        }
    }

    let links = metadata
        .get("links")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for link in links {
        if let Some(link_type) = link.get("linkType").and_then(Value::as_str) {
            if project
                .resolve_resource_path(ResourceKind::LinkType, link_type)
                .is_none()
            {
                violations.push(format!("card '{key}': unknown link type '{link_type}'"));
            }
        }
        if let Some(target) = link.get("cardKey").and_then(Value::as_str) {
            if find_card_dir(tree, target).is_none() {
                violations.push(format!("card '{key}': link to missing card '{target}'"));
            }
        }
    }
    Ok(())
}
