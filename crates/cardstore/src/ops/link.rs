use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::card::{Card, CardMetadata, FetchCardDetails, Link};
use crate::env::StoreEnv;
use crate::error::StoreError;
use crate::project::Project;
use crate::resources::LinkType;
use crate::template::Template;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOptions {
    pub from_key: String,
    pub to_key: String,
    pub link_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LinkOptions {
    fn as_link(&self) -> Link {
        Link {
            card_key: self.to_key.clone(),
            link_type: self.link_type.clone(),
            link_description: self.description.clone(),
        }
    }
}

/// Records a typed link from `from_key` to `to_key` in the source card.
///
/// Both endpoints must be live cards. Blueprints are linked with
/// [`create_template_link`].
pub fn create_link(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    opts: LinkOptions,
) -> Result<Link, StoreError> {
    let project = env.project(path)?;
    add_link(&project, &opts, |key| {
        project.find_specific_card(key, FetchCardDetails::metadata())
    })
}

/// Links two blueprints of the same local template.
pub fn create_template_link(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    template: &str,
    opts: LinkOptions,
) -> Result<Link, StoreError> {
    let project = env.project(path)?;
    let template = local_template(&project, template)?;
    add_link(&project, &opts, |key| {
        template.find_specific_card(key, FetchCardDetails::metadata())
    })
}

/// Removes the live link matching `opts` exactly.
pub fn remove_link(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    opts: LinkOptions,
) -> Result<(), StoreError> {
    let project = env.project(path)?;
    drop_link(&project, &opts, |key| {
        project.find_specific_card(key, FetchCardDetails::metadata())
    })
}

/// Removes a link between two blueprints of a local template.
pub fn remove_template_link(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    template: &str,
    opts: LinkOptions,
) -> Result<(), StoreError> {
    let project = env.project(path)?;
    let template = local_template(&project, template)?;
    drop_link(&project, &opts, |key| {
        template.find_specific_card(key, FetchCardDetails::metadata())
    })
}

fn local_template<'p>(project: &'p Project, name: &str) -> Result<Template<'p>, StoreError> {
    let template = project.template(name)?;
    if !template.exists() {
        return Err(StoreError::NotFound(format!(
            "template '{}' does not exist",
            template.name().qualified()
        )));
    }
    template.ensure_mutable()?;
    Ok(template)
}

fn add_link<F>(project: &Project, opts: &LinkOptions, find: F) -> Result<Link, StoreError>
where
    F: Fn(&str) -> Result<Option<Card>, StoreError>,
{
    if opts.from_key == opts.to_key {
        return Err(StoreError::InvalidInput(format!(
            "card '{}' cannot link to itself",
            opts.from_key
        )));
    }

    let link_type = project.link_type(&opts.link_type)?;
    let (source, source_metadata) = linked_card(&find, &opts.from_key)?;
    let (_, destination_metadata) = linked_card(&find, &opts.to_key)?;
    check_link_type(&link_type, opts, &source_metadata, &destination_metadata)?;

    let link = opts.as_link();
    let mut links = source_metadata.links;
    if links.contains(&link) {
        return Err(StoreError::Integrity(format!(
            "card '{}' already has a '{}' link to '{}'",
            opts.from_key, opts.link_type, opts.to_key
        )));
    }
    links.push(link.clone());

    project.patch_card_metadata(&source, "links", serde_json::to_value(&links)?)?;
    tracing::debug!(
        from = %opts.from_key,
        to = %opts.to_key,
        link_type = %opts.link_type,
        "created link"
    );
    Ok(link)
}

fn drop_link<F>(project: &Project, opts: &LinkOptions, find: F) -> Result<(), StoreError>
where
    F: Fn(&str) -> Result<Option<Card>, StoreError>,
{
    let (source, metadata) = linked_card(&find, &opts.from_key)?;

    let link = opts.as_link();
    let before = metadata.links.len();
    let links: Vec<Link> = metadata
        .links
        .into_iter()
        .filter(|existing| *existing != link)
        .collect();
    if links.len() == before {
        return Err(StoreError::NotFound(format!(
            "card '{}' has no '{}' link to '{}'",
            opts.from_key, opts.link_type, opts.to_key
        )));
    }

    project.patch_card_metadata(&source, "links", serde_json::to_value(&links)?)?;
    tracing::debug!(from = %opts.from_key, to = %opts.to_key, "removed link");
    Ok(())
}

fn linked_card<F>(find: &F, key: &str) -> Result<(Card, CardMetadata), StoreError>
where
    F: Fn(&str) -> Result<Option<Card>, StoreError>,
{
    let mut card =
        find(key)?.ok_or_else(|| StoreError::NotFound(format!("card '{key}' does not exist")))?;
    let metadata = card.metadata.take().ok_or_else(|| {
        StoreError::Serialization(format!("card '{key}' has no metadata"))
    })?;
    Ok((card, metadata))
}

fn check_link_type(
    link_type: &LinkType,
    opts: &LinkOptions,
    source: &CardMetadata,
    destination: &CardMetadata,
) -> Result<(), StoreError> {
    if opts.description.is_some() && !link_type.enable_link_description {
        return Err(StoreError::InvalidInput(format!(
            "link type '{}' does not allow link descriptions",
            link_type.name
        )));
    }
    if !accepts(&link_type.source_card_types, &source.card_type) {
        return Err(StoreError::Integrity(format!(
            "link type '{}' does not accept card type '{}' as a source",
            link_type.name, source.card_type
        )));
    }
    if !accepts(&link_type.destination_card_types, &destination.card_type) {
        return Err(StoreError::Integrity(format!(
            "link type '{}' does not accept card type '{}' as a destination",
            link_type.name, destination.card_type
        )));
    }
    Ok(())
}

// Empty list means unrestricted. Entries may carry a module qualifier.
fn accepts(allowed: &[String], card_type: &str) -> bool {
    allowed.is_empty()
        || allowed.iter().any(|candidate| {
            candidate == card_type
                || candidate.rsplit_once('/').map(|(_, name)| name) == Some(card_type)
        })
}
