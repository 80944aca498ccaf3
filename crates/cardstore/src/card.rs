use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::locator::{
    CHILDREN_DIR, attachments_dir, card_content_path, card_metadata_path, children_dir,
};

pub const MIN_KEY_LENGTH: usize = 5;
pub const MAX_KEY_LENGTH: usize = 20;
pub const FIRST_RANK: &str = "0|a";

fn key_regex() -> &'static Regex {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    KEY_REGEX.get_or_init(|| Regex::new(r"^([a-z]+)_([0-9]+)$").expect("card key regex"))
}

/// True when `key` is a well-formed card key (`prefix_number`, 5–20 chars).
pub fn is_valid_card_key(key: &str) -> bool {
    (MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&key.len()) && key_regex().is_match(key)
}

pub fn card_key(prefix: &str, number: u64) -> String {
    format!("{prefix}_{number}")
}

/// Splits a card key into prefix and numeric suffix.
pub fn split_card_key(key: &str) -> Option<(&str, u64)> {
    let caps = key_regex().captures(key)?;
    let prefix = caps.get(1)?.as_str();
    let number = caps.get(2)?.as_str().parse().ok()?;
    Some((prefix, number))
}

/// A typed relationship stored on the source card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub card_key: String,
    pub link_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_description: Option<String>,
}

/// Contents of a card's `index.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    pub card_type: String,
    pub title: String,
    pub workflow_state: String,
    pub rank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transitioned: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Custom field values, preserved verbatim.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CardMetadata {
    pub fn new(card_type: &str, workflow_state: &str, rank: &str) -> Self {
        Self {
            card_type: card_type.to_string(),
            title: "Untitled".to_string(),
            workflow_state: workflow_state.to_string(),
            rank: rank.to_string(),
            last_transitioned: None,
            last_updated: None,
            labels: Vec::new(),
            links: Vec::new(),
            fields: Map::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAttachment {
    pub card_key: String,
    pub file_name: String,
    pub path: PathBuf,
}

/// In-memory view of one card directory.
///
/// Children are owned values addressed by their own `path`; there are no
/// back-references to parents.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Card {
    pub key: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CardMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub children: Vec<Card>,
    pub attachments: Vec<CardAttachment>,
}

impl Card {
    /// Flattens this card and its loaded descendants, parents first.
    pub fn flatten(&self) -> Vec<&Card> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// Which parts of a card to populate when reading it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchCardDetails {
    pub metadata: bool,
    pub content: bool,
    pub children: bool,
    pub attachments: bool,
}

impl FetchCardDetails {
    pub fn all() -> Self {
        Self {
            metadata: true,
            content: true,
            children: true,
            attachments: true,
        }
    }

    pub fn metadata() -> Self {
        Self {
            metadata: true,
            ..Self::default()
        }
    }
}

pub fn read_metadata(card_dir: &Path) -> Result<CardMetadata, StoreError> {
    let value = read_metadata_value(card_dir)?;
    serde_json::from_value(value).map_err(|err| {
        StoreError::Serialization(format!(
            "invalid card metadata in {}: {err}",
            card_dir.display()
        ))
    })
}

pub fn read_metadata_value(card_dir: &Path) -> Result<Value, StoreError> {
    let path = card_metadata_path(card_dir);
    let raw = fs::read_to_string(&path).map_err(|err| StoreError::io_at(err, &path))?;
    serde_json::from_str(&raw).map_err(|err| {
        StoreError::Serialization(format!("invalid JSON in {}: {err}", path.display()))
    })
}

/// Replaces `index.json` wholesale.
pub fn write_metadata_value(card_dir: &Path, value: &Value) -> Result<(), StoreError> {
    let path = card_metadata_path(card_dir);
    let body = format!("{}\n", serde_json::to_string_pretty(value)?);
    fs::write(&path, body).map_err(|err| StoreError::io_at(err, &path))
}

pub fn write_metadata(card_dir: &Path, metadata: &CardMetadata) -> Result<(), StoreError> {
    write_metadata_value(card_dir, &serde_json::to_value(metadata)?)
}

/// Reads the card stored in `card_dir`, populating the requested details.
pub fn read_card(card_dir: &Path, details: FetchCardDetails) -> Result<Card, StoreError> {
    let key = card_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| is_valid_card_key(name))
        .ok_or_else(|| {
            StoreError::InvalidInput(format!("{} is not a card directory", card_dir.display()))
        })?;

    let metadata = if details.metadata {
        Some(read_metadata(card_dir)?)
    } else {
        None
    };
    let content = if details.content {
        let path = card_content_path(card_dir);
        Some(fs::read_to_string(&path).unwrap_or_default())
    } else {
        None
    };
    let children = if details.children {
        read_cards(&children_dir(card_dir), details)?
    } else {
        Vec::new()
    };
    let attachments = if details.attachments {
        read_attachments(&key, card_dir)?
    } else {
        Vec::new()
    };

    Ok(Card {
        key,
        path: card_dir.to_path_buf(),
        metadata,
        content,
        children,
        attachments,
    })
}

/// Reads every card directly inside `container` (a card root or a `c` folder).
///
/// Cards are ordered by rank when metadata is loaded, by key otherwise.
pub fn read_cards(container: &Path, details: FetchCardDetails) -> Result<Vec<Card>, StoreError> {
    if !container.is_dir() {
        return Ok(Vec::new());
    }
    let mut cards = Vec::new();
    for entry in fs::read_dir(container).map_err(|err| StoreError::io_at(err, container))? {
        let entry = entry?;
        let path = entry.path();
        let is_card = path.is_dir()
            && is_valid_card_key(&entry.file_name().to_string_lossy())
            && card_metadata_path(&path).is_file();
        if is_card {
            cards.push(read_card(&path, details)?);
        }
    }
    cards.sort_by(|a, b| {
        let rank = |card: &Card| card.metadata.as_ref().map(|m| m.rank.clone());
        rank(a).cmp(&rank(b)).then_with(|| a.key.cmp(&b.key))
    });
    Ok(cards)
}

fn read_attachments(key: &str, card_dir: &Path) -> Result<Vec<CardAttachment>, StoreError> {
    let dir = attachments_dir(card_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut attachments = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|err| StoreError::io_at(err, &dir))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            attachments.push(CardAttachment {
                card_key: key.to_string(),
                file_name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
            });
        }
    }
    attachments.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(attachments)
}

/// Every card directory below `root`, at any depth.
pub fn card_dirs(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| is_valid_card_key(&entry.file_name().to_string_lossy()))
        .filter(|entry| {
            let parent = entry.path().parent();
            parent == Some(root)
                || parent.and_then(Path::file_name).and_then(|n| n.to_str()) == Some(CHILDREN_DIR)
        })
        .filter(|entry| card_metadata_path(entry.path()).is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Locates the directory of card `key` anywhere below `root`.
pub fn find_card_dir(root: &Path, key: &str) -> Option<PathBuf> {
    if !is_valid_card_key(key) {
        return None;
    }
    card_dirs(root)
        .into_iter()
        .find(|dir| dir.file_name().and_then(|n| n.to_str()) == Some(key))
}

/// Returns a rank that sorts strictly after `rank`.
pub fn rank_after(rank: &str) -> String {
    if rank.is_empty() {
        return FIRST_RANK.to_string();
    }
    let mut next = rank.to_string();
    match next.pop() {
        Some(last) if last.is_ascii_lowercase() && last != 'z' => {
            next.push((last as u8 + 1) as char);
        }
        Some(last) => {
            next.push(last);
            next.push('a');
        }
        None => next.push_str(FIRST_RANK),
    }
    next
}

/// Highest rank among `cards`, if any carry metadata.
pub fn last_rank(cards: &[Card]) -> Option<String> {
    cards
        .iter()
        .filter_map(|card| card.metadata.as_ref().map(|m| m.rank.clone()))
        .max()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
