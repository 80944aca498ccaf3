use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const CARDS_DIR: &str = ".cards";
pub const LOCAL_DIR: &str = "local";
pub const MODULES_DIR: &str = "modules";
pub const CARD_ROOT: &str = "cardroot";
pub const CALC_DIR: &str = ".calc";
pub const CONFIG_FILE: &str = "cardsConfig.json";
pub const SCHEMA_STUB: &str = ".schema";
pub const GITKEEP: &str = ".gitkeep";
pub const IGNORE_FILE: &str = ".gitignore";

pub const CARD_METADATA_FILE: &str = "index.json";
pub const CARD_CONTENT_FILE: &str = "index.adoc";
pub const CARD_CALCULATION_FILE: &str = "index.lp";
pub const ATTACHMENTS_DIR: &str = "a";
pub const CHILDREN_DIR: &str = "c";
pub const TEMPLATE_DESCRIPTOR: &str = "template.json";

/// Resource families stored as one document per name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    CardType,
    FieldType,
    LinkType,
    Workflow,
    Template,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::CardType,
        ResourceKind::FieldType,
        ResourceKind::LinkType,
        ResourceKind::Workflow,
        ResourceKind::Template,
    ];

    /// Directory name of the collection inside `local/` or a module.
    pub fn dir_name(self) -> &'static str {
        match self {
            ResourceKind::CardType => "cardtypes",
            ResourceKind::FieldType => "fieldtypes",
            ResourceKind::LinkType => "linktypes",
            ResourceKind::Workflow => "workflows",
            ResourceKind::Template => "templates",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::CardType => "card type",
            ResourceKind::FieldType => "field type",
            ResourceKind::LinkType => "link type",
            ResourceKind::Workflow => "workflow",
            ResourceKind::Template => "template",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical paths for a project on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/.cards`
    pub fn cards_dir(&self) -> PathBuf {
        self.root.join(CARDS_DIR)
    }

    /// `{root}/.cards/local`
    pub fn local_dir(&self) -> PathBuf {
        self.cards_dir().join(LOCAL_DIR)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.cards_dir().join(MODULES_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.local_dir().join(CONFIG_FILE)
    }

    pub fn card_root(&self) -> PathBuf {
        self.root.join(CARD_ROOT)
    }

    pub fn calc_dir(&self) -> PathBuf {
        self.root.join(CALC_DIR)
    }

    pub fn calculations_dir(&self) -> PathBuf {
        self.local_dir().join("calculations")
    }

    pub fn resource_dir(&self, kind: ResourceKind) -> PathBuf {
        self.local_dir().join(kind.dir_name())
    }

    /// `{root}/.cards/local/{kind}/{name}.json`
    pub fn resource_file(&self, kind: ResourceKind, name: &str) -> PathBuf {
        self.resource_dir(kind).join(format!("{name}.json"))
    }

    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.modules_dir().join(module)
    }

    pub fn module_resource_file(&self, module: &str, kind: ResourceKind, name: &str) -> PathBuf {
        self.module_dir(module)
            .join(kind.dir_name())
            .join(format!("{name}.json"))
    }

    pub fn template_dir(&self, name: &str) -> PathBuf {
        self.resource_dir(ResourceKind::Template).join(name)
    }

    pub fn module_template_dir(&self, module: &str, name: &str) -> PathBuf {
        self.module_dir(module)
            .join(ResourceKind::Template.dir_name())
            .join(name)
    }

    /// True when `path` lies inside an imported module.
    pub fn is_module_path(&self, path: &Path) -> bool {
        path.starts_with(self.modules_dir())
    }
}

pub fn card_metadata_path(card_dir: &Path) -> PathBuf {
    card_dir.join(CARD_METADATA_FILE)
}

pub fn card_content_path(card_dir: &Path) -> PathBuf {
    card_dir.join(CARD_CONTENT_FILE)
}

pub fn attachments_dir(card_dir: &Path) -> PathBuf {
    card_dir.join(ATTACHMENTS_DIR)
}

pub fn children_dir(card_dir: &Path) -> PathBuf {
    card_dir.join(CHILDREN_DIR)
}

/// Walks upward from `start` to the nearest directory holding a project configuration.
pub fn discover(start: impl AsRef<Path>) -> Result<ProjectPaths, StoreError> {
    let start = start.as_ref();
    let mut cursor = start.to_path_buf();
    while !cursor.exists() {
        if !cursor.pop() {
            return Err(StoreError::NotAProject(start.to_path_buf()));
        }
    }
    let canonical = fs::canonicalize(&cursor).map_err(|err| StoreError::io_at(err, &cursor))?;

    for ancestor in canonical.ancestors() {
        let candidate = ProjectPaths::new(ancestor);
        if candidate.config_file().is_file() {
            return Ok(candidate);
        }
    }

    Err(StoreError::NotAProject(start.to_path_buf()))
}
