use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::StoreError;

const DIRECTORY_SHAPE: &str = include_str!("../schemas/directory-shape.json");

#[derive(Debug, Deserialize)]
struct ShapeDocument {
    id: String,
    root: ShapeNode,
    /// Named nodes, referenced by `$ref` and `dirNode`. Card trees recurse through these.
    #[serde(default)]
    nodes: BTreeMap<String, ShapeNode>,
}

/// Constraints on one directory of the project tree.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeNode {
    #[serde(default, rename = "$ref")]
    reference: Option<String>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    #[serde(default)]
    children: BTreeMap<String, ShapeNode>,
    #[serde(default)]
    dir_pattern: Option<String>,
    /// Shape every directory matching `dir_pattern` must have.
    #[serde(default)]
    dir_node: Option<String>,
    #[serde(default)]
    file_pattern: Option<String>,
}

/// Checks the project rooted at `root` against the embedded directory-shape document.
///
/// Returns the list of violations; an empty list means the tree has the expected shape.
pub fn validate_project_shape(root: &Path) -> Result<Vec<String>, StoreError> {
    let document: ShapeDocument = serde_json::from_str(DIRECTORY_SHAPE)?;
    let mut violations = Vec::new();
    if !root.is_dir() {
        violations.push(format!("{} is not a directory", root.display()));
        return Ok(violations);
    }
    let mut checker = ShapeChecker {
        nodes: &document.nodes,
        patterns: HashMap::new(),
        violations: &mut violations,
    };
    checker.check(root, &document.root)?;
    tracing::debug!(
        schema = %document.id,
        root = %root.display(),
        violations = violations.len(),
        "checked directory shape"
    );
    Ok(violations)
}

struct ShapeChecker<'d, 'v> {
    nodes: &'d BTreeMap<String, ShapeNode>,
    patterns: HashMap<String, Regex>,
    violations: &'v mut Vec<String>,
}

impl<'d> ShapeChecker<'d, '_> {
    fn named(&self, name: &str) -> Result<&'d ShapeNode, StoreError> {
        self.nodes.get(name).ok_or_else(|| {
            StoreError::Serialization(format!("directory-shape node '{name}' is not defined"))
        })
    }

    fn resolve(&self, node: &'d ShapeNode) -> Result<&'d ShapeNode, StoreError> {
        match &node.reference {
            Some(name) => self.named(name),
            None => Ok(node),
        }
    }

    fn matches(&mut self, pattern: &str, name: &str) -> Result<bool, StoreError> {
        if !self.patterns.contains_key(pattern) {
            self.patterns.insert(pattern.to_string(), compile(pattern)?);
        }
        Ok(self
            .patterns
            .get(pattern)
            .is_some_and(|regex| regex.is_match(name)))
    }

    fn check(&mut self, dir: &Path, node: &'d ShapeNode) -> Result<(), StoreError> {
        let node = self.resolve(node)?;
        for name in &node.required {
            if !dir.join(name).exists() {
                self.violations
                    .push(format!("missing required entry {}", dir.join(name).display()));
            }
        }

        let entries = fs::read_dir(dir).map_err(|err| StoreError::io_at(err, dir))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if let Some(allowed) = &node.allowed {
                if !allowed.iter().any(|candidate| candidate == &name) {
                    self.violations
                        .push(format!("unexpected entry {}", path.display()));
                    continue;
                }
            }

            if path.is_dir() {
                if let Some(child) = node.children.get(&name) {
                    self.check(&path, child)?;
                    continue;
                }
                if let Some(pattern) = &node.dir_pattern {
                    if !self.matches(pattern, &name)? {
                        self.violations
                            .push(format!("invalid directory name {}", path.display()));
                        continue;
                    }
                }
                if let Some(shape) = &node.dir_node {
                    let shape = self.named(shape)?;
                    self.check(&path, shape)?;
                }
            } else if let Some(pattern) = &node.file_pattern {
                if !self.matches(pattern, &name)? {
                    self.violations
                        .push(format!("invalid file name {}", path.display()));
                }
            }
        }
        Ok(())
    }
}

fn compile(raw: &str) -> Result<Regex, StoreError> {
    Regex::new(raw).map_err(|err| {
        StoreError::Serialization(format!("invalid directory-shape pattern {raw}: {err}"))
    })
}
