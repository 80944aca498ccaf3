use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::card::{card_dirs, card_key, read_metadata_value, split_card_key, write_metadata_value};
use crate::env::StoreEnv;
use crate::error::StoreError;
use crate::events::StoreEvent;
use crate::locator::{attachments_dir, card_content_path};
use crate::ops::create::ensure_valid_prefix;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RenameResult {
    pub from: String,
    pub to: String,
    pub cards: usize,
    pub attachments: usize,
}

/// Matches key tokens of one prefix; group 1 is the leading boundary
/// character (if any), group 2 the prefix, group 3 the number.
struct KeyPattern {
    regex: Regex,
    to: String,
}

impl KeyPattern {
    fn new(from: &str, to: &str) -> Result<Self, StoreError> {
        let regex = Regex::new(&format!(r"(^|[^a-z])({})_([0-9]+)", regex::escape(from)))
            .map_err(|err| StoreError::InvalidInput(format!("invalid prefix '{from}': {err}")))?;
        Ok(Self {
            regex,
            to: to.to_string(),
        })
    }

    /// Rewrites every key token.
    fn replace_all(&self, text: &str) -> String {
        self.regex
            .replace_all(text, |caps: &Captures| {
                format!("{}{}_{}", &caps[1], self.to, &caps[3])
            })
            .into_owned()
    }

    /// Rewrites only the last key token, if there is one.
    fn replace_last(&self, text: &str) -> Option<String> {
        let caps = self.regex.captures_iter(text).last()?;
        let prefix = caps.get(2)?;
        Some(format!(
            "{}{}{}",
            &text[..prefix.start()],
            self.to,
            &text[prefix.end()..]
        ))
    }
}

/// Changes the project key prefix and renames every card keyed with the old one.
///
/// Cards are processed deepest first so no directory is moved before its
/// descendants. Local templates are renamed too; module templates are not.
///
/// The prefix setting is written before any card moves. When it already
/// equals `to`, cards still carrying another prefix are left over from an
/// interrupted rename and are renamed now, so rerunning a failed rename
/// completes it.
pub fn rename_project(
    env: &StoreEnv,
    path: impl AsRef<Path>,
    to: &str,
) -> Result<RenameResult, StoreError> {
    let mut project = env.project(path)?;
    ensure_valid_prefix(to)?;
    let configured = project.prefix().to_string();

    let mut trees = vec![project.paths().card_root()];
    for template in project.templates()? {
        if !template.is_module() {
            trees.push(template.cards_dir());
        }
    }

    let stale = if configured == to {
        leftover_prefixes(&trees, to)
    } else {
        vec![configured.clone()]
    };
    let mut result = RenameResult {
        from: stale.first().cloned().unwrap_or_else(|| configured.clone()),
        to: to.to_string(),
        ..RenameResult::default()
    };
    if stale.is_empty() {
        tracing::info!(prefix = to, "prefix unchanged, nothing to rename");
        return Ok(result);
    }

    if configured != to {
        project.set_card_prefix(to)?;
    } else {
        tracing::warn!(prefix = to, stale = ?stale, "resuming interrupted rename");
    }
    for from in &stale {
        let pattern = KeyPattern::new(from, to)?;
        for tree in &trees {
            rename_tree(tree, from, &pattern, &mut result)?;
        }
    }

    tracing::info!(
        from = %result.from,
        to = %result.to,
        cards = result.cards,
        attachments = result.attachments,
        "renamed project prefix"
    );
    env.events.publish(StoreEvent::Renamed {
        project_path: project.root().to_path_buf(),
    });
    Ok(result)
}

// Prefixes other than `to` still used by card directories, sorted.
fn leftover_prefixes(trees: &[PathBuf], to: &str) -> Vec<String> {
    let prefixes: BTreeSet<String> = trees
        .iter()
        .flat_map(|tree| card_dirs(tree))
        .filter_map(|dir| {
            let name = dir.file_name()?.to_str()?.to_string();
            let (prefix, _) = split_card_key(&name)?;
            (prefix != to).then(|| prefix.to_string())
        })
        .collect();
    prefixes.into_iter().collect()
}

fn rename_tree(
    root: &Path,
    from: &str,
    pattern: &KeyPattern,
    result: &mut RenameResult,
) -> Result<(), StoreError> {
    let mut dirs: Vec<(PathBuf, u64)> = card_dirs(root)
        .into_iter()
        .filter_map(|dir| {
            let number = dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(split_card_key)
                .filter(|(prefix, _)| *prefix == from)
                .map(|(_, number)| number)?;
            Some((dir, number))
        })
        .collect();
    dirs.sort_by_key(|(dir, _)| std::cmp::Reverse(dir.as_os_str().len()));

    for (dir, number) in dirs {
        result.attachments += rename_attachments(&dir, pattern)?;
        rewrite_content(&dir, pattern)?;
        rewrite_links(&dir, pattern)?;

        let target = dir.with_file_name(card_key(&pattern.to, number));
        if target.exists() {
            return Err(StoreError::AlreadyExists(format!(
                "cannot rename {}: {} already exists",
                dir.display(),
                target.display()
            )));
        }
        fs::rename(&dir, &target).map_err(|err| StoreError::io_at(err, &dir))?;
        result.cards += 1;
    }
    Ok(())
}

fn rename_attachments(card_dir: &Path, pattern: &KeyPattern) -> Result<usize, StoreError> {
    let dir = attachments_dir(card_dir);
    if !dir.is_dir() {
        return Ok(0);
    }
    let entries = fs::read_dir(&dir)
        .map_err(|err| StoreError::io_at(err, &dir))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut renamed = 0;
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(new_name) = pattern.replace_last(&name) else {
            continue;
        };
        let target = dir.join(&new_name);
        if target.exists() {
            return Err(StoreError::AlreadyExists(format!(
                "attachment {} already exists",
                target.display()
            )));
        }
        fs::rename(entry.path(), &target).map_err(|err| StoreError::io_at(err, &target))?;
        renamed += 1;
    }
    Ok(renamed)
}

fn rewrite_content(card_dir: &Path, pattern: &KeyPattern) -> Result<(), StoreError> {
    let path = card_content_path(card_dir);
    if !path.is_file() {
        return Ok(());
    }
    let content = fs::read_to_string(&path).map_err(|err| StoreError::io_at(err, &path))?;
    let rewritten = pattern.replace_all(&content);
    if rewritten != content {
        fs::write(&path, rewritten).map_err(|err| StoreError::io_at(err, &path))?;
    }
    Ok(())
}

fn rewrite_links(card_dir: &Path, pattern: &KeyPattern) -> Result<(), StoreError> {
    let mut metadata = read_metadata_value(card_dir)?;
    let Some(links) = metadata.get_mut("links").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    let mut changed = false;
    for link in links {
        if let Some(Value::String(key)) = link.get_mut("cardKey") {
            let rewritten = pattern.replace_all(key);
            if rewritten != *key {
                *key = rewritten;
                changed = true;
            }
        }
    }
    if changed {
        write_metadata_value(card_dir, &metadata)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_tokens_are_rewritten_in_place() {
        let pattern = KeyPattern::new("demo", "proj").unwrap();
        assert_eq!(
            pattern.replace_all("see demo_1, xdemo_2 and <<demo_12>>"),
            "see proj_1, xdemo_2 and <<proj_12>>"
        );
    }

    #[test]
    fn only_the_last_token_is_renamed() {
        let pattern = KeyPattern::new("demo", "proj").unwrap();
        assert_eq!(
            pattern.replace_last("demo_1-copy-of-demo_2.png").as_deref(),
            Some("demo_1-copy-of-proj_2.png")
        );
        assert_eq!(
            pattern.replace_last("demo_3.png").as_deref(),
            Some("proj_3.png")
        );
        assert_eq!(pattern.replace_last("diagram.png"), None);
    }
}
