use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardstore::{
    AddCardsOptions, EventQueue, LinkOptions, StoreEnv, StoreError, StoreEvent, add_cards,
    create_attachment, create_card, create_card_type, create_link, create_link_type,
    create_project, create_template, create_workflow, rename_project, validate_project,
};
use serde_json::Value;
use tempfile::TempDir;

// Project root sits below a directory that looks like a card key.
fn nested_project() -> (TempDir, PathBuf, StoreEnv, Arc<EventQueue>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("demo_9").join("project");
    let events = Arc::new(EventQueue::new());
    let env = StoreEnv::with_events(events.clone()).expect("env");

    create_project(&env, &root, "demo", "Demo").unwrap();
    create_workflow(&env, &root, "simple", None).unwrap();
    create_card_type(&env, &root, "task", "simple").unwrap();
    create_link_type(&env, &root, "relates", None).unwrap();
    create_template(&env, &root, "decision", None).unwrap();
    for parent in [None, Some("demo_1".to_string())] {
        add_cards(
            &env,
            &root,
            AddCardsOptions {
                card_type: "task".into(),
                template: "decision".into(),
                parent_card_key: parent,
                count: 1,
            },
        )
        .unwrap();
    }
    let keys = create_card(&env, &root, "decision", None).unwrap();
    assert_eq!(keys, ["demo_1", "demo_2"]);

    create_attachment(
        &env,
        &root,
        "demo_2",
        Path::new("demo_2-diagram.png"),
        Some(b"png"),
    )
    .unwrap();
    create_attachment(
        &env,
        &root,
        "demo_2",
        Path::new("demo_1-vs-demo_2.txt"),
        Some(b"txt"),
    )
    .unwrap();
    fs::write(
        root.join("cardroot/demo_1/index.adoc"),
        "Child: <<demo_2>>\nimage::demo_2-diagram.png[]\n",
    )
    .unwrap();
    create_link(
        &env,
        &root,
        LinkOptions {
            from_key: "demo_1".into(),
            to_key: "demo_2".into(),
            link_type: "relates".into(),
            description: None,
        },
    )
    .unwrap();
    events.drain();

    (dir, root, env, events)
}

fn metadata(card_dir: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(card_dir.join("index.json")).unwrap()).unwrap()
}

#[test]
fn rename_cascades_through_nested_cards() {
    let (_dir, root, env, events) = nested_project();

    let result = rename_project(&env, &root, "proj").unwrap();
    assert_eq!(result.from, "demo");
    assert_eq!(result.to, "proj");
    assert_eq!(result.cards, 4);
    assert_eq!(result.attachments, 2);

    assert!(root.exists(), "ancestor directory must not be renamed");
    let parent = root.join("cardroot/proj_1");
    let child = parent.join("c/proj_2");
    assert!(child.join("index.json").is_file());
    assert!(!root.join("cardroot/demo_1").exists());

    assert!(child.join("a/proj_2-diagram.png").is_file());
    assert!(child.join("a/demo_1-vs-proj_2.txt").is_file());

    assert_eq!(
        fs::read_to_string(parent.join("index.adoc")).unwrap(),
        "Child: <<proj_2>>\nimage::proj_2-diagram.png[]\n"
    );
    assert_eq!(metadata(&parent)["links"][0]["cardKey"], "proj_2");

    let template = root.join(".cards/local/templates/decision/c");
    assert!(template.join("proj_1/c/proj_2").is_dir());

    let project = env.project(&root).unwrap();
    assert_eq!(project.prefix(), "proj");

    let published = events.drain();
    assert_eq!(
        published,
        [StoreEvent::Renamed {
            project_path: root.clone()
        }]
    );

    let report = validate_project(&env, &root).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[test]
fn renaming_to_the_current_prefix_changes_nothing() {
    let (_dir, root, env, events) = nested_project();

    rename_project(&env, &root, "proj").unwrap();
    events.drain();
    let again = rename_project(&env, &root, "proj").unwrap();
    assert_eq!(again.cards, 0);
    assert!(root.join("cardroot/proj_1/c/proj_2").is_dir());
    assert!(events.is_empty());
}

#[test]
fn new_cards_use_the_renamed_prefix() {
    let (_dir, root, env, _events) = nested_project();
    rename_project(&env, &root, "proj").unwrap();

    let keys = create_card(&env, &root, "decision", None).unwrap();
    assert_eq!(keys, ["proj_3", "proj_4"]);
}

#[test]
fn invalid_prefix_is_rejected_before_any_change() {
    let (_dir, root, env, _events) = nested_project();
    let err = rename_project(&env, &root, "X").unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err}");
    assert!(root.join("cardroot/demo_1").is_dir());
    assert_eq!(env.project(&root).unwrap().prefix(), "demo");
}

// Project prefix `abc`, rooted in a directory that is itself named like a key.
fn three_level_project() -> (TempDir, PathBuf, StoreEnv) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("abc_1");
    let env = StoreEnv::new().expect("env");

    create_project(&env, &root, "abc", "Abc").unwrap();
    create_workflow(&env, &root, "simple", None).unwrap();
    create_card_type(&env, &root, "task", "simple").unwrap();
    create_template(&env, &root, "chain", None).unwrap();
    for parent in [None, Some("abc_1"), Some("abc_2")] {
        add_cards(
            &env,
            &root,
            AddCardsOptions {
                card_type: "task".into(),
                template: "chain".into(),
                parent_card_key: parent.map(str::to_string),
                count: 1,
            },
        )
        .unwrap();
    }
    let keys = create_card(&env, &root, "chain", None).unwrap();
    assert_eq!(keys, ["abc_1", "abc_2", "abc_3"]);
    (dir, root, env)
}

fn card_key_dirs(root: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                names.push(path.file_name().unwrap().to_string_lossy().into_owned());
                pending.push(path);
            }
        }
    }
    names
}

#[test]
fn grandchildren_are_renamed_below_renamed_parents() {
    let (_dir, root, env) = three_level_project();

    let result = rename_project(&env, &root, "xyz").unwrap();
    assert_eq!(result.cards, 6);

    let parent = root.join("cardroot/xyz_1");
    let child = parent.join("c/xyz_2");
    let grandchild = child.join("c/xyz_3");
    for card in [&parent, &child, &grandchild] {
        assert!(card.join("index.json").is_file(), "{}", card.display());
        assert!(card.join("index.adoc").is_file(), "{}", card.display());
    }
    let blueprints = root.join(".cards/local/templates/chain/c");
    assert!(blueprints.join("xyz_1/c/xyz_2/c/xyz_3").is_dir());

    let leftovers: Vec<String> = card_key_dirs(&root.join("cardroot"))
        .into_iter()
        .chain(card_key_dirs(&blueprints))
        .filter(|name| name.starts_with("abc_"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn ancestor_named_exactly_like_a_key_is_left_alone() {
    let (_dir, root, env) = three_level_project();
    create_attachment(
        &env,
        &root,
        "abc_1",
        Path::new("abc_1-abc_1.txt"),
        Some(b"notes"),
    )
    .unwrap();

    rename_project(&env, &root, "xyz").unwrap();

    assert!(root.join("cardroot/xyz_1").is_dir(), "project root must keep its name");
    // Only the last key occurrence in an attachment name is renamed.
    assert!(root.join("cardroot/xyz_1/a/abc_1-xyz_1.txt").is_file());
    let report = validate_project(&env, &root).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[test]
fn interrupted_rename_completes_on_retry() {
    let (_dir, root, env, events) = nested_project();
    let blocker = root.join("cardroot/proj_1");
    fs::create_dir(&blocker).unwrap();

    let err = rename_project(&env, &root, "proj").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "{err}");
    assert_eq!(env.project(&root).unwrap().prefix(), "proj");
    assert!(root.join("cardroot/demo_1/c/proj_2").is_dir());
    assert!(events.is_empty());

    fs::remove_dir(&blocker).unwrap();
    let retry = rename_project(&env, &root, "proj").unwrap();
    assert_eq!(retry.from, "demo");
    assert_eq!(retry.cards, 3);

    assert!(!root.join("cardroot/demo_1").exists());
    let parent = root.join("cardroot/proj_1");
    assert!(parent.join("c/proj_2/a/proj_2-diagram.png").is_file());
    assert_eq!(metadata(&parent)["links"][0]["cardKey"], "proj_2");
    assert!(
        root.join(".cards/local/templates/decision/c/proj_1/c/proj_2")
            .is_dir()
    );
    assert_eq!(events.drain().len(), 1);

    let keys = create_card(&env, &root, "decision", None).unwrap();
    assert_eq!(keys, ["proj_3", "proj_4"]);
    let report = validate_project(&env, &root).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}
