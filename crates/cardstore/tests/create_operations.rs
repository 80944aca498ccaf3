use std::fs;
use std::path::PathBuf;

use cardstore::schema::{CARD_TYPE_SCHEMA, FIELD_TYPE_SCHEMA, LINK_TYPE_SCHEMA, WORKFLOW_SCHEMA};
use cardstore::{
    AddCardsOptions, Project, StoreEnv, StoreError, add_cards, create_attachment, create_card,
    create_card_type, create_field_type, create_link_type, create_project, create_template,
    create_workflow, supported_field_data_types, validate_project, validate_project_shape,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn make_project() -> (TempDir, PathBuf, StoreEnv) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("project");
    let env = StoreEnv::new().expect("env");
    create_project(&env, &root, "demo", "Demo").expect("create project");
    (dir, root, env)
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn created_project_has_expected_shape() {
    let (_dir, root, env) = make_project();

    assert!(Project::is_created(&root));
    let config = read_json(&root.join(".cards/local/cardsConfig.json"));
    assert_eq!(config["cardKeyPrefix"], "demo");
    assert_eq!(config["name"], "Demo");
    assert_eq!(config["nextAvailableCardNumber"], 1);

    assert!(root.join("cardroot/.gitkeep").is_file());
    assert!(root.join(".cards/local/calculations/.gitkeep").is_file());
    assert!(root.join(".cards/local/cardtypes/.schema").is_file());
    let ignore = fs::read_to_string(root.join(".gitignore")).unwrap();
    assert!(ignore.lines().any(|line| line == ".calc"));

    assert_eq!(validate_project_shape(&root).unwrap(), Vec::<String>::new());

    let project = env.project(&root).unwrap();
    assert_eq!(project.prefix(), "demo");
    assert_eq!(project.name(), "Demo");
}

#[test]
fn creating_a_project_twice_fails() {
    let (_dir, root, env) = make_project();
    let err = create_project(&env, &root, "other", "Other").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "{err}");
    assert_eq!(env.project(&root).unwrap().prefix(), "demo");
}

#[test]
fn invalid_prefix_creates_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = StoreEnv::new().unwrap();
    let root = dir.path().join("project");
    for prefix in ["ab", "Demo", "demo1", "abcdefghijk"] {
        let err = create_project(&env, &root, prefix, "Demo").unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)), "{prefix}: {err}");
    }
    assert!(!root.exists());
}

#[test]
fn operations_on_a_plain_directory_report_not_a_project() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = StoreEnv::new().unwrap();
    let err = create_card_type(&env, dir.path(), "task", "simple").unwrap_err();
    assert!(matches!(err, StoreError::NotAProject(_)), "{err}");
}

#[test]
fn resources_are_unique_and_schema_valid() {
    let (_dir, root, env) = make_project();

    let workflow = create_workflow(&env, &root, "simple", None).unwrap();
    let err = create_workflow(&env, &root, "simple", None).unwrap_err();
    assert!(err.to_string().contains("already exists"), "{err}");

    let card_type = create_card_type(&env, &root, "task", "simple").unwrap();
    let err = create_card_type(&env, &root, "task", "simple").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    let link_type = create_link_type(&env, &root, "relates", None).unwrap();
    let field_type = create_field_type(&env, &root, "effort", "integer").unwrap();

    for (path, schema) in [
        (workflow, WORKFLOW_SCHEMA),
        (card_type, CARD_TYPE_SCHEMA),
        (link_type, LINK_TYPE_SCHEMA),
        (field_type, FIELD_TYPE_SCHEMA),
    ] {
        let violations = env.validator.validate(&read_json(&path), schema).unwrap();
        assert!(violations.is_empty(), "{}: {violations:?}", path.display());
    }

    let project = env.project(&root).unwrap();
    assert_eq!(project.card_type("task").unwrap().workflow, "simple");
    assert_eq!(project.initial_workflow_state("task").unwrap(), "Draft");
}

#[test]
fn card_type_requires_an_existing_workflow() {
    let (_dir, root, env) = make_project();
    let err = create_card_type(&env, &root, "task", "missing").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");
    assert!(!root.join(".cards/local/cardtypes/task.json").exists());
}

#[test]
fn field_types_accept_exactly_the_schema_data_types() {
    let (_dir, root, env) = make_project();

    let supported = supported_field_data_types(env.validator.as_ref()).unwrap();
    assert!(supported.contains(&"shortText".to_string()));
    for (index, data_type) in supported.iter().enumerate() {
        create_field_type(&env, &root, &format!("field{index}"), data_type).unwrap();
    }

    let err = create_field_type(&env, &root, "blob", "binary").unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err}");
}

#[test]
fn resource_content_is_validated_and_named() {
    let (_dir, root, env) = make_project();

    let path = create_link_type(
        &env,
        &root,
        "blocks",
        Some(json!({
            "name": "ignored",
            "outboundDisplayName": "blocks",
            "inboundDisplayName": "is blocked by",
            "sourceCardTypes": [],
            "destinationCardTypes": [],
            "enableLinkDescription": true
        })),
    )
    .unwrap();
    let written = read_json(&path);
    assert_eq!(written["name"], "blocks");
    assert_eq!(written["inboundDisplayName"], "is blocked by");

    let err = create_workflow(&env, &root, "broken", Some(json!({ "states": [] }))).unwrap_err();
    match err {
        StoreError::SchemaViolation { violations, .. } => assert!(!violations.is_empty()),
        other => panic!("unexpected error {other}"),
    }
    assert!(!root.join(".cards/local/workflows/broken.json").exists());

    let err = create_link_type(&env, &root, "../escape", None).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err}");
}

#[test]
fn templates_are_created_once() {
    let (_dir, root, env) = make_project();

    let name = create_template(&env, &root, "local/decision", None).unwrap();
    assert_eq!(name, "decision");
    let descriptor = read_json(&root.join(".cards/local/templates/decision/template.json"));
    assert_eq!(descriptor["buttonLabel"], "Button");
    assert!(root.join(".cards/local/templates/decision/c").is_dir());

    let err = create_template(&env, &root, "decision", None).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "{err}");

    let err = create_template(&env, &root, " ", None).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err}");

    let err = create_template(&env, &root, "other", Some(json!({ "buttonLabel": "Go" })))
        .unwrap_err();
    assert!(matches!(err, StoreError::SchemaViolation { .. }), "{err}");

    let err = create_template(&env, &root, "base/epic", None).unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)), "{err}");
}

#[test]
fn attachments_are_never_overwritten() {
    let (dir, root, env) = make_project();
    create_workflow(&env, &root, "simple", None).unwrap();
    create_card_type(&env, &root, "task", "simple").unwrap();
    create_template(&env, &root, "decision", None).unwrap();
    add_cards(
        &env,
        &root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "decision".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap();
    let keys = create_card(&env, &root, "decision", None).unwrap();
    assert_eq!(keys, ["demo_1"]);

    let stored = create_attachment(
        &env,
        &root,
        "demo_1",
        std::path::Path::new("notes.txt"),
        Some(b"first"),
    )
    .unwrap();
    assert_eq!(stored, root.join("cardroot/demo_1/a/notes.txt"));
    assert_eq!(fs::read_to_string(&stored).unwrap(), "first");

    let err = create_attachment(
        &env,
        &root,
        "demo_1",
        std::path::Path::new("notes.txt"),
        Some(b"second"),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)), "{err}");
    assert_eq!(fs::read_to_string(&stored).unwrap(), "first");

    let source = dir.path().join("diagram.png");
    fs::write(&source, [1u8, 2, 3]).unwrap();
    let copied = create_attachment(&env, &root, "demo_1", &source, None).unwrap();
    assert_eq!(fs::read(copied).unwrap(), [1u8, 2, 3]);

    let err =
        create_attachment(&env, &root, "demo_42", &source, None).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let missing = dir.path().join("missing.png");
    let err = create_attachment(&env, &root, "demo_1", &missing, None).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let report = validate_project(&env, &root).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[test]
fn module_cards_reject_attachments() {
    let (dir, root, env) = make_project();
    let card = root.join(".cards/modules/base/templates/epic/c/base_1");
    fs::create_dir_all(&card).unwrap();
    fs::write(
        card.join("index.json"),
        r#"{"cardType":"base/task","title":"T","workflowState":"Draft","rank":"0|a"}"#,
    )
    .unwrap();

    let source = dir.path().join("notes.txt");
    fs::write(&source, "x").unwrap();
    let err = create_attachment(&env, &root, "base_1", &source, None).unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)), "{err}");
    assert!(!card.join("a").exists());
}

#[test]
fn broken_card_directories_fail_validation() {
    let (_dir, root, env) = make_project();
    create_workflow(&env, &root, "simple", None).unwrap();
    create_card_type(&env, &root, "task", "simple").unwrap();
    create_template(&env, &root, "decision", None).unwrap();
    add_cards(
        &env,
        &root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "decision".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap();
    create_card(&env, &root, "decision", None).unwrap();
    assert!(validate_project(&env, &root).unwrap().is_valid());

    let card = root.join("cardroot/demo_1");
    fs::remove_file(card.join("index.adoc")).unwrap();
    fs::write(card.join("junk.exe"), "x").unwrap();
    fs::create_dir(card.join("zzz")).unwrap();
    fs::create_dir(root.join("cardroot/demo_7")).unwrap();
    fs::remove_file(root.join(".cards/local/templates/decision/c/demo_1/index.adoc")).unwrap();

    let violations = validate_project(&env, &root).unwrap().violations;
    for expected in [
        "demo_1/index.adoc",
        "demo_1/junk.exe",
        "demo_1/zzz",
        "demo_7/index.json",
        "decision/c/demo_1/index.adoc",
    ] {
        assert!(
            violations.iter().any(|v| v.ends_with(expected)),
            "{expected} not reported in {violations:?}"
        );
    }
}
