use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cardstore::{
    AddCardsOptions, EventQueue, FetchCardDetails, LinkOptions, StoreEnv, StoreError, StoreEvent,
    add_cards, create_card, create_card_type, create_link_type, create_project, create_template,
    create_template_link, create_workflow,
};
use serde_json::Value;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    env: StoreEnv,
    events: Arc<EventQueue>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("project");
    let events = Arc::new(EventQueue::new());
    let env = StoreEnv::with_events(events.clone()).expect("env");
    create_project(&env, &root, "demo", "Demo").unwrap();
    create_workflow(&env, &root, "simple", None).unwrap();
    create_card_type(&env, &root, "task", "simple").unwrap();
    create_template(&env, &root, "decision", None).unwrap();
    Fixture {
        _dir: dir,
        root,
        env,
        events,
    }
}

fn add(fixture: &Fixture, parent: Option<&str>, count: usize) -> Result<Vec<String>, StoreError> {
    add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "decision".into(),
            parent_card_key: parent.map(str::to_string),
            count,
        },
    )
    .map(|result| result.cards)
}

fn metadata(card_dir: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(card_dir.join("index.json")).unwrap()).unwrap()
}

#[test]
fn two_blueprints_become_two_live_cards_in_initial_state() {
    let fixture = fixture();

    let result = add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "decision".into(),
            parent_card_key: None,
            count: 2,
        },
    )
    .unwrap();
    let mut added = result.cards.clone();
    added.sort();
    assert_eq!(added, ["demo_1", "demo_2"]);
    assert_eq!(result.message, "Added 2 cards to template 'decision'");
    assert!(result.failures.is_empty());

    let keys = create_card(&fixture.env, &fixture.root, "decision", None).unwrap();
    assert_eq!(keys, ["demo_1", "demo_2"]);
    for key in &keys {
        let card = fixture.root.join("cardroot").join(key);
        let value = metadata(&card);
        assert_eq!(value["cardType"], "task");
        assert_eq!(value["workflowState"], "Draft");
        assert!(value["lastUpdated"].is_string());
        assert!(card.join("index.adoc").is_file());
    }

    let events = fixture.events.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        StoreEvent::Created { cards } => {
            let created: Vec<_> = cards.iter().map(|card| card.key.as_str()).collect();
            assert_eq!(created, ["demo_1", "demo_2"]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn every_instantiation_gets_fresh_keys() {
    let fixture = fixture();
    add(&fixture, None, 3).unwrap();

    let mut seen = HashSet::new();
    for _ in 0..3 {
        let keys = create_card(&fixture.env, &fixture.root, "decision", None).unwrap();
        assert_eq!(keys.len(), 3);
        for key in keys {
            assert!(seen.insert(key.clone()), "duplicate key {key}");
        }
    }

    let project = fixture.env.project(&fixture.root).unwrap();
    assert_eq!(project.configuration().next_available_card_number, 10);
    let live = project.list_cards(FetchCardDetails::metadata()).unwrap();
    assert_eq!(live.len(), 9);
    let ranks: Vec<_> = live
        .iter()
        .map(|card| card.metadata.as_ref().unwrap().rank.clone())
        .collect();
    let unique: HashSet<_> = ranks.iter().collect();
    assert_eq!(unique.len(), ranks.len());
}

#[test]
fn nested_blueprints_keep_their_shape() {
    let fixture = fixture();
    add(&fixture, None, 2).unwrap();
    let child = add(&fixture, Some("demo_1"), 1).unwrap();
    assert_eq!(child, ["demo_3"]);
    assert!(
        fixture
            .root
            .join(".cards/local/templates/decision/c/demo_1/c/demo_3/index.json")
            .is_file()
    );

    let keys = create_card(&fixture.env, &fixture.root, "decision", None).unwrap();
    assert_eq!(keys, ["demo_1", "demo_2", "demo_3"]);
    let cardroot = fixture.root.join("cardroot");
    assert!(cardroot.join("demo_1/c/demo_2").is_dir());
    assert!(cardroot.join("demo_3").is_dir());

    let under_parent =
        create_card(&fixture.env, &fixture.root, "decision", Some("demo_3")).unwrap();
    assert_eq!(under_parent, ["demo_4", "demo_5", "demo_6"]);
    assert!(cardroot.join("demo_3/c/demo_4/c/demo_5").is_dir());
    assert!(cardroot.join("demo_3/c/demo_6").is_dir());
}

#[test]
fn blueprint_links_follow_new_keys_and_content_is_copied() {
    let fixture = fixture();
    add(&fixture, None, 2).unwrap();
    create_link_type(&fixture.env, &fixture.root, "relates", None).unwrap();
    create_template_link(
        &fixture.env,
        &fixture.root,
        "decision",
        LinkOptions {
            from_key: "demo_1".into(),
            to_key: "demo_2".into(),
            link_type: "relates".into(),
            description: None,
        },
    )
    .unwrap();
    fs::write(
        fixture
            .root
            .join(".cards/local/templates/decision/c/demo_1/index.adoc"),
        "Depends on <<demo_2>>, see also <<demo_1>>.",
    )
    .unwrap();

    create_card(&fixture.env, &fixture.root, "decision", None).unwrap();
    let keys = create_card(&fixture.env, &fixture.root, "decision", None).unwrap();
    assert_eq!(keys, ["demo_3", "demo_4"]);

    let card = fixture.root.join("cardroot/demo_3");
    assert_eq!(metadata(&card)["links"][0]["cardKey"], "demo_4");
    // Live demo_1 and demo_2 exist as well, so content keeps its original text.
    assert_eq!(
        fs::read_to_string(card.join("index.adoc")).unwrap(),
        "Depends on <<demo_2>>, see also <<demo_1>>."
    );
}

#[test]
fn single_add_uses_singular_message() {
    let fixture = fixture();
    let result = add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "decision".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap();
    assert_eq!(result.message, "Added 1 card to template 'decision'");
}

#[test]
fn add_cards_rejects_bad_requests() {
    let fixture = fixture();

    assert!(matches!(add(&fixture, None, 0), Err(StoreError::InvalidInput(_))));
    assert!(matches!(
        add(&fixture, Some("demo_9"), 1),
        Err(StoreError::NotFound(_))
    ));

    let err = add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "missing".into(),
            template: "decision".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let err = add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "nothing".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let module_template = fixture.root.join(".cards/modules/base/templates/epic");
    fs::create_dir_all(module_template.join("c")).unwrap();
    fs::write(
        module_template.join("template.json"),
        r#"{"buttonLabel":"Epic","namePrompt":"Name"}"#,
    )
    .unwrap();
    let err = add_cards(
        &fixture.env,
        &fixture.root,
        AddCardsOptions {
            card_type: "task".into(),
            template: "base/epic".into(),
            parent_card_key: None,
            count: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)), "{err}");
}

#[test]
fn create_card_preconditions() {
    let fixture = fixture();

    let err = create_card(&fixture.env, &fixture.root, "decision", None).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)), "{err}");

    add(&fixture, None, 1).unwrap();
    let err = create_card(&fixture.env, &fixture.root, "unknown", None).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");
    let err = create_card(&fixture.env, &fixture.root, "decision", Some("demo_5")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    fs::write(
        fixture
            .root
            .join(".cards/local/templates/decision/template.json"),
        r#"{"buttonLabel":""}"#,
    )
    .unwrap();
    let err = create_card(&fixture.env, &fixture.root, "decision", None).unwrap_err();
    assert!(matches!(err, StoreError::SchemaViolation { .. }), "{err}");

    let err = create_card(&fixture.env, fixture.root.join("cardroot"), "decision", None)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotAProject(_)), "{err}");
    assert!(fixture.events.is_empty());
}
