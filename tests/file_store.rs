use serde_json::{Map, Value, json};

use paramstore::constants::DEFAULT_FRAME_SIZE;
use paramstore::{
    Action, FileParameterStore, ParameterGroup, ParameterSet, ParameterStore, Parameters,
    StoreError, open_store,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn action(id: &str) -> Action {
    Action::new("pseudonymize", id.as_bytes(), "pseudonymize")
        .with_config(object(json!({"key": "h1"})))
}

fn group(hash: &[u8]) -> ParameterGroup {
    ParameterGroup::with_hash(hash, Map::new())
}

#[test]
fn fresh_instance_reads_back_saved_parameters() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let id: Vec<u8> = (0x01..=0x10).collect();

    {
        let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");
        let parameters =
            Parameters::with_id(id.clone(), action("A"), group(b"g1"), Some(json!({"x": 1})));
        assert!(store.save_parameters(&parameters).expect("save"));
    }

    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("reopen");
    let found = store
        .parameters_by_id(&id)
        .expect("lookup")
        .expect("parameters present");
    assert_eq!(found.id(), id.as_slice());
    assert_eq!(found.parameters(), Some(&json!({"x": 1})));
    assert_eq!(found.action().id(), b"A");
    assert_eq!(found.parameter_group().hash(), b"g1");
    assert_eq!(found.parameter_store(), Some(store.id()));

    let by_key = store
        .parameters(&action("A"), &group(b"g1"))
        .expect("lookup by key");
    assert_eq!(by_key, Some(found));
}

#[test]
fn cut_off_tail_does_not_hide_earlier_parameters() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let stored = Parameters::new(action("A"), group(b"g1"), Some(json!({"x": 1})));
    {
        let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");
        assert!(store.save_parameters(&stored).expect("save"));
    }
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open for append");
        // First bytes of a frame whose writer has not finished.
        file.write_all(&[1, 3, 0]).expect("append");
    }
    let len = std::fs::metadata(&path).expect("stat").len();

    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("reopen");
    let found = store
        .parameters_by_id(stored.id())
        .expect("lookup")
        .expect("parameters before the cut are visible");
    assert_eq!(found, stored);
    assert_eq!(store.log_stats().expect("stats").truncated_at, Some(len - 3));

    let rival = Parameters::new(action("A"), group(b"g1"), Some(json!({"x": 2})));
    assert!(!store.save_parameters(&rival).expect("save for a taken key"));
    assert_eq!(std::fs::metadata(&path).expect("stat").len(), len);
}

#[test]
fn saved_parameters_are_visible_immediately() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");

    // Large enough to span many frames.
    let payload = json!({"salt": "s".repeat(500)});
    let parameters = Parameters::new(action("A"), group(b"g1"), Some(payload));
    assert!(store.save_parameters(&parameters).expect("save"));

    let stats = store.log_stats().expect("stats");
    assert_eq!(stats.pending_frames, 0);
    let found = store.parameters_by_id(parameters.id()).expect("lookup");
    assert_eq!(found, Some(parameters));
}

#[test]
fn second_parameters_for_same_tuple_are_not_saved() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");

    let first = Parameters::new(action("A"), group(b"g1"), Some(json!(1)));
    let second = Parameters::new(action("A"), group(b"g1"), Some(json!(2)));
    assert!(store.save_parameters(&first).expect("save first"));
    let len = std::fs::metadata(&path).expect("stat").len();

    assert!(!store.save_parameters(&second).expect("save second"));
    assert!(!store.save_parameters(&first).expect("save first again"));
    assert_eq!(std::fs::metadata(&path).expect("stat").len(), len);

    let current = store
        .parameters(&action("A"), &group(b"g1"))
        .expect("lookup")
        .expect("present");
    assert_eq!(current.id(), first.id());

    // A different group is a different tuple.
    let other = Parameters::new(action("A"), group(b"g2"), None);
    assert!(store.save_parameters(&other).expect("save other"));
    assert_eq!(store.all_parameters().expect("all").len(), 2);
}

#[test]
fn parameter_sets_are_content_addressed() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");

    let a = Parameters::new(action("A"), group(b"g1"), Some(json!({"x": 1})));
    let b = Parameters::new(action("B"), group(b"g1"), Some(json!({"y": 2})));
    store.save_parameters(&a).expect("save a");
    store.save_parameters(&b).expect("save b");

    let set = ParameterSet::new(vec![a.clone(), b.clone()]).expect("set");
    assert!(store.save_parameter_set(&set).expect("save set"));
    let len = std::fs::metadata(&path).expect("stat").len();

    let same = ParameterSet::new(vec![b, a]).expect("same set");
    assert!(!store.save_parameter_set(&same).expect("save same set"));
    assert_eq!(std::fs::metadata(&path).expect("stat").len(), len);

    let reopened = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("reopen");
    let found = reopened
        .parameter_set(set.hash())
        .expect("lookup")
        .expect("set present");
    assert_eq!(found, set);
    assert_eq!(found.parameter_store(), Some(reopened.id()));
    assert_eq!(reopened.all_parameter_sets().expect("all sets").len(), 1);
}

#[test]
fn delete_only_affects_the_local_index() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");

    let parameters = Parameters::new(action("A"), group(b"g1"), None);
    store.save_parameters(&parameters).expect("save");
    let set = ParameterSet::new(vec![parameters.clone()]).expect("set");
    store.save_parameter_set(&set).expect("save set");

    assert!(store.delete_parameters(&parameters).expect("delete"));
    assert!(store.delete_parameter_set(set.hash()).expect("delete set"));
    assert_eq!(store.parameters_by_id(parameters.id()).expect("lookup"), None);
    assert_eq!(store.parameter_set(set.hash()).expect("lookup set"), None);

    let reopened = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("reopen");
    assert_eq!(
        reopened.parameters_by_id(parameters.id()).expect("lookup"),
        Some(parameters)
    );
    assert!(reopened.parameter_set(set.hash()).expect("lookup set").is_some());
}

#[test]
fn lookups_require_an_action_id() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let store = FileParameterStore::open(&path, DEFAULT_FRAME_SIZE, Map::new()).expect("open");
    let err = store.parameters(&action(""), &group(b"g1")).unwrap_err();
    assert!(matches!(err, StoreError::MissingId { .. }));
}

#[test]
fn custom_frame_size_round_trips() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("params.log");
    let payload = json!({"x": "y".repeat(300)});
    let parameters = Parameters::new(action("A"), group(b"g1"), Some(payload));
    {
        let store = FileParameterStore::open(&path, 4096, Map::new()).expect("open");
        store.save_parameters(&parameters).expect("save");
    }
    let store = FileParameterStore::open(&path, 4096, Map::new()).expect("reopen");
    assert_eq!(
        store.parameters_by_id(parameters.id()).expect("lookup"),
        Some(parameters)
    );
}

#[test]
fn factory_opens_a_shared_file_store() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("nested").join("params.log");
    let config = json!({
        "type": "file",
        "filename": path,
        "format": "json",
        "in-memory-config": {},
    });

    let writer = open_store(&config).expect("open writer");
    let reader = open_store(&config).expect("open reader");
    assert_ne!(writer.id(), reader.id());

    let parameters = Parameters::new(action("A"), group(b"g1"), Some(json!(true)));
    assert!(writer.save_parameters(&parameters).expect("save"));
    let found = reader
        .parameters_by_id(parameters.id())
        .expect("lookup")
        .expect("visible to the second store");
    assert_eq!(found.parameter_store(), Some(reader.id()));
}

#[test]
fn factory_defaults_to_memory() {
    let store = open_store(&Value::Null).expect("open");
    let parameters = Parameters::new(action("A"), group(b"g1"), None);
    assert!(store.save_parameters(&parameters).expect("save"));
    assert_eq!(store.all_parameters().expect("all"), vec![parameters]);
}
