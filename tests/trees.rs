//! Tree registry over a real migrations folder.

use std::fs;

use revision_kernel::{FsScriptStore, Location, MigrationTrees, OneShotTree, UsageError};
use tempfile::TempDir;

const FOLDERS: &[&str] = &[
    "_engine",
    "_oneshot/datasets/migration1",
    "_oneshot/datasets/migration2",
    "_oneshot/dimensions/mig1",
    "_oneshot/dimensions/mig2",
    "collections/m1",
    "collections/m2",
    "datasets/m1",
    "dimensions/m1",
];

fn make_migrations() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for folder in FOLDERS {
        fs::create_dir_all(dir.path().join(folder)).unwrap();
    }
    dir
}

fn loc(path: &str) -> Location {
    Location::new(path.split('/'))
}

#[test]
fn test_regular_trees() {
    let dir = make_migrations();
    let store = FsScriptStore::new(dir.path());
    let trees = MigrationTrees::new(&store);

    assert_eq!(trees.engine_location(), loc("_engine"));
    assert_eq!(trees.regular_location("managerA"), loc("managerA"));
    assert_eq!(
        store.path_of(&trees.regular_location("managerA")),
        dir.path().join("managerA")
    );

    let regular = trees.list_regular_trees().unwrap();
    assert_eq!(
        regular.into_iter().collect::<Vec<_>>(),
        vec![
            ("collections".to_string(), loc("collections")),
            ("datasets".to_string(), loc("datasets")),
            ("dimensions".to_string(), loc("dimensions")),
        ]
    );
}

#[test]
fn test_one_shot_trees() {
    let dir = make_migrations();
    let store = FsScriptStore::new(dir.path());
    let trees = MigrationTrees::new(&store);

    let all = trees.list_one_shot_trees(None).unwrap();
    assert_eq!(
        all.keys().collect::<Vec<_>>(),
        vec!["datasets/migration1", "datasets/migration2", "dimensions/mig1", "dimensions/mig2"]
    );
    assert_eq!(all["dimensions/mig2"], loc("_oneshot/dimensions/mig2"));

    let datasets = trees.list_one_shot_trees(Some("datasets")).unwrap();
    assert_eq!(datasets.len(), 2);
    assert!(trees.list_one_shot_trees(Some("collections")).unwrap().is_empty());

    // no one-shot container at all
    let empty = tempfile::tempdir().unwrap();
    let empty_store = FsScriptStore::new(empty.path());
    assert!(MigrationTrees::new(&empty_store).list_one_shot_trees(None).unwrap().is_empty());
}

#[test]
fn test_resolve_locations() {
    let dir = make_migrations();
    let store = FsScriptStore::new(dir.path());
    let trees = MigrationTrees::new(&store);

    assert_eq!(
        trees.resolve_locations(None).unwrap(),
        vec![loc("collections"), loc("datasets"), loc("dimensions")]
    );

    let migration1: OneShotTree = "datasets/migration1".parse().unwrap();
    assert_eq!(
        trees.resolve_locations(Some(&migration1)).unwrap(),
        vec![loc("collections"), loc("_oneshot/datasets/migration1"), loc("dimensions")]
    );

    let mig2: OneShotTree = "dimensions/mig2".parse().unwrap();
    let paths: Vec<_> = trees
        .resolve_locations(Some(&mig2))
        .unwrap()
        .iter()
        .map(|location| store.path_of(location))
        .collect();
    assert_eq!(
        paths,
        vec![
            dir.path().join("collections"),
            dir.path().join("datasets"),
            dir.path().join("_oneshot/dimensions/mig2"),
        ]
    );
}

#[test]
fn test_one_shot_addressing_round_trip() {
    let store = FsScriptStore::new("/unused");
    let trees = MigrationTrees::new(&store);

    let location = trees.one_shot_location("datasets", "int_to_uuid").unwrap();
    let tree = location.one_shot_tree().unwrap();
    assert_eq!((tree.component(), tree.name()), ("datasets", "int_to_uuid"));
    assert_eq!(tree.to_string().parse::<OneShotTree>().unwrap(), tree);

    assert!(matches!(
        trees.one_shot_location("datasets", ""),
        Err(UsageError::EmptyTreeName(_))
    ));
    assert!(matches!(
        "datasets".parse::<OneShotTree>(),
        Err(UsageError::MissingTreeSeparator(_))
    ));
    assert_eq!(trees.single_tree_location("datasets/x").unwrap(), loc("_oneshot/datasets/x"));
    assert_eq!(trees.single_tree_location("datasets").unwrap(), loc("datasets"));
}
