//! On-disk libraries: reopen, locking, torn journal tails and compaction.

#![cfg(feature = "persistent")]

use std::fs;
use std::path::Path;

use hylladb::hyql::{BuildSection, BuildShelf, CheckOut, CheckOutItem, Remove, Transaction, Write};
use hylladb::schema::{FieldType, Schema};
use hylladb::storage::persistent::JOURNAL_FILE;
use hylladb::storage::StorageError;
use hylladb::{HyllaError, Library, PersistentConfig, Record, Value};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open(dir: &Path) -> Library {
    let config = PersistentConfig {
        sync_on_write: false,
        ..PersistentConfig::default()
    };
    Library::open(dir, Some(config)).unwrap()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn read(lib: &Library, path: &str) -> Record {
    let query = CheckOut::builder()
        .item(CheckOutItem::all(path).unwrap())
        .build()
        .unwrap();
    let mut rows = lib.checkout(&query).unwrap().rows;
    assert_eq!(rows.len(), 1, "{path} should name one shelf");
    rows.remove(0).data
}

#[test]
fn reopen_keeps_namespace_catalog_and_shelves() {
    init_tracing();
    let dir = tempdir().unwrap();
    let animal = Schema::builder("Animal")
        .field("age", FieldType::Int)
        .build()
        .unwrap();
    {
        let mut lib = open(dir.path());
        lib.execute(
            BuildSection::new(None, "zoo")
                .unwrap()
                .with_schema(animal.clone())
                .with_metadata(record(&[("keeper", "Sam".into())])),
        )
        .unwrap();
        lib.execute(BuildShelf::new(Some("zoo"), "rex").unwrap()).unwrap();
        lib.execute(Write::new("zoo.rex", record(&[("age", 4.into())])).unwrap())
            .unwrap();
        lib.close().unwrap();
    }

    let lib = open(dir.path());
    assert_eq!(lib.dir(), Some(dir.path()));
    assert!(lib.namespace().get("zoo").unwrap().is_section());
    assert!(lib.namespace().get("zoo.rex").unwrap().is_shelf());
    assert_eq!(lib.catalog().bound_schema(Some("zoo")), Some(&animal));
    assert_eq!(
        lib.catalog().section_metadata("zoo").unwrap()["keeper"],
        Value::from("Sam")
    );
    assert_eq!(read(&lib, "zoo.rex")["age"], Value::Int(4));
}

#[test]
fn second_handle_is_locked_out() {
    let dir = tempdir().unwrap();
    let first = open(dir.path());
    let err = Library::open(dir.path(), None).unwrap_err();
    assert!(matches!(err, HyllaError::Storage(StorageError::Locked(_))));

    drop(first);
    let _second = open(dir.path());
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let config = PersistentConfig {
        max_journal_size: 1,
        ..PersistentConfig::default()
    };
    assert!(Library::open(dir.path(), Some(config)).unwrap_err().is_validation());
}

#[test]
fn torn_journal_tail_drops_only_the_last_change() {
    init_tracing();
    let dir = tempdir().unwrap();
    {
        let mut lib = open(dir.path());
        for i in 0..5 {
            lib.execute(BuildShelf::new(None, &format!("s{i}")).unwrap()).unwrap();
        }
        // Dropped rather than closed: the journal is left uncompacted.
    }

    let journal = dir.path().join(JOURNAL_FILE);
    let len = fs::metadata(&journal).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&journal).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let mut lib = open(dir.path());
    assert_eq!(lib.namespace().len(), 4);
    assert!(!lib.namespace().contains("s4"));
    assert!(fs::metadata(&journal).unwrap().len() < len);

    // The lost key can be built again.
    lib.execute(BuildShelf::new(None, "s4").unwrap()).unwrap();
    assert_eq!(lib.namespace().len(), 5);
}

#[test]
fn close_compacts_the_journal() {
    let dir = tempdir().unwrap();
    let journal = dir.path().join(JOURNAL_FILE);
    let before_close = {
        let mut lib = open(dir.path());
        for i in 0..40 {
            let name = format!("tmp{i}");
            lib.execute(BuildShelf::new(None, &name).unwrap()).unwrap();
            lib.execute(Remove::shelf(&name).unwrap()).unwrap();
        }
        lib.execute(BuildShelf::new(None, "kept").unwrap()).unwrap();
        let size = fs::metadata(&journal).unwrap().len();
        lib.close().unwrap();
        size
    };
    assert!(fs::metadata(&journal).unwrap().len() < before_close);

    let lib = open(dir.path());
    assert_eq!(lib.namespace().len(), 1);
    assert!(lib.namespace().contains("kept"));
}

#[test]
fn rolled_back_transaction_leaves_nothing_on_disk() {
    let dir = tempdir().unwrap();
    {
        let mut lib = open(dir.path());
        lib.execute(BuildSection::new(None, "zoo").unwrap()).unwrap();
        lib.execute(BuildShelf::new(Some("zoo"), "rex").unwrap()).unwrap();
        lib.execute(Write::new("zoo.rex", record(&[("age", 4.into())])).unwrap())
            .unwrap();

        let tx = Transaction::new(vec![
            BuildShelf::new(Some("zoo"), "kit").unwrap().into(),
            Remove::shelf("zoo.rex").unwrap().into(),
            Remove::shelf("zoo.missing").unwrap().into(),
        ])
        .unwrap();
        assert!(lib.execute(tx).unwrap_err().is_resolution());
        assert!(!lib.is_poisoned());
        lib.close().unwrap();
    }

    let lib = open(dir.path());
    assert!(!lib.namespace().contains("zoo.kit"));
    assert_eq!(read(&lib, "zoo.rex")["age"], Value::Int(4));
}
