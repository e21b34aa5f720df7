use crate::{KeyValueStore, KvStoreError, MemoryKvStore, WriteOp};
use std::sync::Arc;

#[test]
fn basic() {
    let store = MemoryKvStore::new();

    assert_eq!(store.get("a", b"key").unwrap(), None);
    assert!(!store.delete("a", b"key").unwrap());

    store.put("a", b"key", b"value").unwrap();
    assert_eq!(store.get("a", b"key").unwrap(), Some(b"value".to_vec()));
    // Tables are independent
    assert_eq!(store.get("b", b"key").unwrap(), None);

    store.put("a", b"key", b"other").unwrap();
    assert_eq!(store.get("a", b"key").unwrap(), Some(b"other".to_vec()));

    assert!(store.delete("a", b"key").unwrap());
    assert_eq!(store.get("a", b"key").unwrap(), None);
}

#[test]
fn scan_prefix() {
    let store = MemoryKvStore::new();
    store.put("t", b"ab2", b"2").unwrap();
    store.put("t", b"ab1", b"1").unwrap();
    store.put("t", b"ac", b"3").unwrap();
    store.put("t", b"a", b"0").unwrap();

    let entries = store.scan_prefix("t", b"ab").unwrap();
    assert_eq!(
        entries,
        vec![
            (b"ab1".to_vec(), b"1".to_vec()),
            (b"ab2".to_vec(), b"2".to_vec())
        ]
    );
    assert_eq!(store.entries("t").unwrap().len(), 4);
    assert!(store.entries("missing").unwrap().is_empty());
}

#[test]
fn write_batch() {
    let store = MemoryKvStore::new();
    store.put("t", b"gone", b"x").unwrap();

    store
        .write(vec![
            WriteOp::Put {
                table: "t".to_string(),
                key: b"new".to_vec(),
                value: b"y".to_vec(),
            },
            WriteOp::Delete {
                table: "t".to_string(),
                key: b"gone".to_vec(),
            },
            WriteOp::Delete {
                table: "missing".to_string(),
                key: b"gone".to_vec(),
            },
        ])
        .unwrap();

    assert_eq!(store.get("t", b"new").unwrap(), Some(b"y".to_vec()));
    assert_eq!(store.get("t", b"gone").unwrap(), None);
}

#[test]
fn unavailable() {
    let store = Arc::new(MemoryKvStore::new());
    store.put("t", b"k", b"v").unwrap();

    store.set_available(false);
    assert!(matches!(
        store.get("t", b"k"),
        Err(KvStoreError::Unavailable)
    ));
    assert!(matches!(
        store.put("t", b"k", b"v"),
        Err(KvStoreError::Unavailable)
    ));
    assert!(store.write(Vec::new()).is_err());

    store.set_available(true);
    assert_eq!(store.get("t", b"k").unwrap(), Some(b"v".to_vec()));
}
