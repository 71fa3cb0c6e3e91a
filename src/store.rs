use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

/// The value cell stored under a key. Commands that read a key as a string
/// get the wrong-type error when the payload is a different kind.
#[derive(Clone, Debug, PartialEq)]
pub enum DataEntity {
    Bytes(Bytes),
    // Reserved for list commands; nothing creates one today.
    List(Vec<Bytes>),
}

impl DataEntity {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            DataEntity::Bytes(data) => Some(data),
            DataEntity::List(_) => None,
        }
    }
}

/// One database's keyspace. Cloning shares the underlying map; every
/// operation takes the lock once, so each is atomic with respect to the
/// others and readers never observe a half-applied write.
///
/// Keys are raw bytes. Redis keys are binary safe, so no UTF-8 constraint is
/// imposed here.
#[derive(Clone, Default)]
pub struct Store {
    entries: Arc<RwLock<HashMap<Bytes, DataEntity>>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// Snapshot read. The returned entity is detached from the map; a
    /// concurrent overwrite does not mutate it.
    pub fn get(&self, key: &[u8]) -> Option<DataEntity> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    /// Unconditional upsert. Returns the number of affected keys, which is
    /// always 1; the conditional variants below report 0 on a miss.
    pub fn put(&self, key: Bytes, entity: DataEntity) -> i64 {
        self.entries.write().unwrap().insert(key, entity);
        1
    }

    /// Inserts only when the key is absent. Returns 1 on insert, 0 when the
    /// key already exists (in which case nothing is written).
    pub fn put_if_absent(&self, key: Bytes, entity: DataEntity) -> i64 {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&key) {
            return 0;
        }
        entries.insert(key, entity);
        1
    }

    /// Updates only when the key is present. Returns 1 on update, 0 when the
    /// key is absent (in which case nothing is written).
    pub fn put_if_exists(&self, key: Bytes, entity: DataEntity) -> i64 {
        let mut entries = self.entries.write().unwrap();
        if !entries.contains_key(&key) {
            return 0;
        }
        entries.insert(key, entity);
        1
    }

    /// All-or-nothing multi-key insert: if any key is already present, no
    /// pair is written and 0 is returned. The check and the writes happen
    /// under one lock acquisition, so no concurrent writer can slip between
    /// them.
    pub fn put_all_if_absent(&self, pairs: Vec<(Bytes, DataEntity)>) -> i64 {
        let mut entries = self.entries.write().unwrap();
        if pairs.iter().any(|(key, _)| entries.contains_key(key)) {
            return 0;
        }
        for (key, entity) in pairs {
            entries.insert(key, entity);
        }
        1
    }

    pub fn remove(&self, key: &[u8]) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
