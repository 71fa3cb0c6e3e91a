use std::sync::Arc;

use bytes::Bytes;

use crate::commands::Registry;
use crate::frame::Frame;
use crate::store::{DataEntity, Store};

/// A full command line: the command name followed by its arguments, each a
/// binary-safe byte string.
pub type CmdLine = Vec<Bytes>;

/// Mutation hook invoked by write commands with the canonical command line.
/// Wired to the append-only log when persistence is on, a no-op otherwise.
pub type AofHook = Box<dyn Fn(CmdLine) + Send + Sync>;

/// One logical database: an index, its keyspace and the append hook.
pub struct Db {
    index: usize,
    store: Store,
    registry: Arc<Registry>,
    add_aof: AofHook,
}

impl Db {
    pub fn new(index: usize, registry: Arc<Registry>, add_aof: AofHook) -> Db {
        Db {
            index,
            store: Store::new(),
            registry,
            add_aof,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Executes one command line against this database. The command name is
    /// matched case-insensitively; arity is validated before the handler
    /// runs. Every failure mode is an error reply, never a panic.
    pub fn exec(&self, cmdline: &[Bytes]) -> Frame {
        let Some(name_bytes) = cmdline.first() else {
            return Frame::NoReply;
        };
        let name = String::from_utf8_lossy(name_bytes).to_lowercase();

        let Some(command) = self.registry.lookup(&name) else {
            return Frame::Error(format!("ERR unknown command '{name}'"));
        };
        if !validate_arity(command.arity, cmdline.len()) {
            return Frame::Error(format!(
                "ERR wrong number of arguments for '{name}' command"
            ));
        }
        (command.exec)(self, &cmdline[1..])
    }

    /* ---- data access ---- */

    pub fn get_entity(&self, key: &[u8]) -> Option<DataEntity> {
        self.store.get(key)
    }

    pub fn put_entity(&self, key: Bytes, entity: DataEntity) -> i64 {
        self.store.put(key, entity)
    }

    pub fn put_if_absent(&self, key: Bytes, entity: DataEntity) -> i64 {
        self.store.put_if_absent(key, entity)
    }

    pub fn put_if_exists(&self, key: Bytes, entity: DataEntity) -> i64 {
        self.store.put_if_exists(key, entity)
    }

    pub fn put_all_if_absent(&self, pairs: Vec<(Bytes, DataEntity)>) -> i64 {
        self.store.put_all_if_absent(pairs)
    }

    pub fn remove(&self, key: &[u8]) -> bool {
        self.store.remove(key)
    }

    /// Removes the given keys, returning how many actually existed.
    pub fn removes(&self, keys: &[Bytes]) -> i64 {
        keys.iter().filter(|key| self.store.remove(key.as_ref())).count() as i64
    }

    pub fn flush(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Reads a key as a string value. `Ok(None)` means the key is absent;
    /// a payload of a different kind is the wrong-type error reply.
    pub fn get_as_bytes(&self, key: &[u8]) -> Result<Option<Bytes>, Frame> {
        match self.store.get(key) {
            None => Ok(None),
            Some(entity) => match entity.as_bytes() {
                Some(data) => Ok(Some(data.clone())),
                None => Err(Frame::Error(
                    "WRONGTYPE Operation against a key holding the wrong kind of value"
                        .to_string(),
                )),
            },
        }
    }

    pub fn add_aof(&self, line: CmdLine) {
        (self.add_aof)(line);
    }
}

fn validate_arity(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc == arity as usize
    } else {
        argc >= arity.unsigned_abs() as usize
    }
}
