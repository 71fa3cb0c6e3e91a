use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::error;

use crate::aof::AofHandler;
use crate::commands::Registry;
use crate::config::Config;
use crate::db::{AofHook, Db};
use crate::frame::Frame;

/// The connection state the executor needs: which logical database the
/// connection is currently addressing. The network half of a connection
/// lives elsewhere; handlers never see it.
pub trait ConnectionContext {
    fn db_index(&self) -> usize;
    fn select_db(&mut self, index: usize);
}

/// The full server keyspace: a fixed set of databases indexed 0..N-1 plus
/// the optional append-only log they feed.
pub struct Database {
    dbs: Vec<Arc<Db>>,
}

impl Database {
    pub fn new(config: &Config) -> crate::Result<Database> {
        let registry = Arc::new(Registry::new());
        let aof = if config.append_only {
            Some(AofHandler::new(&config.append_filename)?)
        } else {
            None
        };

        let count = config.databases.max(1);
        let dbs = (0..count)
            .map(|index| {
                let hook: AofHook = match &aof {
                    Some(handler) => {
                        let handler = handler.clone();
                        Box::new(move |line| handler.append(index, line))
                    }
                    None => Box::new(|_| {}),
                };
                Arc::new(Db::new(index, registry.clone(), hook))
            })
            .collect();

        Ok(Database { dbs })
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    /// Executes one request on behalf of a connection. SELECT is resolved
    /// here since it concerns the database set rather than any single
    /// database; everything else goes to the connection's current database.
    pub fn exec(&self, conn: &mut dyn ConnectionContext, cmdline: &[Bytes]) -> Frame {
        let Some(name_bytes) = cmdline.first() else {
            return Frame::NoReply;
        };
        let name = String::from_utf8_lossy(name_bytes).to_lowercase();

        if name == "select" {
            if cmdline.len() != 2 {
                return Frame::Error(
                    "ERR wrong number of arguments for 'select' command".to_string(),
                );
            }
            return self.select(conn, &cmdline[1]);
        }

        let Some(db) = self.dbs.get(conn.db_index()) else {
            return Frame::Error("ERR DB index is out of range".to_string());
        };
        contained(|| db.exec(cmdline))
    }

    fn select(&self, conn: &mut dyn ConnectionContext, raw: &[u8]) -> Frame {
        let index = std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<usize>().ok());
        let Some(index) = index else {
            return Frame::Error("ERR invalid DB index".to_string());
        };
        if index >= self.dbs.len() {
            return Frame::Error("ERR DB index is out of range".to_string());
        }
        conn.select_db(index);
        Frame::Simple("OK".to_string())
    }
}

// A buggy handler must not take the whole server down with it. The fault is
// logged and the client gets no reply for that one request.
fn contained<F: FnOnce() -> Frame>(f: F) -> Frame {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(reply) => reply,
        Err(cause) => {
            error!("error occurs: {}", panic_message(cause.as_ref()));
            Frame::NoReply
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
