use bytes::Bytes;

use crate::commands::to_cmd_line;
use crate::db::Db;
use crate::frame::Frame;

/// Removes the given keys, replying with how many of them existed.
///
/// Ref: <https://redis.io/docs/latest/commands/del>
pub fn del(db: &Db, args: &[Bytes]) -> Frame {
    let removed = db.removes(args);
    if removed > 0 {
        db.add_aof(to_cmd_line("del", args));
    }
    Frame::Integer(removed)
}

/// Replies with how many of the given keys exist. A key repeated in the
/// arguments is counted every time.
///
/// Ref: <https://redis.io/docs/latest/commands/exists>
pub fn exists(db: &Db, args: &[Bytes]) -> Frame {
    let present = args
        .iter()
        .filter(|key| db.get_entity(key.as_ref()).is_some())
        .count();
    Frame::Integer(present as i64)
}

/// Drops every key in the current database.
///
/// Ref: <https://redis.io/docs/latest/commands/flushdb>
pub fn flushdb(db: &Db, args: &[Bytes]) -> Frame {
    db.flush();
    db.add_aof(to_cmd_line("flushdb", args));
    Frame::Simple("OK".to_string())
}
