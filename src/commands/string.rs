use bytes::{Bytes, BytesMut};

use crate::commands::to_cmd_line;
use crate::db::Db;
use crate::frame::Frame;
use crate::store::DataEntity;

/// Returns the string value bound to the key, or nil when absent.
///
/// Ref: <https://redis.io/docs/latest/commands/get>
pub fn get(db: &Db, args: &[Bytes]) -> Frame {
    match db.get_as_bytes(&args[0]) {
        Ok(Some(value)) => Frame::Bulk(value),
        Ok(None) => Frame::Null,
        Err(err) => err,
    }
}

#[derive(PartialEq)]
enum SetPolicy {
    Upsert,
    Insert,
    Update,
}

/// `SET key value [NX|XX]`. NX writes only when the key is absent, XX only
/// when it is present; the two are mutually exclusive. A skipped write
/// replies nil instead of OK.
///
/// Ref: <https://redis.io/docs/latest/commands/set>
pub fn set(db: &Db, args: &[Bytes]) -> Frame {
    let mut policy = SetPolicy::Upsert;
    for option in &args[2..] {
        if option.eq_ignore_ascii_case(b"NX") {
            if policy == SetPolicy::Update {
                return syntax_error();
            }
            policy = SetPolicy::Insert;
        } else if option.eq_ignore_ascii_case(b"XX") {
            if policy == SetPolicy::Insert {
                return syntax_error();
            }
            policy = SetPolicy::Update;
        } else {
            return syntax_error();
        }
    }

    let key = args[0].clone();
    let entity = DataEntity::Bytes(args[1].clone());
    let written = match policy {
        SetPolicy::Upsert => db.put_entity(key, entity),
        SetPolicy::Insert => db.put_if_absent(key, entity),
        SetPolicy::Update => db.put_if_exists(key, entity),
    };

    db.add_aof(to_cmd_line("set", args));
    if written > 0 {
        Frame::Simple("OK".to_string())
    } else {
        Frame::Null
    }
}

/// Ref: <https://redis.io/docs/latest/commands/setnx>
pub fn setnx(db: &Db, args: &[Bytes]) -> Frame {
    let written = db.put_if_absent(args[0].clone(), DataEntity::Bytes(args[1].clone()));
    db.add_aof(to_cmd_line("setnx", args));
    Frame::Integer(written)
}

/// Upserts every key/value pair.
///
/// Ref: <https://redis.io/docs/latest/commands/mset>
pub fn mset(db: &Db, args: &[Bytes]) -> Frame {
    if args.len() % 2 != 0 {
        return syntax_error();
    }
    for pair in args.chunks_exact(2) {
        db.put_entity(pair[0].clone(), DataEntity::Bytes(pair[1].clone()));
    }
    db.add_aof(to_cmd_line("mset", args));
    Frame::Simple("OK".to_string())
}

/// Returns the values of all requested keys. Absent keys and keys holding a
/// non-string payload both come back as nil; one bad key never fails the
/// whole batch.
///
/// Ref: <https://redis.io/docs/latest/commands/mget>
pub fn mget(db: &Db, args: &[Bytes]) -> Frame {
    let values = args
        .iter()
        .map(|key| match db.get_as_bytes(key) {
            Ok(Some(value)) => Frame::Bulk(value),
            Ok(None) | Err(_) => Frame::Null,
        })
        .collect();
    Frame::Array(values)
}

/// Sets every key/value pair, but only when none of the keys exist yet.
/// Either all pairs are written or none is, even under concurrent callers.
///
/// Ref: <https://redis.io/docs/latest/commands/msetnx>
pub fn msetnx(db: &Db, args: &[Bytes]) -> Frame {
    if args.len() % 2 != 0 {
        return syntax_error();
    }
    let pairs = args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), DataEntity::Bytes(pair[1].clone())))
        .collect();

    let written = db.put_all_if_absent(pairs);
    if written > 0 {
        db.add_aof(to_cmd_line("msetnx", args));
    }
    Frame::Integer(written)
}

/// Stores the new value and returns the old one, or nil when the key was
/// absent. The write always happens, so it is always logged.
///
/// Ref: <https://redis.io/docs/latest/commands/getset>
pub fn getset(db: &Db, args: &[Bytes]) -> Frame {
    let old = match db.get_as_bytes(&args[0]) {
        Ok(old) => old,
        Err(err) => return err,
    };

    db.put_entity(args[0].clone(), DataEntity::Bytes(args[1].clone()));
    db.add_aof(to_cmd_line("getset", args));

    match old {
        Some(value) => Frame::Bulk(value),
        None => Frame::Null,
    }
}

/// Ref: <https://redis.io/docs/latest/commands/incr>
pub fn incr(db: &Db, args: &[Bytes]) -> Frame {
    apply_delta(db, "incr", args, 1)
}

/// Ref: <https://redis.io/docs/latest/commands/incrby>
pub fn incrby(db: &Db, args: &[Bytes]) -> Frame {
    let Some(delta) = parse_integer(&args[1]) else {
        return not_an_integer();
    };
    apply_delta(db, "incrby", args, delta)
}

/// Ref: <https://redis.io/docs/latest/commands/decr>
pub fn decr(db: &Db, args: &[Bytes]) -> Frame {
    apply_delta(db, "decr", args, -1)
}

/// Ref: <https://redis.io/docs/latest/commands/decrby>
pub fn decrby(db: &Db, args: &[Bytes]) -> Frame {
    let Some(delta) = parse_integer(&args[1]).and_then(i64::checked_neg) else {
        return not_an_integer();
    };
    apply_delta(db, "decrby", args, delta)
}

// Shared by the four increment/decrement commands. An absent key behaves as
// if it held zero; overflow is an error, never a wrap.
fn apply_delta(db: &Db, name: &str, args: &[Bytes], delta: i64) -> Frame {
    let key = &args[0];
    let current = match db.get_as_bytes(key) {
        Ok(current) => current,
        Err(err) => return err,
    };

    let next = match current {
        Some(value) => {
            let Some(value) = parse_integer(&value) else {
                return not_an_integer();
            };
            let Some(next) = value.checked_add(delta) else {
                return not_an_integer();
            };
            next
        }
        None => delta,
    };

    db.put_entity(key.clone(), DataEntity::Bytes(Bytes::from(next.to_string())));
    db.add_aof(to_cmd_line(name, args));
    Frame::Integer(next)
}

/// Length in bytes of the value, 0 when the key is absent.
///
/// Ref: <https://redis.io/docs/latest/commands/strlen>
pub fn strlen(db: &Db, args: &[Bytes]) -> Frame {
    match db.get_as_bytes(&args[0]) {
        Ok(Some(value)) => Frame::Integer(value.len() as i64),
        Ok(None) => Frame::Integer(0),
        Err(err) => err,
    }
}

/// Appends to the existing value, creating the key when absent. Replies with
/// the new length.
///
/// Ref: <https://redis.io/docs/latest/commands/append>
pub fn append(db: &Db, args: &[Bytes]) -> Frame {
    let existing = match db.get_as_bytes(&args[0]) {
        Ok(existing) => existing.unwrap_or_default(),
        Err(err) => return err,
    };

    let mut value = BytesMut::with_capacity(existing.len() + args[1].len());
    value.extend_from_slice(&existing);
    value.extend_from_slice(&args[1]);
    let len = value.len();

    db.put_entity(args[0].clone(), DataEntity::Bytes(value.freeze()));
    db.add_aof(to_cmd_line("append", args));
    Frame::Integer(len as i64)
}

/// `SETRANGE key offset value`. Overwrites starting at the byte offset,
/// zero-padding when the offset lies past the current end. Replies with the
/// new length.
///
/// Ref: <https://redis.io/docs/latest/commands/setrange>
pub fn setrange(db: &Db, args: &[Bytes]) -> Frame {
    let Some(offset) = parse_integer(&args[1]) else {
        return not_an_integer();
    };
    if offset < 0 {
        return Frame::Error("ERR offset is out of range".to_string());
    }
    let offset = offset as usize;

    let existing = match db.get_as_bytes(&args[0]) {
        Ok(existing) => existing.unwrap_or_default(),
        Err(err) => return err,
    };

    let patch = &args[2];
    let mut value = BytesMut::from(&existing[..]);
    if value.len() < offset {
        value.resize(offset, 0);
    }
    let end = offset + patch.len();
    if value.len() < end {
        value.resize(end, 0);
    }
    value[offset..end].copy_from_slice(patch);
    let len = value.len();

    db.put_entity(args[0].clone(), DataEntity::Bytes(value.freeze()));
    db.add_aof(to_cmd_line("setrange", args));
    Frame::Integer(len as i64)
}

/// `GETRANGE key start end`, both indices inclusive. Negative indices count
/// back from the end of the value; -1 is the last byte. Out-of-range requests
/// reply nil.
///
/// Ref: <https://redis.io/docs/latest/commands/getrange>
pub fn getrange(db: &Db, args: &[Bytes]) -> Frame {
    let Some(mut start) = parse_integer(&args[1]) else {
        return not_an_integer();
    };
    let Some(mut end) = parse_integer(&args[2]) else {
        return not_an_integer();
    };

    let value = match db.get_as_bytes(&args[0]) {
        Ok(Some(value)) => value,
        Ok(None) => return Frame::Null,
        Err(err) => return err,
    };
    let len = value.len() as i64;

    if start < -len || start >= len {
        return Frame::Null;
    }
    if start < 0 {
        start += len;
    }

    // Normalize the inclusive end index into an exclusive bound.
    if end < -len {
        return Frame::Null;
    }
    if end < 0 {
        end = len + end + 1;
    } else if end < len {
        end += 1;
    } else {
        end = len;
    }

    if start > end {
        return Frame::Null;
    }
    Frame::Bulk(value.slice(start as usize..end as usize))
}

fn parse_integer(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse::<i64>().ok()
}

fn not_an_integer() -> Frame {
    Frame::Error("ERR value is not an integer or out of range".to_string())
}

fn syntax_error() -> Frame {
    Frame::Error("ERR syntax error".to_string())
}
