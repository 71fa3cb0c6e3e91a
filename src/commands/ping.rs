use bytes::Bytes;

use crate::db::Db;
use crate::frame::Frame;

/// Replies `PONG`, or echoes the single optional argument as a bulk.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
pub fn ping(_db: &Db, args: &[Bytes]) -> Frame {
    match args {
        [] => Frame::Simple("PONG".to_string()),
        [message] => Frame::Bulk(message.clone()),
        _ => Frame::Error("ERR wrong number of arguments for 'ping' command".to_string()),
    }
}
