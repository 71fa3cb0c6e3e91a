use std::path::Path;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::error;

use crate::db::CmdLine;
use crate::frame::Frame;

struct Record {
    db_index: usize,
    cmdline: CmdLine,
}

/// The append-only log sink. Mutating commands enqueue their command line
/// here; a dedicated writer task owns the file, so appends never block a
/// handler and all writes are serialized through one place.
///
/// Records sent from a single connection land in issue order because
/// handlers run synchronously on the connection task and the channel
/// preserves send order.
#[derive(Clone)]
pub struct AofHandler {
    tx: mpsc::UnboundedSender<Record>,
}

impl AofHandler {
    /// Opens (or creates) the log file and spawns the writer task. Must be
    /// called from within a tokio runtime.
    pub fn new(path: impl AsRef<Path>) -> crate::Result<AofHandler> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut file = tokio::fs::File::from_std(file);

        let (tx, mut rx) = mpsc::unbounded_channel::<Record>();

        tokio::spawn(async move {
            // The log replays through the regular command path, so every
            // record is a RESP array. A `select` record precedes any command
            // whose database differs from the previous record's.
            let mut current_db: Option<usize> = None;

            while let Some(record) = rx.recv().await {
                if current_db != Some(record.db_index) {
                    let select = request_frame(vec![
                        Bytes::from_static(b"select"),
                        Bytes::from(record.db_index.to_string()),
                    ]);
                    if let Err(err) = file.write_all(&select.serialize()).await {
                        error!("failed to append to the aof file: {}", err);
                        return;
                    }
                    current_db = Some(record.db_index);
                }

                let frame = request_frame(record.cmdline);
                if let Err(err) = file.write_all(&frame.serialize()).await {
                    error!("failed to append to the aof file: {}", err);
                    return;
                }
            }
        });

        Ok(AofHandler { tx })
    }

    /// Enqueues one mutation for the given database. Never blocks; if the
    /// writer task has died the record is silently dropped, which the task
    /// has already logged as a write failure.
    pub fn append(&self, db_index: usize, cmdline: CmdLine) {
        let _ = self.tx.send(Record { db_index, cmdline });
    }
}

fn request_frame(cmdline: CmdLine) -> Frame {
    Frame::Array(cmdline.into_iter().map(Frame::Bulk).collect())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use tokio::time::{sleep, Duration};

    use super::*;

    fn scratch_file(tag: &str) -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("rudis-aof-{tag}-{stamp}.aof"));
        path
    }

    fn line(parts: &[&str]) -> CmdLine {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn appends_records_in_order_with_select_markers() {
        let path = scratch_file("order");
        let handler = AofHandler::new(&path).unwrap();

        handler.append(0, line(&["set", "a", "1"]));
        handler.append(0, line(&["set", "b", "2"]));
        handler.append(3, line(&["set", "c", "3"]));
        handler.append(0, line(&["del", "a"]));

        sleep(Duration::from_millis(200)).await;

        let contents = std::fs::read(&path).unwrap();
        let expected: Vec<u8> = [
            &b"*2\r\n$6\r\nselect\r\n$1\r\n0\r\n"[..],
            b"*3\r\n$3\r\nset\r\n$1\r\na\r\n$1\r\n1\r\n",
            b"*3\r\n$3\r\nset\r\n$1\r\nb\r\n$1\r\n2\r\n",
            b"*2\r\n$6\r\nselect\r\n$1\r\n3\r\n",
            b"*3\r\n$3\r\nset\r\n$1\r\nc\r\n$1\r\n3\r\n",
            b"*2\r\n$6\r\nselect\r\n$1\r\n0\r\n",
            b"*2\r\n$3\r\ndel\r\n$1\r\na\r\n",
        ]
        .concat();
        assert_eq!(contents, expected);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn binary_arguments_survive_verbatim() {
        let path = scratch_file("binary");
        let handler = AofHandler::new(&path).unwrap();

        handler.append(
            0,
            vec![
                Bytes::from_static(b"set"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"a\r\n\x00b"),
            ],
        );

        sleep(Duration::from_millis(200)).await;

        let contents = std::fs::read(&path).unwrap();
        let expected: Vec<u8> = [
            &b"*2\r\n$6\r\nselect\r\n$1\r\n0\r\n"[..],
            b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$5\r\na\r\n\x00b\r\n",
        ]
        .concat();
        assert_eq!(contents, expected);

        let _ = std::fs::remove_file(&path);
    }
}
