use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

use crate::codec::{FrameCodec, Payload};
use crate::database::ConnectionContext;
use crate::frame::Frame;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One client connection: the socket, the read buffer the decoder works on,
/// and the session state (the currently selected database, 0 by default).
pub struct Connection {
    pub id: u64,
    stream: TcpStream,
    // Data is read from the socket into the read buffer. When a payload is
    // decoded, the corresponding bytes are removed from the buffer.
    buffer: BytesMut,
    codec: FrameCodec,
    db_index: usize,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(),
            db_index: 0,
        }
    }

    /// Reads the next parsed payload off the socket. `Ok(None)` means the
    /// peer closed the connection cleanly; an EOF in the middle of a frame
    /// is an error.
    pub async fn read_payload(&mut self) -> crate::Result<Option<Payload>> {
        loop {
            if let Some(payload) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(payload));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err("connection reset by peer".into());
            }
        }
    }

    /// Serializes the reply onto the socket. A `NoReply` writes nothing.
    pub async fn write_frame(&mut self, frame: &Frame) -> crate::Result<()> {
        let bytes = frame.serialize();
        if bytes.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&bytes).await?;
        Ok(())
    }
}

impl ConnectionContext for Connection {
    fn db_index(&self) -> usize {
        self.db_index
    }

    fn select_db(&mut self, index: usize) {
        self.db_index = index;
    }
}
