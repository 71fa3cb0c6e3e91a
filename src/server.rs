use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument};

use crate::codec::Payload;
use crate::config::Config;
use crate::connection::Connection;
use crate::database::Database;
use crate::db::CmdLine;
use crate::frame::Frame;
use crate::Error;

// How long shutdown waits for in-flight connections to flush their replies
// before giving up on them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Binds the configured address and serves until the `shutdown` future
/// completes. `tokio::signal::ctrl_c()` is the usual argument.
pub async fn run(config: Config, shutdown: impl Future) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.address.as_str(), config.port)).await?;
    serve(listener, config, shutdown).await
}

/// Accept loop over an already-bound listener. Split out from `run` so tests
/// can serve on an ephemeral port.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future,
) -> Result<(), Error> {
    let database = Arc::new(Database::new(&config)?);

    // Dropping `notify_shutdown` tells every connection task to wind down;
    // the `done` channel closing back tells us they all have.
    let (notify_shutdown, _) = broadcast::channel::<()>(1);
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    info!("server listening on {}", listener.local_addr()?);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, client_address) = accepted?;
                let database = database.clone();
                let mut shutdown_rx = notify_shutdown.subscribe();
                let done = done_tx.clone();
                info!("accepted connection from {:?}", client_address);

                tokio::spawn(async move {
                    let _done = done;
                    if let Err(e) = handle_connection(socket, database, &mut shutdown_rx).await {
                        error!("connection error: {}", e);
                    }
                });
            }
            _ = &mut shutdown => break,
        }
    }

    drop(notify_shutdown);
    drop(done_tx);
    if timeout(SHUTDOWN_GRACE, done_rx.recv()).await.is_err() {
        error!("timed out waiting for open connections to finish");
    }

    Ok(())
}

#[instrument(name = "connection", skip_all, fields(connection_id))]
async fn handle_connection(
    socket: TcpStream,
    database: Arc<Database>,
    shutdown: &mut broadcast::Receiver<()>,
) -> crate::Result<()> {
    let mut conn = Connection::new(socket);
    tracing::Span::current().record("connection_id", conn.id);

    loop {
        // Between requests is the safe point to stop; a request already
        // being executed below always gets its reply flushed.
        let payload = tokio::select! {
            payload = conn.read_payload() => payload?,
            _ = shutdown.recv() => break,
        };
        let Some(payload) = payload else {
            break;
        };

        let reply = match payload {
            Payload::Frame(frame) => {
                debug!("received frame: {:?}", frame);
                match request_command_line(frame) {
                    Ok(cmdline) => database.exec(&mut conn, &cmdline),
                    Err(reply) => reply,
                }
            }
            // Malformed input gets an error reply, not a disconnect. The
            // codec has already resynchronized on the next frame start.
            Payload::Error(err) => Frame::Error(err.to_string()),
        };

        conn.write_frame(&reply).await?;
    }

    info!("connection closed");
    Ok(())
}

// Requests come off the wire as arrays of bulks (or a single bulk for the
// degenerate case). Anything else a client sends is malformed. An empty
// array is legal and simply produces no reply.
fn request_command_line(frame: Frame) -> Result<CmdLine, Frame> {
    match frame {
        Frame::Array(items) => {
            let mut cmdline = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Frame::Bulk(data) => cmdline.push(data),
                    Frame::Null => cmdline.push(Bytes::new()),
                    other => return Err(malformed_request(&other)),
                }
            }
            Ok(cmdline)
        }
        Frame::Bulk(data) => Ok(vec![data]),
        other => Err(malformed_request(&other)),
    }
}

fn malformed_request(frame: &Frame) -> Frame {
    let snippet = String::from_utf8_lossy(&frame.serialize())
        .trim_end()
        .to_string();
    Frame::Error(format!("ERR Protocol error: '{snippet}'"))
}
