//! Newline-delimited JSON transport for the webview protocol.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::session::Session;

use super::dispatcher::Dispatcher;
use super::host::EditorHost;
use super::{ClientMessage, Envelope, ServerMessage};

/// Serve one webview connection until `reader` reaches end of input.
///
/// Each inbound line is one [`ClientMessage`]; handlers run concurrently and
/// their replies are written one per line by a single writer task. Lines that
/// fail to decode, including lines that are not UTF-8, are logged and
/// skipped. A read error ends the connection only after running handlers
/// have finished and their replies are written.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    session: Arc<Session>,
    host: Arc<dyn EditorHost>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let dispatcher = Arc::new(Dispatcher::new(session, host, tx));

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut handlers = JoinSet::new();
    let mut read_error = None;

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Failed to read from webview: {e}");
                        read_error = Some(e);
                        break;
                    }
                }
                let line = std::mem::take(&mut buf);
                if let Some(envelope) = decode_line(line) {
                    let dispatcher = Arc::clone(&dispatcher);
                    handlers.spawn(async move { dispatcher.dispatch(envelope).await });
                }
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!("Message handler panicked: {e}");
                }
            }
        }
    }

    debug!(pending = handlers.len(), "Input closed; waiting for handlers");
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!("Message handler panicked: {e}");
        }
    }

    // Last sender goes away here, which lets the writer drain and stop.
    drop(dispatcher);
    let written = match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    };
    match read_error {
        Some(e) => Err(e),
        None => written,
    }
}

/// Decode one raw inbound line, or log why it is skipped.
fn decode_line(mut line: Vec<u8>) -> Option<Envelope<ClientMessage>> {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    let line = match String::from_utf8(line) {
        Ok(line) => line,
        Err(e) => {
            warn!("Ignoring inbound message that is not UTF-8: {e}");
            return None;
        }
    };
    if line.trim().is_empty() {
        return None;
    }
    match Envelope::<ClientMessage>::decode(&line) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!("Ignoring inbound message: {e}");
            None
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Envelope<ServerMessage>>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let line = match envelope.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping outbound message: {e}");
                continue;
            }
        };
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    info!("Webview connection closed");
    writer.shutdown().await
}
