//! Request/reply service over TCP.
//!
//! Every connection gets its own task and its own cursor over the batches,
//! so several clients can stream the same dataset independently.

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use stream_core::codec::{Codec, Request};
use stream_core::{Result, StreamError};

use crate::state::DatasetSource;

/// Requests are four-byte markers; anything much larger is not a client.
const MAX_REQUEST_BYTES: u32 = 1024;

/// Per-connection position in the dataset.
#[derive(Debug, Default)]
pub struct ConnectionCursor {
    next_batch: usize,
    batches_sent: u64,
}

pub struct StreamService {
    source: Arc<DatasetSource>,
    codec: Arc<dyn Codec>,
}

impl StreamService {
    pub fn new(source: Arc<DatasetSource>, codec: Arc<dyn Codec>) -> Self {
        Self { source, codec }
    }

    /// Builds the reply to one request.
    ///
    /// `Data` after the last batch keeps answering end-of-stream.
    pub fn respond(&self, request: Request, cursor: &mut ConnectionCursor) -> Result<Vec<u8>> {
        match request {
            Request::Info => self.codec.encode_metadata(self.source.metadata()),
            Request::Data => match self.source.batch(cursor.next_batch) {
                Some(batch) => {
                    let reply = self.codec.encode_batch(batch)?;
                    cursor.next_batch += 1;
                    cursor.batches_sent += 1;
                    Ok(reply)
                }
                None => Ok(self.codec.encode_end_of_stream()),
            },
        }
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
                    }

                    let service = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = service.handle_connection(stream, peer).await {
                            tracing::warn!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down stream server...");
                    return Ok(());
                }
            }
        }
    }

    /// Serves one client until it disconnects or misbehaves.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let address = peer.to_string();
        let mut cursor = ConnectionCursor::default();
        tracing::info!(%peer, "client connected");

        loop {
            let frame = match read_request(&mut stream).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    return Err(StreamError::transport_with_source(
                        &address,
                        "failed to read request",
                        e,
                    ))
                }
            };

            let Some(request) = Request::parse(&frame) else {
                tracing::warn!(%peer, bytes = frame.len(), "unknown request, closing connection");
                return Err(StreamError::protocol("unknown request marker"));
            };

            let reply = self.respond(request, &mut cursor)?;
            tracing::debug!(%peer, ?request, bytes = reply.len(), "sending reply");

            write_reply(&mut stream, &reply).await.map_err(|e| {
                StreamError::transport_with_source(&address, "failed to send reply", e)
            })?;
        }

        tracing::info!(%peer, batches = cursor.batches_sent, "client disconnected");
        Ok(())
    }
}

/// Reads one request frame; `None` on a clean disconnect.
async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Option<Vec<u8>>> {
    let len = match stream.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_REQUEST_BYTES {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("request frame of {len} bytes exceeds limit of {MAX_REQUEST_BYTES} bytes"),
        ));
    }

    let mut frame = vec![0u8; len as usize];
    stream.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

async fn write_reply<S: AsyncWrite + Unpin>(stream: &mut S, reply: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(reply.len())
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "reply larger than 4 GiB"))?;
    stream.write_u32(len).await?;
    stream.write_all(reply).await?;
    stream.flush().await
}
