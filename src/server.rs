//! TCP fan-out of the snapshot feed.
//!
//! Every accepted connection becomes one hub subscriber backed by a bounded
//! channel. A writer task drains the channel onto the socket. The
//! connection is closed when the socket fails, when a write stalls past
//! [`WRITE_TIMEOUT`], or when the hub drops the subscriber for falling
//! behind.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signalwatch_core::{BroadcastHub, ChannelSink, Payload, WireFormat};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A subscriber whose socket accepts nothing for this long is dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept subscribers until the listener fails.
///
/// Per-connection accept errors and resource exhaustion are logged and
/// retried; only errors that leave the listener unusable end the loop.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use signalwatch_core::BroadcastHub;
/// use tokio::net::TcpListener;
///
/// # tokio_test::block_on(async {
/// let hub = Arc::new(BroadcastHub::default());
/// let listener = TcpListener::bind("127.0.0.1:8765").await.unwrap();
/// tokio::spawn(signalwatch::server::serve(listener, hub.clone(), 64));
/// # });
/// ```
pub async fn serve(listener: TcpListener, hub: Arc<BroadcastHub>, buffer: usize) -> io::Result<()> {
    let format = hub.format();
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => match accept_backoff(&e) {
                Some(pause) => {
                    warn!(error = %e, pause_ms = pause.as_millis() as u64, "accept failed");
                    tokio::time::sleep(pause).await;
                    continue;
                }
                None => return Err(e),
            },
        };
        let _ = stream.set_nodelay(true);

        let (sink, rx) = ChannelSink::channel(buffer, format!("tcp:{}", peer));
        let id = hub.subscribe(sink);

        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = forward(stream, rx, format, WRITE_TIMEOUT).await {
                debug!(%peer, error = %e, "subscriber connection failed");
            }
            hub.unsubscribe(id);
            info!(%peer, "subscriber disconnected");
        });
    }
}

/// How long to pause before accepting again, or `None` if the listener
/// itself is unusable.
///
/// Aborted handshakes only affect one peer. Running out of descriptors or
/// memory clears up once connections close, so those back off briefly.
fn accept_backoff(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => Some(Duration::ZERO),
        io::ErrorKind::InvalidInput
        | io::ErrorKind::NotConnected
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::Unsupported => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

/// Write every payload from `rx` to `writer`, framed for `format`.
///
/// Returns once the channel closes, i.e. the hub dropped this subscriber,
/// or with `TimedOut` when a single write stalls for `write_timeout`.
pub async fn forward<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Payload>,
    format: WireFormat,
    write_timeout: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = rx.recv().await {
        let frame = format.frame(&payload);
        match tokio::time::timeout(write_timeout, writer.write_all(&frame)).await {
            Ok(written) => written?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "subscriber stopped reading",
                ))
            }
        }
    }
    writer.flush().await
}

/// Bind `addr`, returning the listener and the address actually bound.
pub async fn bind(addr: &str) -> io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}
