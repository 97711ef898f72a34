//! Minimal reactor serving inbound calls over a byte stream.
//!
//! Each connection is split in two. The reading half runs on the I/O task:
//! it reads one transfer at a time, parses it into an [`InboundCall`],
//! stamps it as received and hands it to a blocking worker, which runs the
//! [`CallHandler`]. The writing half drains the connection's response queue
//! (see [`write_responses`]). Nothing here orders responses; they are
//! written in the order handlers answer.

mod error;

use std::{
    net::SocketAddr,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

pub use error::ServerError;
use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tokio_util::{codec::FramedRead, sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    call::InboundCall,
    codec::TransferCodec,
    config::CallConfig,
    connection::{ChannelConnection, Connection, UserCredentials, write_responses},
    metrics::{ErrorKind, MethodMetrics, inc_errors},
    panic::format_panic,
    status::RpcErrorCode,
    transfer::InboundTransfer,
};

/// Largest frame accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Application logic invoked for every parsed call.
///
/// `handle` runs on a blocking worker thread and owns the call: it is
/// expected to stamp handling completion with
/// [`InboundCall::record_handling_completed`] and answer the call with one
/// of the respond methods. If `handle` panics the call is answered with
/// [`RpcErrorCode::FatalUnknown`]; a call it drops without an answer is
/// never answered.
pub trait CallHandler: Send + Sync + 'static {
    fn handle(&self, call: InboundCall, metrics: &MethodMetrics);
}

impl<F> CallHandler for F
where
    F: Fn(InboundCall, &MethodMetrics) + Send + Sync + 'static,
{
    fn handle(&self, call: InboundCall, metrics: &MethodMetrics) { self(call, metrics); }
}

/// Connection-level settings for [`serve_connection`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServeConfig {
    pub call: CallConfig,
    pub max_frame_len: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            call: CallConfig::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Serve calls arriving on `stream` until the peer closes it or `shutdown`
/// is cancelled.
///
/// On shutdown no further frames are read. Either way, every handler spawned
/// for the connection and the response writer are waited for before
/// returning, so calls already read are still answered.
///
/// # Errors
///
/// Returns a [`ServerError`] if reading fails, a frame cannot be parsed or
/// the response writer fails. Calls already handed to handlers are still
/// answered when possible.
pub async fn serve_connection<S, H>(
    stream: S,
    peer: SocketAddr,
    credentials: UserCredentials,
    handler: Arc<H>,
    config: ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    H: CallHandler,
{
    let (reader, writer) = tokio::io::split(stream);
    let (connection, queue) = ChannelConnection::new(peer, credentials);
    let writer = tokio::spawn(write_responses(queue, writer));
    let workers = TaskTracker::new();

    let mut frames = FramedRead::new(reader, TransferCodec::new(config.max_frame_len));
    let read_result = tokio::select! {
        () = shutdown.cancelled() => {
            debug!(%peer, "shutting down connection");
            Ok(())
        }
        result = read_calls(&mut frames, &connection, &handler, config, &workers) => result,
    };

    workers.close();
    workers.wait().await;
    // Queued calls keep the connection alive until the writer drops them.
    drop(connection);
    let write_result = writer.await?;
    debug!(%peer, "connection finished");
    read_result?;
    write_result.map_err(ServerError::from)
}

async fn read_calls<R, H>(
    frames: &mut FramedRead<R, TransferCodec>,
    connection: &Arc<ChannelConnection>,
    handler: &Arc<H>,
    config: ServeConfig,
    workers: &TaskTracker,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    H: CallHandler,
{
    let peer = connection.remote_address();
    while let Some(frame) = frames.next().await {
        let transfer = InboundTransfer::new(frame?);
        let shared: Arc<dyn Connection> = Arc::clone(connection) as Arc<dyn Connection>;
        let mut call = match InboundCall::parse_from(transfer, shared, config.call) {
            Ok(call) => call,
            Err(error) => {
                inc_errors(ErrorKind::Parse);
                warn!(%peer, %error, "unparseable call; closing connection");
                return Err(error.into());
            }
        };
        if let Err(error) = call.record_call_received() {
            warn!(call = %call, %error, "call already marked received");
        }
        let handler = Arc::clone(handler);
        workers.spawn_blocking(move || run_handler(handler.as_ref(), call));
    }
    Ok(())
}

fn run_handler<H: CallHandler>(handler: &H, mut call: InboundCall) {
    let metrics = MethodMetrics::for_method(call.remote_method());
    if let Err(error) = call.record_handling_started(&metrics.queue_time) {
        warn!(call = %call, %error, "unable to record handling start");
    }
    let fallback = call.fallback_responder();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler.handle(call, &metrics))) {
        inc_errors(ErrorKind::HandlerPanic);
        error!(call = %fallback, panic = %format_panic(panic), "call handler panicked");
        fallback.respond_failure(RpcErrorCode::FatalUnknown, &"call handler panicked");
    }
}

/// Accept connections on `listener` until `shutdown` is cancelled.
///
/// Each connection is served on its own task. Once cancelled, no new
/// connections are accepted, open connections stop reading, and the
/// function returns when their outstanding calls have been answered.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if accepting fails.
pub async fn serve<H: CallHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    config: ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let connections = TaskTracker::new();
    let result = loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => break Err(ServerError::from(error)),
            },
        };
        info!(%peer, "accepted connection");
        let handler = Arc::clone(&handler);
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            let credentials = UserCredentials::default();
            if let Err(error) =
                serve_connection(stream, peer, credentials, handler, config, shutdown).await
            {
                warn!(%peer, %error, "connection closed with error");
            }
        });
    };
    connections.close();
    connections.wait().await;
    result
}
