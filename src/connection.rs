//! Connection-side collaborators of an inbound call.
//!
//! A call keeps an [`Arc`] to the [`Connection`] it arrived on so it can read
//! the peer's address and credentials and, once answered, hand itself to the
//! connection's outbound queue. From that point the connection owns the call:
//! it writes the response views and drops the call afterwards, or drops it
//! unwritten if the connection is torn down first. Responses are delivered at
//! most once; nothing is retried.

use std::{fmt, io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, warn};

use crate::metrics::{self, ErrorKind};

/// An answered call waiting to be written.
pub trait QueuedResponse: Send + Sync + fmt::Display {
    /// Append the response to `slices` as an ordered list of views. The views
    /// borrow from the call and stay valid until it is dropped.
    fn serialize_response_to<'a>(&'a self, slices: &mut Vec<&'a [u8]>);

    /// Identifier of the call being answered.
    fn call_id(&self) -> u64;

    /// Total bytes the response occupies on the wire.
    fn response_len(&self) -> usize {
        let mut slices = Vec::new();
        self.serialize_response_to(&mut slices);
        slices.iter().map(|slice| slice.len()).sum()
    }
}

/// Identity the peer authenticated as.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UserCredentials {
    real_user: Option<String>,
}

impl UserCredentials {
    #[must_use]
    pub fn new(real_user: impl Into<String>) -> Self {
        Self {
            real_user: Some(real_user.into()),
        }
    }

    #[must_use]
    pub fn real_user(&self) -> Option<&str> { self.real_user.as_deref() }
}

/// The connection a call arrived on.
///
/// Implementations synchronise their own outbound queue; a call invokes
/// [`Connection::queue_response`] at most once.
pub trait Connection: Send + Sync + 'static {
    /// Address of the peer.
    fn remote_address(&self) -> SocketAddr;

    /// Credentials the peer presented.
    fn user_credentials(&self) -> &UserCredentials;

    /// Take ownership of an answered call for writing.
    fn queue_response(&self, call: Box<dyn QueuedResponse>);
}

/// Receiving half of a [`ChannelConnection`]'s outbound queue.
pub type ResponseQueue = mpsc::UnboundedReceiver<Box<dyn QueuedResponse>>;

/// [`Connection`] that queues answered calls on a tokio channel.
///
/// Pair it with [`write_responses`] running on the task that owns the
/// socket's write half.
#[derive(Debug)]
pub struct ChannelConnection {
    remote: SocketAddr,
    credentials: UserCredentials,
    tx: mpsc::UnboundedSender<Box<dyn QueuedResponse>>,
}

impl ChannelConnection {
    /// Create a connection and the queue its responses arrive on.
    #[must_use]
    pub fn new(remote: SocketAddr, credentials: UserCredentials) -> (Arc<Self>, ResponseQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            remote,
            credentials,
            tx,
        });
        (connection, rx)
    }
}

impl Connection for ChannelConnection {
    fn remote_address(&self) -> SocketAddr { self.remote }

    fn user_credentials(&self) -> &UserCredentials { &self.credentials }

    fn queue_response(&self, call: Box<dyn QueuedResponse>) {
        if let Err(mpsc::error::SendError(call)) = self.tx.send(call) {
            metrics::inc_errors(ErrorKind::Delivery);
            warn!(
                call = %call,
                remote = %self.remote,
                "connection closed before response was queued; dropping call"
            );
        }
    }
}

impl fmt::Debug for dyn QueuedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedResponse")
            .field("call_id", &self.call_id())
            .finish_non_exhaustive()
    }
}

/// Write every queued response to `writer` until the queue closes.
///
/// Each call is dropped as soon as its bytes are written. On a write error
/// the loop stops; calls still queued are dropped with the queue.
///
/// # Errors
///
/// Returns the first I/O error raised by `writer`.
pub async fn write_responses<W>(mut queue: ResponseQueue, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(call) = queue.recv().await {
        if let Err(error) = write_one(call.as_ref(), &mut writer).await {
            metrics::inc_errors(ErrorKind::Delivery);
            warn!(call = %call, %error, "failed to write response; closing writer");
            return Err(error);
        }
        debug!(call = %call, bytes = call.response_len(), "response written");
    }
    debug!("response queue closed");
    writer.shutdown().await
}

async fn write_one<W>(call: &dyn QueuedResponse, writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut slices = Vec::with_capacity(4);
    call.serialize_response_to(&mut slices);
    for slice in slices {
        writer.write_all(slice).await?;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use rstest::{fixture, rstest};
    use tokio::io::AsyncReadExt;

    use super::*;

    struct Canned {
        id: u64,
        parts: Vec<Vec<u8>>,
    }

    impl fmt::Display for Canned {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "canned {}", self.id) }
    }

    impl QueuedResponse for Canned {
        fn serialize_response_to<'a>(&'a self, slices: &mut Vec<&'a [u8]>) {
            slices.extend(self.parts.iter().map(Vec::as_slice));
        }

        fn call_id(&self) -> u64 { self.id }
    }

    fn canned(id: u64, parts: &[&[u8]]) -> Box<dyn QueuedResponse> {
        Box::new(Canned {
            id,
            parts: parts.iter().map(|part| part.to_vec()).collect(),
        })
    }

    #[fixture]
    fn peer() -> SocketAddr { SocketAddr::from((Ipv4Addr::LOCALHOST, 4000)) }

    #[rstest]
    fn response_len_sums_views() {
        assert_eq!(canned(1, &[b"ab", b"", b"cde"]).response_len(), 5);
    }

    #[rstest]
    #[tokio::test]
    async fn writer_drains_queue_in_order(peer: SocketAddr) {
        let (connection, queue) = ChannelConnection::new(peer, UserCredentials::new("ann"));
        assert_eq!(connection.user_credentials().real_user(), Some("ann"));
        connection.queue_response(canned(1, &[b"he", b"llo"]));
        connection.queue_response(canned(2, &[b" world"]));
        drop(connection);

        let (mut client, server) = tokio::io::duplex(64);
        write_responses(queue, server).await.expect("write");
        let mut written = Vec::new();
        client.read_to_end(&mut written).await.expect("read");
        assert_eq!(written, b"hello world");
    }

    #[rstest]
    fn queueing_after_writer_is_gone_drops_the_call(peer: SocketAddr) {
        let (connection, queue) = ChannelConnection::new(peer, UserCredentials::default());
        drop(queue);
        connection.queue_response(canned(3, &[b"lost"]));
        assert_eq!(connection.remote_address(), peer);
    }
}
