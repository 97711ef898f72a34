//! In-memory [`Connection`] capturing answered calls.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard},
};

use callframe::{
    call::InboundCall,
    config::CallConfig,
    connection::{Connection, QueuedResponse, UserCredentials},
    header::ParseError,
    transfer::InboundTransfer,
};

/// Connection that keeps every queued call instead of writing it.
#[derive(Debug)]
pub struct RecordingConnection {
    remote: SocketAddr,
    credentials: UserCredentials,
    queued: Mutex<Vec<Box<dyn QueuedResponse>>>,
}

impl RecordingConnection {
    /// Connection from `127.0.0.1:7100` authenticated as `tester`.
    pub fn new() -> Arc<Self> { Self::with_remote(SocketAddr::from((Ipv4Addr::LOCALHOST, 7100))) }

    pub fn with_remote(remote: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            remote,
            credentials: UserCredentials::new("tester"),
            queued: Mutex::new(Vec::new()),
        })
    }

    fn queued(&self) -> MutexGuard<'_, Vec<Box<dyn QueuedResponse>>> {
        self.queued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of calls handed to the connection.
    pub fn queued_count(&self) -> usize { self.queued().len() }

    /// Call ids in the order the calls were queued.
    pub fn queued_call_ids(&self) -> Vec<u64> { self.queued().iter().map(|call| call.call_id()).collect() }

    /// Bytes each queued call would write, in queue order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.queued()
            .iter()
            .map(|call| {
                let mut slices = Vec::new();
                call.serialize_response_to(&mut slices);
                slices.concat()
            })
            .collect()
    }

    /// Drop every queued call.
    pub fn clear(&self) { self.queued().clear(); }
}

impl Connection for RecordingConnection {
    fn remote_address(&self) -> SocketAddr { self.remote }

    fn user_credentials(&self) -> &UserCredentials { &self.credentials }

    fn queue_response(&self, call: Box<dyn QueuedResponse>) { self.queued().push(call); }
}

/// Parse `frame` into a call bound to `connection`.
///
/// # Errors
///
/// Returns the [`ParseError`] raised by the frame.
pub fn parse_with(
    frame: Vec<u8>,
    connection: &Arc<RecordingConnection>,
    config: CallConfig,
) -> Result<InboundCall, ParseError> {
    let shared: Arc<dyn Connection> = Arc::clone(connection) as Arc<dyn Connection>;
    InboundCall::parse_from(InboundTransfer::from(frame), shared, config)
}
