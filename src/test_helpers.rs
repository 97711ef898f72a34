#![cfg(test)]
//! Shared helpers for unit tests.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use crate::{
    call::InboundCall,
    config::CallConfig,
    connection::{ChannelConnection, Connection, ResponseQueue, UserCredentials},
    header::RpcRequestHeader,
    message::Message,
    remote_method::RemoteMethod,
};

/// A [`ChannelConnection`] whose response queue the test drains itself.
#[derive(Debug)]
pub struct TestConnection {
    connection: Arc<ChannelConnection>,
    queue: ResponseQueue,
}

impl TestConnection {
    /// Connection from `127.0.0.1:7100` authenticated as `tester`.
    pub fn new() -> Self {
        let (connection, queue) = ChannelConnection::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 7100)),
            UserCredentials::new("tester"),
        );
        Self { connection, queue }
    }

    pub fn shared(&self) -> Arc<dyn Connection> { Arc::clone(&self.connection) as Arc<dyn Connection> }

    /// Parse a call to `method` carrying `payload`.
    pub fn parse<M: Message>(
        &self,
        method: &RemoteMethod,
        header: RpcRequestHeader,
        payload: &M,
        config: CallConfig,
    ) -> InboundCall {
        let payload = payload.to_bytes().expect("encode payload");
        let frame = header.encode_request(method, &payload).expect("encode frame");
        InboundCall::parse_from(frame.into(), self.shared(), config).expect("parse")
    }

    /// Drain the queue, returning the bytes each call would write.
    pub fn written(&mut self) -> Vec<Vec<u8>> {
        let mut written = Vec::new();
        while let Ok(call) = self.queue.try_recv() {
            let mut slices = Vec::new();
            call.serialize_response_to(&mut slices);
            written.push(slices.concat());
        }
        written
    }
}

pub fn echo_method() -> RemoteMethod { RemoteMethod::new("Echo", "echo") }
