//! Run a [`CallHandler`] behind the reactor on an in-memory stream.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use bytes::BytesMut;
use callframe::{
    codec::TransferCodec,
    connection::UserCredentials,
    server::{CallHandler, DEFAULT_MAX_FRAME_LEN, ServeConfig, serve_connection},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio_util::{codec::Decoder, sync::CancellationToken};

const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Send `frames` to `handler` and collect everything written back.
///
/// # Errors
///
/// Returns an I/O error if the stream fails or the connection ends with a
/// server error.
pub async fn drive_with_frames<H: CallHandler>(
    handler: Arc<H>,
    frames: Vec<Vec<u8>>,
) -> io::Result<Vec<u8>> {
    drive_with_frames_config(handler, frames, ServeConfig::default()).await
}

/// Like [`drive_with_frames`] with explicit settings.
///
/// # Errors
///
/// Returns an I/O error if the stream fails or the connection ends with a
/// server error.
pub async fn drive_with_frames_config<H: CallHandler>(
    handler: Arc<H>,
    frames: Vec<Vec<u8>>,
    config: ServeConfig,
) -> io::Result<Vec<u8>> {
    let (mut client, server) = duplex(DEFAULT_CAPACITY);
    let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, 7200));
    let serving = tokio::spawn(serve_connection(
        server,
        peer,
        UserCredentials::new("tester"),
        handler,
        config,
        CancellationToken::new(),
    ));

    let (mut read_half, mut write_half) = tokio::io::split(&mut client);
    let writing = async {
        for frame in &frames {
            write_half.write_all(frame).await?;
        }
        write_half.shutdown().await
    };
    let mut out = Vec::new();
    let reading = read_half.read_to_end(&mut out);
    let (written, read) = tokio::join!(writing, reading);
    written?;
    read?;

    serving
        .await
        .map_err(io::Error::other)?
        .map_err(io::Error::other)?;
    Ok(out)
}

/// Split concatenated response frames on their length prefixes.
///
/// A trailing partial frame is ignored.
///
/// # Panics
///
/// Panics if a frame announces more than the reactor's default limit.
pub fn split_responses(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut codec = TransferCodec::new(DEFAULT_MAX_FRAME_LEN);
    let mut buf = BytesMut::from(bytes);
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).expect("response framing") {
        frames.push(frame.to_vec());
    }
    frames
}
