//! Errors raised while serving a connection.

use std::io;

use thiserror::Error;

use crate::{codec::FrameError, header::ParseError};

/// Reasons a connection stops being served.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Accepting or writing failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The inbound stream could not be split into frames.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    /// A frame could not be parsed; the stream cannot be resynchronised.
    #[error("unparseable call: {0}")]
    Parse(#[from] ParseError),
    /// The response writer task failed to complete.
    #[error("response writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}
