//! Length-prefixed framing for inbound transfers and responses.
//!
//! Requests and responses share one outer frame: a big-endian `u32` length
//! followed by that many bytes. [`TransferCodec`] splits a byte stream on
//! those prefixes with `tokio_util`'s [`LengthDelimitedCodec`] and yields
//! each frame with its prefix still attached, which is the layout
//! [`InboundTransfer`](crate::transfer::InboundTransfer) and
//! [`ResponseFrame`](crate::header::ResponseFrame) parse.

use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, LengthDelimitedCodec};

use crate::header::LENGTH_PREFIX;

/// Framing failures on an inbound stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The peer announced a frame larger than the configured limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    /// The stream ended part way through a frame.
    #[error("stream ended after {received} bytes of an incomplete frame")]
    Truncated {
        received: usize,
        /// Full frame length, if the prefix arrived.
        expected: Option<usize>,
    },
}

/// Splits a stream into complete length-prefixed frames.
///
/// The limit applies to the announced length, not counting the prefix.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use callframe::codec::TransferCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = TransferCodec::new(1024);
/// let mut buf = BytesMut::from(&[0, 0, 0, 2, 7, 8, 0, 0][..]);
/// let frame = codec.decode(&mut buf).expect("decode").expect("frame");
/// assert_eq!(&frame[..], &[0, 0, 0, 2, 7, 8]);
/// assert!(codec.decode(&mut buf).expect("decode").is_none());
/// ```
#[derive(Debug)]
pub struct TransferCodec {
    inner: LengthDelimitedCodec,
    max_frame_len: usize,
}

impl TransferCodec {
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        let inner = LengthDelimitedCodec::builder()
            .big_endian()
            .length_field_length(LENGTH_PREFIX)
            .length_adjustment(LENGTH_PREFIX_ADJUSTMENT)
            .num_skip(0)
            .max_frame_length(max_frame_len)
            .new_codec();
        Self {
            inner,
            max_frame_len,
        }
    }

    #[must_use]
    pub fn max_frame_len(&self) -> usize { self.max_frame_len }
}

// The prefix stays on the frame, so the codec reads it as part of the body.
const LENGTH_PREFIX_ADJUSTMENT: isize = 4;

fn announced_len(src: &[u8]) -> Option<usize> {
    let prefix = <[u8; LENGTH_PREFIX]>::try_from(src.get(..LENGTH_PREFIX)?).ok()?;
    Some(usize::try_from(u32::from_be_bytes(prefix)).unwrap_or(usize::MAX))
}

impl Decoder for TransferCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let max = self.max_frame_len;
        if let Some(len) = announced_len(src).filter(|&len| len > max) {
            return Err(FrameError::TooLarge { len, max });
        }
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(FrameError::Truncated {
                received: src.len(),
                expected: announced_len(src).map(|len| len + LENGTH_PREFIX),
            }),
        }
    }
}
