//! Call headers and the frame layouts around them.
//!
//! [`CallHeader`] is the seam between the protocol-agnostic
//! [`InboundCall`](crate::call::InboundCall) and a concrete wire protocol. A
//! variant decides how the request header is laid out, which deadline the
//! client declared, and how the response header is written. Parsing only
//! records the boundaries of the request payload; the payload itself is
//! decoded later by the handler.
//!
//! The built-in [`RpcRequestHeader`] variant uses the following layouts, with
//! every length a big-endian `u32` and structured sections encoded with
//! bincode's standard configuration:
//!
//! ```text
//! request:  [total_len][header_len][RequestHeader][payload_len][payload]
//! response: [total_len][header_len][RpcResponseHeader][body_len][payload][sidecar 0]..[sidecar n]
//! ```
//!
//! `total_len` counts every byte after itself and `body_len` covers the
//! payload plus all sidecars. The response header lists the body-relative
//! start offset of each sidecar.

use std::{fmt, ops::Range, time::Duration};

use bincode::{
    Decode,
    Encode,
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    format::PayloadFormat,
    remote_method::RemoteMethod,
    timing::Deadline,
    transfer::PayloadRange,
};

/// Size of every length prefix on the wire.
pub const LENGTH_PREFIX: usize = std::mem::size_of::<u32>();

/// Reasons a frame could not be parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frame ended before a length prefix or section was complete.
    #[error("truncated frame: have {have} bytes, need {need}")]
    Truncated { have: usize, need: usize },
    /// A declared length disagrees with the bytes present.
    #[error("frame length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    /// The header bytes could not be decoded.
    #[error("malformed call header: {0}")]
    MalformedHeader(#[from] DecodeError),
    /// The header decoded from fewer bytes than its length prefix declared.
    #[error("call header length mismatch: declared {declared}, consumed {consumed}")]
    HeaderLength { declared: usize, consumed: usize },
    /// The header names a payload format this build does not understand.
    #[error("unknown payload codec {0}")]
    UnknownCodec(u8),
    /// A mandatory header field was empty.
    #[error("missing required header field: {field}")]
    MissingField { field: &'static str },
    /// A sidecar offset points outside the response body or backwards.
    #[error("invalid sidecar offset {offset} for body of {body_len} bytes")]
    InvalidSidecarOffset { offset: u32, body_len: usize },
}

/// Reasons a response could not be serialized.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The payload or header could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] EncodeError),
    /// A length does not fit the `u32` prefixes of the response frame.
    #[error("response of {len} bytes exceeds the frame length limit")]
    TooLarge { len: usize },
}

/// Output of [`CallHeader::parse`].
#[derive(Debug)]
pub struct ParsedFrame<H> {
    /// The decoded header.
    pub header: H,
    /// Service and method the call targets.
    pub remote_method: RemoteMethod,
    /// Location of the serialized request inside the frame.
    pub request: PayloadRange,
}

/// Protocol-specific header of an inbound call.
///
/// Implementations decode one request schema and report its deadline field.
/// Everything else about a call is shared.
pub trait CallHeader: fmt::Debug + Send + Sync + Sized + 'static {
    /// Decode the header at the front of `frame` and locate the request
    /// payload without deserializing it.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the frame is malformed or truncated.
    fn parse(frame: &[u8]) -> Result<ParsedFrame<Self>, ParseError>;

    /// Identifier the client uses to match the response to its request.
    fn call_id(&self) -> u64;

    /// Timeout the client declared, if any.
    fn timeout(&self) -> Option<Duration>;

    /// Format of the request payload; responses use the same format.
    fn payload_format(&self) -> PayloadFormat { PayloadFormat::default() }

    /// Upper bound on the client's deadline, measured from when the call was
    /// received. Transmission delays are not accounted for.
    ///
    /// Infinite when the client declared no timeout or the call has not been
    /// recorded as received yet.
    fn client_deadline(&self, received: Option<Instant>) -> Deadline {
        match (self.timeout(), received) {
            (Some(timeout), Some(received)) => Deadline::after(received, timeout),
            _ => Deadline::infinite(),
        }
    }

    /// Encode everything that precedes the response payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ResponseError`] if the header cannot be encoded or the
    /// frame would be too large.
    fn encode_response_header(
        &self,
        is_error: bool,
        sidecar_offsets: Vec<u32>,
        body_len: usize,
    ) -> Result<Vec<u8>, ResponseError> {
        RpcResponseHeader {
            call_id: self.call_id(),
            is_error,
            sidecar_offsets,
        }
        .encode_prefix(body_len)
    }
}

#[derive(Encode, Decode)]
struct WireRequestHeader {
    call_id: u64,
    remote_method: RemoteMethod,
    timeout_millis: u32,
    payload_format: u8,
}

/// Header of the built-in request protocol.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use callframe::{
///     header::{CallHeader, RpcRequestHeader},
///     remote_method::RemoteMethod,
/// };
///
/// let header = RpcRequestHeader::new(7).with_timeout(Duration::from_millis(250));
/// let frame = header
///     .encode_request(&RemoteMethod::new("Echo", "echo"), b"hi")
///     .expect("encode");
/// let parsed = RpcRequestHeader::parse(&frame).expect("parse");
/// assert_eq!(parsed.header, header);
/// assert_eq!(&frame[parsed.request.as_range()], b"hi");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpcRequestHeader {
    call_id: u64,
    timeout: Option<Duration>,
    payload_format: PayloadFormat,
}

impl RpcRequestHeader {
    /// Header for call `call_id` with no deadline.
    #[must_use]
    pub fn new(call_id: u64) -> Self {
        Self {
            call_id,
            timeout: None,
            payload_format: PayloadFormat::default(),
        }
    }

    /// Declare a client timeout. Zero means no deadline. Sub-millisecond
    /// precision is dropped on the wire.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    #[must_use]
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    /// Build a complete request frame carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the header cannot be encoded or a
    /// section exceeds the `u32` length limit.
    pub fn encode_request(
        &self,
        remote_method: &RemoteMethod,
        payload: &[u8],
    ) -> Result<Vec<u8>, EncodeError> {
        let timeout_millis = self.timeout.map_or(0, |timeout| {
            u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
        });
        let wire = WireRequestHeader {
            call_id: self.call_id,
            remote_method: remote_method.clone(),
            timeout_millis,
            payload_format: self.payload_format.wire_id(),
        };
        let header = encode_to_vec(&wire, config::standard())?;
        let total = LENGTH_PREFIX + header.len() + LENGTH_PREFIX + payload.len();

        let mut frame = Vec::with_capacity(LENGTH_PREFIX + total);
        frame.extend_from_slice(&encode_len(total)?.to_be_bytes());
        frame.extend_from_slice(&encode_len(header.len())?.to_be_bytes());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&encode_len(payload.len())?.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }
}

impl CallHeader for RpcRequestHeader {
    fn parse(frame: &[u8]) -> Result<ParsedFrame<Self>, ParseError> {
        let mut reader = FrameReader::new(frame);
        reader.expect_total_len()?;
        let header_len = reader.read_len()?;
        let header_range = reader.take(header_len)?;
        let wire: WireRequestHeader = decode_exact(&frame[header_range])?;
        let payload_len = reader.read_len()?;
        let request = reader.take(payload_len)?;
        reader.expect_end()?;

        let payload_format =
            PayloadFormat::try_from(wire.payload_format).map_err(ParseError::UnknownCodec)?;
        if wire.remote_method.service_name().is_empty() {
            return Err(ParseError::MissingField {
                field: "remote_method.service_name",
            });
        }
        if wire.remote_method.method_name().is_empty() {
            return Err(ParseError::MissingField {
                field: "remote_method.method_name",
            });
        }

        let header = Self {
            call_id: wire.call_id,
            timeout: (wire.timeout_millis > 0)
                .then(|| Duration::from_millis(u64::from(wire.timeout_millis))),
            payload_format,
        };
        Ok(ParsedFrame {
            header,
            remote_method: wire.remote_method,
            request: PayloadRange::new(request.start, request.end),
        })
    }

    fn call_id(&self) -> u64 { self.call_id }

    fn timeout(&self) -> Option<Duration> { self.timeout }

    fn payload_format(&self) -> PayloadFormat { self.payload_format }
}

/// Structured header preceding every response body.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RpcResponseHeader {
    /// Call id copied from the request.
    pub call_id: u64,
    /// Whether the body holds an [`ErrorStatus`](crate::status::ErrorStatus).
    pub is_error: bool,
    /// Body-relative start offset of each sidecar.
    pub sidecar_offsets: Vec<u32>,
}

impl RpcResponseHeader {
    /// Encode `[total_len][header_len][header][body_len]` for a body of
    /// `body_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ResponseError`] if encoding fails or the frame would not
    /// fit the `u32` length prefixes.
    pub fn encode_prefix(&self, body_len: usize) -> Result<Vec<u8>, ResponseError> {
        let header = encode_to_vec(self, config::standard())?;
        let total = (LENGTH_PREFIX + header.len() + LENGTH_PREFIX)
            .checked_add(body_len)
            .ok_or(ResponseError::TooLarge { len: body_len })?;
        let as_u32 = |len: usize| u32::try_from(len).map_err(|_| ResponseError::TooLarge { len });

        let mut buf = Vec::with_capacity(3 * LENGTH_PREFIX + header.len());
        buf.extend_from_slice(&as_u32(total)?.to_be_bytes());
        buf.extend_from_slice(&as_u32(header.len())?.to_be_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&as_u32(body_len)?.to_be_bytes());
        Ok(buf)
    }
}

/// Client-side view of a complete response frame.
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseFrame<'a> {
    pub header: RpcResponseHeader,
    /// Structured payload, or the encoded error envelope.
    pub payload: &'a [u8],
    /// Sidecar bytes in registration order.
    pub sidecars: Vec<&'a [u8]>,
}

impl<'a> ResponseFrame<'a> {
    /// Split a response frame at the boundaries its header declares.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the frame is malformed or truncated.
    pub fn parse(frame: &'a [u8]) -> Result<Self, ParseError> {
        let mut reader = FrameReader::new(frame);
        reader.expect_total_len()?;
        let header_len = reader.read_len()?;
        let header_range = reader.take(header_len)?;
        let header: RpcResponseHeader = decode_exact(&frame[header_range])?;
        let body_len = reader.read_len()?;
        let body = &frame[reader.take(body_len)?];
        reader.expect_end()?;

        let mut bounds = Vec::with_capacity(header.sidecar_offsets.len() + 1);
        let mut previous = 0;
        for &offset in &header.sidecar_offsets {
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            if start < previous || start > body.len() {
                return Err(ParseError::InvalidSidecarOffset {
                    offset,
                    body_len: body.len(),
                });
            }
            bounds.push(start);
            previous = start;
        }
        bounds.push(body.len());

        let payload = &body[..bounds[0]];
        let sidecars = bounds.windows(2).map(|w| &body[w[0]..w[1]]).collect();
        Ok(Self {
            header,
            payload,
            sidecars,
        })
    }
}

fn encode_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::Other("frame section exceeds u32::MAX bytes"))
}

fn decode_exact<T: Decode<()>>(bytes: &[u8]) -> Result<T, ParseError> {
    let (value, consumed) = decode_from_slice(bytes, config::standard())?;
    if consumed != bytes.len() {
        return Err(ParseError::HeaderLength {
            declared: bytes.len(),
            consumed,
        });
    }
    Ok(value)
}

/// Cursor over length-prefixed sections of a frame.
struct FrameReader<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8]) -> Self { Self { frame, pos: 0 } }

    fn remaining(&self) -> usize { self.frame.len() - self.pos }

    fn take(&mut self, len: usize) -> Result<Range<usize>, ParseError> {
        let end = self.pos.checked_add(len).ok_or(ParseError::Truncated {
            have: self.remaining(),
            need: len,
        })?;
        if end > self.frame.len() {
            return Err(ParseError::Truncated {
                have: self.remaining(),
                need: len,
            });
        }
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }

    fn read_len(&mut self) -> Result<usize, ParseError> {
        let range = self.take(LENGTH_PREFIX)?;
        let mut bytes = [0_u8; LENGTH_PREFIX];
        bytes.copy_from_slice(&self.frame[range]);
        Ok(usize::try_from(u32::from_be_bytes(bytes)).unwrap_or(usize::MAX))
    }

    fn expect_total_len(&mut self) -> Result<(), ParseError> {
        let declared = self.read_len()?;
        let actual = self.remaining();
        if declared != actual {
            return Err(ParseError::LengthMismatch { declared, actual });
        }
        Ok(())
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.remaining() != 0 {
            return Err(ParseError::LengthMismatch {
                declared: self.pos,
                actual: self.frame.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn method() -> RemoteMethod { RemoteMethod::new("Echo", "echo") }

    fn frame_with(wire: &WireRequestHeader, payload: &[u8]) -> Vec<u8> {
        let header = encode_to_vec(wire, config::standard()).expect("encode header");
        let total = 2 * LENGTH_PREFIX + header.len() + payload.len();
        let mut frame = Vec::new();
        frame.extend_from_slice(&u32::try_from(total).expect("small").to_be_bytes());
        frame.extend_from_slice(&u32::try_from(header.len()).expect("small").to_be_bytes());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&u32::try_from(payload.len()).expect("small").to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[rstest]
    fn request_range_covers_payload(method: RemoteMethod) {
        let frame = RpcRequestHeader::new(9)
            .encode_request(&method, b"payload")
            .expect("encode");
        let parsed = RpcRequestHeader::parse(&frame).expect("parse");
        assert_eq!(parsed.remote_method, method);
        assert_eq!(parsed.request.end(), frame.len());
        assert_eq!(&frame[parsed.request.as_range()], b"payload");
        assert_eq!(parsed.header.timeout(), None);
    }

    #[rstest]
    fn zero_timeout_means_no_deadline(method: RemoteMethod) {
        let frame = RpcRequestHeader::new(1)
            .with_timeout(Duration::ZERO)
            .encode_request(&method, &[])
            .expect("encode");
        let parsed = RpcRequestHeader::parse(&frame).expect("parse");
        let received = Instant::now();
        assert!(
            parsed
                .header
                .client_deadline(Some(received))
                .is_infinite()
        );
    }

    #[rstest]
    fn deadline_requires_receive_time(method: RemoteMethod) {
        let header = RpcRequestHeader::new(1).with_timeout(Duration::from_millis(5));
        let frame = header.encode_request(&method, &[]).expect("encode");
        let parsed = RpcRequestHeader::parse(&frame).expect("parse");
        assert!(parsed.header.client_deadline(None).is_infinite());
        let received = Instant::now();
        assert_eq!(
            parsed.header.client_deadline(Some(received)),
            Deadline::after(received, Duration::from_millis(5))
        );
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let wire = WireRequestHeader {
            call_id: 1,
            remote_method: RemoteMethod::new("Echo", "echo"),
            timeout_millis: 0,
            payload_format: 9,
        };
        let err = RpcRequestHeader::parse(&frame_with(&wire, b"x")).expect_err("codec 9");
        assert!(matches!(err, ParseError::UnknownCodec(9)));
    }

    #[rstest]
    #[case("", "echo", "remote_method.service_name")]
    #[case("Echo", "", "remote_method.method_name")]
    fn empty_names_are_rejected(
        #[case] service: &str,
        #[case] method: &str,
        #[case] expected: &str,
    ) {
        let wire = WireRequestHeader {
            call_id: 1,
            remote_method: RemoteMethod::new(service, method),
            timeout_millis: 0,
            payload_format: 0,
        };
        let err = RpcRequestHeader::parse(&frame_with(&wire, &[])).expect_err("empty name");
        assert!(matches!(err, ParseError::MissingField { field } if field == expected));
    }

    #[rstest]
    fn total_length_must_match(method: RemoteMethod) {
        let mut frame = RpcRequestHeader::new(1)
            .encode_request(&method, b"abc")
            .expect("encode");
        frame.push(0);
        let err = RpcRequestHeader::parse(&frame).expect_err("trailing byte");
        assert!(matches!(err, ParseError::LengthMismatch { .. }));
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    fn short_frames_are_truncated(#[case] len: usize) {
        let err = RpcRequestHeader::parse(&vec![0; len]).expect_err("too short");
        assert!(matches!(err, ParseError::Truncated { need: 4, .. }));
    }

    #[test]
    fn padded_header_is_rejected() {
        let wire = WireRequestHeader {
            call_id: 1,
            remote_method: RemoteMethod::new("Echo", "echo"),
            timeout_millis: 0,
            payload_format: 0,
        };
        let mut header = encode_to_vec(&wire, config::standard()).expect("encode");
        header.push(0);
        let mut frame = Vec::new();
        let total = 2 * LENGTH_PREFIX + header.len();
        frame.extend_from_slice(&u32::try_from(total).expect("small").to_be_bytes());
        frame.extend_from_slice(&u32::try_from(header.len()).expect("small").to_be_bytes());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&0_u32.to_be_bytes());
        let err = RpcRequestHeader::parse(&frame).expect_err("padding");
        assert!(matches!(err, ParseError::HeaderLength { .. }));
    }

    #[test]
    fn response_frame_splits_sidecars() {
        let header = RpcResponseHeader {
            call_id: 3,
            is_error: false,
            sidecar_offsets: vec![2, 5],
        };
        let mut frame = header.encode_prefix(7).expect("encode");
        frame.extend_from_slice(b"pp");
        frame.extend_from_slice(b"aaa");
        frame.extend_from_slice(b"bb");
        let parsed = ResponseFrame::parse(&frame).expect("parse");
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.payload, b"pp");
        assert_eq!(parsed.sidecars, vec![&b"aaa"[..], &b"bb"[..]]);
    }

    #[test]
    fn response_offsets_must_be_ordered() {
        let header = RpcResponseHeader {
            call_id: 3,
            is_error: false,
            sidecar_offsets: vec![3, 1],
        };
        let mut frame = header.encode_prefix(4).expect("encode");
        frame.extend_from_slice(b"abcd");
        let err = ResponseFrame::parse(&frame).expect_err("backwards offset");
        assert!(matches!(
            err,
            ParseError::InvalidSidecarOffset { offset: 1, .. }
        ));
    }
}
