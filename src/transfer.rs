//! Owned inbound frames and the byte ranges parsed out of them.
//!
//! An [`InboundTransfer`] holds the complete bytes of one inbound message as
//! produced by the reactor. Parsing never copies the request payload out of
//! the transfer; it records a [`PayloadRange`] instead. The range is an index
//! into the transfer's buffer, so a view can only be materialised while the
//! transfer that backs it is alive and borrowed.

use std::ops::Range;

use bytes::Bytes;

/// Raw bytes of one inbound message, including its outer length prefix.
///
/// # Examples
///
/// ```
/// use callframe::transfer::InboundTransfer;
///
/// let transfer = InboundTransfer::from(vec![0, 0, 0, 1, 7]);
/// assert_eq!(transfer.len(), 5);
/// assert_eq!(transfer.data()[4], 7);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundTransfer {
    data: Bytes,
}

impl InboundTransfer {
    /// Wrap an already framed buffer.
    #[must_use]
    pub fn new(data: Bytes) -> Self { Self { data } }

    /// Borrow the whole frame.
    #[must_use]
    pub fn data(&self) -> &[u8] { &self.data }

    /// Number of bytes in the frame.
    #[must_use]
    pub fn len(&self) -> usize { self.data.len() }

    /// Whether the frame holds no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Resolve `range` against this transfer.
    ///
    /// Ranges produced by the parser always lie within the frame; a range
    /// from another transfer that does not fit yields an empty slice.
    #[must_use]
    pub fn view(&self, range: PayloadRange) -> &[u8] {
        self.data.get(range.as_range()).unwrap_or_default()
    }
}

impl From<Bytes> for InboundTransfer {
    fn from(data: Bytes) -> Self { Self::new(data) }
}

impl From<Vec<u8>> for InboundTransfer {
    fn from(data: Vec<u8>) -> Self { Self::new(Bytes::from(data)) }
}

/// Half-open byte range `[start, end)` inside an [`InboundTransfer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PayloadRange {
    start: usize,
    end: usize,
}

impl PayloadRange {
    /// Construct a range. `end` is clamped so the range is never inverted.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// First byte offset covered by the range.
    #[must_use]
    pub const fn start(&self) -> usize { self.start }

    /// Offset one past the last byte covered by the range.
    #[must_use]
    pub const fn end(&self) -> usize { self.end }

    /// Number of bytes covered.
    #[must_use]
    pub const fn len(&self) -> usize { self.end - self.start }

    /// Whether the range covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.start == self.end }

    #[must_use]
    pub fn as_range(&self) -> Range<usize> { self.start..self.end }
}
