//! Out-of-band binary buffers appended to a response.
//!
//! Large binary payloads can be attached to a call as sidecars instead of
//! being embedded in the structured response. Sidecars are written after the
//! structured payload, in registration order, without being copied. The
//! handler refers to them from its response message by [`SidecarIndex`]; the
//! registry never interprets their content.

use std::slice;

use bytes::Bytes;
use derive_more::{Display, From, Into};
use thiserror::Error;

/// Default cap on sidecars attached to a single response.
pub const MAX_SIDECARS: usize = 10;

/// A buffer attached to a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcSidecar(Bytes);

impl RpcSidecar {
    /// Take ownership of `data`.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self { Self(data.into()) }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] { &self.0 }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<Vec<u8>> for RpcSidecar {
    fn from(data: Vec<u8>) -> Self { Self::new(data) }
}

impl From<Bytes> for RpcSidecar {
    fn from(data: Bytes) -> Self { Self(data) }
}

/// Zero-based position of a sidecar within its response.
///
/// # Examples
///
/// ```
/// use callframe::sidecar::SidecarIndex;
/// let index = SidecarIndex::new(2);
/// assert_eq!(index.get(), 2);
/// assert_eq!(index.to_string(), "2");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct SidecarIndex(usize);

impl SidecarIndex {
    #[must_use]
    pub const fn new(value: usize) -> Self { Self(value) }

    #[must_use]
    pub const fn get(self) -> usize { self.0 }
}

/// Errors returned when attaching sidecars.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SidecarError {
    /// The registry already holds its maximum number of sidecars.
    #[error("all {limit} available sidecars already used")]
    LimitExceeded { limit: usize },
}

/// Append-only list of sidecars owned by one call.
#[derive(Debug)]
pub struct SidecarRegistry {
    sidecars: Vec<RpcSidecar>,
    limit: usize,
}

impl SidecarRegistry {
    /// Create an empty registry accepting at most `limit` sidecars.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            sidecars: Vec::new(),
            limit,
        }
    }

    /// Append `sidecar`, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::LimitExceeded`] when the registry is full. The
    /// sidecar is dropped in that case.
    pub fn add(&mut self, sidecar: RpcSidecar) -> Result<SidecarIndex, SidecarError> {
        if self.sidecars.len() >= self.limit {
            return Err(SidecarError::LimitExceeded { limit: self.limit });
        }
        self.sidecars.push(sidecar);
        Ok(SidecarIndex(self.sidecars.len() - 1))
    }

    #[must_use]
    pub fn len(&self) -> usize { self.sidecars.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.sidecars.is_empty() }

    pub fn iter(&self) -> slice::Iter<'_, RpcSidecar> { self.sidecars.iter() }

    /// Combined length of every sidecar.
    #[must_use]
    pub fn total_len(&self) -> usize { self.sidecars.iter().map(RpcSidecar::len).sum() }

    /// Start offset of each sidecar relative to the response body, given the
    /// length of the structured payload that precedes them.
    ///
    /// Returns `None` if an offset does not fit in `u32`.
    #[must_use]
    pub fn offsets(&self, payload_len: usize) -> Option<Vec<u32>> {
        let mut offsets = Vec::with_capacity(self.sidecars.len());
        let mut next = payload_len;
        for sidecar in &self.sidecars {
            offsets.push(u32::try_from(next).ok()?);
            next = next.checked_add(sidecar.len())?;
        }
        Some(offsets)
    }
}

impl Default for SidecarRegistry {
    fn default() -> Self { Self::with_limit(MAX_SIDECARS) }
}

impl<'a> IntoIterator for &'a SidecarRegistry {
    type Item = &'a RpcSidecar;
    type IntoIter = slice::Iter<'a, RpcSidecar>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
