//! Payload formats a request header can announce.
//!
//! The header names the format of the request payload with a single byte so
//! the parser can reject frames it could never decode before any handler
//! runs. Responses reuse the format of the request they answer.
use bincode::error::{DecodeError, EncodeError};

use crate::message::Message;

/// Serialization formats understood by `callframe`.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    /// `bincode` with its standard configuration.
    #[default]
    Bincode,
}

impl PayloadFormat {
    /// Byte identifying the format on the wire.
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        match self {
            PayloadFormat::Bincode => 0,
        }
    }

    /// Serialize a message into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    pub fn serialize<M: Message>(self, value: &M) -> Result<Vec<u8>, EncodeError> {
        match self {
            PayloadFormat::Bincode => value.to_bytes(),
        }
    }

    /// Deserialize a message occupying all of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if deserialization fails.
    pub fn deserialize<M: Message>(self, bytes: &[u8]) -> Result<M, DecodeError> {
        match self {
            PayloadFormat::Bincode => M::from_exact_bytes(bytes),
        }
    }
}

impl TryFrom<u8> for PayloadFormat {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PayloadFormat::Bincode),
            other => Err(other),
        }
    }
}
