//! Structured payloads carried by requests, responses and error envelopes.

use bincode::{
    BorrowDecode,
    Encode,
    borrow_decode_from_slice,
    config,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

/// A value that can travel as the structured part of a call.
///
/// Every type deriving bincode's [`Encode`] and [`BorrowDecode`] implements
/// this trait through the blanket implementation below.
pub trait Message: Encode + for<'de> BorrowDecode<'de, ()> {
    /// Encode the message with bincode's standard configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the value cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Decode a message that must span `bytes` exactly.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if decoding fails or if bytes are left over.
    fn from_exact_bytes(bytes: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let (value, consumed) = borrow_decode_from_slice(bytes, config::standard())?;
        if consumed != bytes.len() {
            return Err(DecodeError::OtherString(format!(
                "{} trailing bytes after message",
                bytes.len() - consumed
            )));
        }
        Ok(value)
    }
}

impl<T> Message for T where for<'de> T: Encode + BorrowDecode<'de, ()> {}
