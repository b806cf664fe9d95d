//! Binary encoding and decoding traits for deterministic serialization.
//!
//! Used to persist VM save states: fields are written back to back in
//! declaration order, with no headers or framing, so the byte layout of a
//! `#[derive(BinaryCodec)]` struct is exactly the concatenation of its fields.
//!
//! # Binary Format
//!
//! - `u8`: single byte
//! - `bool`: single byte (0 = false, 1 = true, anything else is rejected)
//! - Arrays `[T; N]`: elements serialized sequentially without length prefix
//!
//! # Example
//!
//! ```ignore
//! use crate::types::encoding::{Decode, Encode};
//!
//! let bytes = [7u8; 4].to_bytes();
//! assert_eq!(<[u8; 4]>::from_bytes(&bytes).unwrap(), [7; 4]);
//! ```

use robovm_derive::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
///
/// Used by `Encode::to_bytes` to pre-allocate exact capacity before encoding.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Creates a new counter starting at zero.
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been counted yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new byte buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    #[error("invalid value")]
    InvalidValue,
    /// Bytes remained after the value was fully decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value from the input buffer.
    ///
    /// Advances the input slice past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }

        Ok(value)
    }
}

/// Reads exactly `N` bytes from the input, advancing the slice.
fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    let Some((head, rest)) = input.split_first_chunk::<N>() else {
        return Err(DecodeError::UnexpectedEof);
    };
    *input = rest;
    Ok(*head)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let [b] = read_array::<1>(input)?;
        Ok(b)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(input)?);
        }
        items.try_into().map_err(|_| DecodeError::InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        assert!(counter.is_empty());

        counter.write(&[1, 2, 3]);
        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn to_bytes_preallocates_exact_capacity() {
        let bytes = [1u8, 2, 3].to_bytes();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(bytes.capacity(), bytes.len());
    }

    #[test]
    fn bool_rejects_values_other_than_zero_and_one() {
        assert_eq!(bool::from_bytes(&[0]), Ok(false));
        assert_eq!(bool::from_bytes(&[1]), Ok(true));
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn array_has_no_length_prefix() {
        let arr = [9u8; 256];
        let bytes = arr.to_bytes();
        assert_eq!(bytes.len(), 256);
        assert_eq!(<[u8; 256]>::from_bytes(&bytes), Ok(arr));
    }

    #[test]
    fn unexpected_eof_on_short_input() {
        assert_eq!(u8::from_bytes(&[]), Err(DecodeError::UnexpectedEof));
        assert_eq!(
            <[u8; 4]>::from_bytes(&[1, 2, 3]),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(u8::from_bytes(&[1, 2, 3]), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn decode_advances_input() {
        let data = [0x01u8, 0x34, 0x12, 0xFF];
        let mut input = &data[..];
        assert_eq!(bool::decode(&mut input), Ok(true));
        assert_eq!(<[u8; 2]>::decode(&mut input), Ok([0x34, 0x12]));
        assert_eq!(input, &[0xFF]);
    }
}
