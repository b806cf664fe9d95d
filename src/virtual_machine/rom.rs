//! Immutable program images.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::MEMORY_SIZE;
use std::fmt;
use std::sync::Arc;

/// A compiled 256-byte program.
///
/// Flat binary, no header. Clones share the same buffer, so any number of
/// VMs can be loaded from one ROM; each VM copies it into its own memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Rom(Arc<[u8; MEMORY_SIZE]>);

impl Rom {
    /// Wraps an image.
    pub fn new(bytes: [u8; MEMORY_SIZE]) -> Self {
        Self(Arc::new(bytes))
    }

    /// Copies `bytes` into a ROM; the slice must be exactly 256 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VMError> {
        let image: [u8; MEMORY_SIZE] =
            bytes.try_into().map_err(|_| VMError::InvalidImageSize {
                expected: MEMORY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::new(image))
    }

    /// Returns the image.
    pub fn bytes(&self) -> &[u8; MEMORY_SIZE] {
        &self.0
    }
}

impl Default for Rom {
    fn default() -> Self {
        Self::new([0; MEMORY_SIZE])
    }
}

impl AsRef<[u8]> for Rom {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for Rom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.0.chunks(16).enumerate() {
            write!(f, "{:02X}:", row * 16)?;
            for byte in chunk {
                write!(f, " {byte:02X}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_requires_exact_size() {
        assert!(Rom::from_bytes(&[0; MEMORY_SIZE]).is_ok());
        assert_eq!(
            Rom::from_bytes(&[0; 255]),
            Err(VMError::InvalidImageSize {
                expected: 256,
                actual: 255
            })
        );
        assert!(matches!(
            Rom::from_bytes(&[0; 257]),
            Err(VMError::InvalidImageSize { actual: 257, .. })
        ));
    }

    #[test]
    fn clones_share_the_image() {
        let mut image = [0u8; MEMORY_SIZE];
        image[3] = 0xAB;
        let rom = Rom::new(image);
        let copy = rom.clone();
        assert!(Arc::ptr_eq(&rom.0, &copy.0));
        assert_eq!(copy.bytes()[3], 0xAB);
    }

    #[test]
    fn debug_is_a_hex_dump() {
        let dump = format!("{:?}", Rom::default());
        assert_eq!(dump.lines().count(), 16);
        assert!(dump.starts_with("00: 00 00"));
        assert!(dump.lines().nth(15).unwrap().starts_with("F0:"));
    }
}
