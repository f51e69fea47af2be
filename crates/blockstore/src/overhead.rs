use byte_unit::Byte;
use derive_more::{Display, Error};

/// How many bytes of each physical block a store spends on its own headers,
/// nonces and tags, i.e. bytes that callers can't use.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Overhead {
    overhead: Byte,
}

impl Overhead {
    pub fn new(overhead: Byte) -> Self {
        Self { overhead }
    }

    pub fn usable_block_size_from_physical_block_size(
        &self,
        physical_block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError> {
        physical_block_size.subtract(self.overhead).ok_or_else(|| {
            InvalidBlockSizeError::new(format!(
                "Physical block size {} is smaller than overhead {}",
                physical_block_size, self.overhead
            ))
        })
    }

    /// `None` if the result doesn't fit into a [Byte].
    pub fn physical_block_size_from_usable_block_size(&self, usable_block_size: Byte) -> Option<Byte> {
        usable_block_size.add(self.overhead)
    }

    pub fn overhead(&self) -> Byte {
        self.overhead
    }
}

#[derive(Error, Display, Debug, PartialEq, Eq)]
#[display("Invalid block size: {message}")]
pub struct InvalidBlockSizeError {
    message: String,
}

impl InvalidBlockSizeError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}
