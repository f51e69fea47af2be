use anyhow::{ensure, Result};
use rand::{thread_rng, RngCore};
use zeroize::Zeroize;

/// Key material for a [Cipher](super::Cipher). The bytes are wiped when the key is dropped
/// and never printed by [Debug].
pub struct EncryptionKey {
    key_data: Box<[u8]>,
}

impl EncryptionKey {
    /// Allocate a key of `num_bytes` and let `init` fill it in place, so the key material
    /// doesn't need to exist anywhere else first.
    pub fn new<E>(
        num_bytes: usize,
        init: impl FnOnce(&mut [u8]) -> Result<(), E>,
    ) -> Result<Self, E> {
        let mut key = Self {
            key_data: vec![0u8; num_bytes].into_boxed_slice(),
        };
        init(&mut key.key_data)?;
        Ok(key)
    }

    pub fn generate_random(num_bytes: usize) -> Self {
        let mut key_data = vec![0u8; num_bytes].into_boxed_slice();
        thread_rng().fill_bytes(&mut key_data);
        Self { key_data }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        ensure!(
            hex_str.len() % 2 == 0,
            "Hex string must have an even length but has length {}",
            hex_str.len(),
        );
        Self::new(hex_str.len() / 2, |data| {
            hex::decode_to_slice(hex_str, data)?;
            Ok(())
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.key_data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    pub fn num_bytes(&self) -> usize {
        self.key_data.len()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey(len={})", self.key_data.len())
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.key_data.zeroize();
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_data == other.key_data
    }
}

impl Eq for EncryptionKey {}
