use anyhow::{bail, Result};
use async_trait::async_trait;
use derive_more::{Display, Error};
use static_assertions::const_assert;

use cryblocks_utils::data::Data;

pub trait Cipher {
    /// Encrypt `data` and return the ciphertext. If `data` has
    /// [Cipher::ciphertext_overhead_prefix] bytes of prefix headroom and
    /// [Cipher::ciphertext_overhead_suffix] bytes of suffix headroom, this works without reallocating.
    fn encrypt(&self, data: Data) -> Result<Data>;

    fn decrypt(&self, data: Data) -> Result<Data>;

    fn ciphertext_overhead_prefix(&self) -> usize;
    fn ciphertext_overhead_suffix(&self) -> usize;
}

#[derive(Error, Display, Debug, PartialEq, Eq)]
#[display("Expected key size of {expected} bytes, but got {got} bytes")]
pub struct InvalidKeySizeError {
    pub expected: usize,
    pub got: usize,
}

pub trait CipherDef: Cipher + Sized {
    fn new(key: EncryptionKey) -> Result<Self, InvalidKeySizeError>;

    const KEY_SIZE: usize;

    // How many bytes a ciphertext is larger than its plaintext, before and after the payload
    const CIPHERTEXT_OVERHEAD_PREFIX: usize;
    const CIPHERTEXT_OVERHEAD_SUFFIX: usize;
}

mod backends;
mod key;


pub use key::EncryptionKey;

mod aesgcm;
pub use aesgcm::{Aes128Gcm, Aes256Gcm, DefaultNonceSize};

mod xchacha20poly1305;
pub use xchacha20poly1305::XChaCha20Poly1305;

pub const MAX_KEY_SIZE: usize = 56;
const_assert!(XChaCha20Poly1305::KEY_SIZE <= MAX_KEY_SIZE);
const_assert!(Aes256Gcm::<DefaultNonceSize>::KEY_SIZE <= MAX_KEY_SIZE);
const_assert!(Aes128Gcm::<DefaultNonceSize>::KEY_SIZE <= MAX_KEY_SIZE);

/// Names accepted by [lookup_cipher_sync], [lookup_cipher_async] and [lookup_cipher_dyn].
pub const ALL_CIPHERS: &[&str] = &["xchacha20-poly1305", "aes-256-gcm", "aes-128-gcm"];

/// Called by [lookup_cipher_async] with the cipher type matching a runtime name.
#[async_trait]
pub trait AsyncCipherCallback {
    type Result;

    async fn callback<C: CipherDef + Send + Sync + 'static>(self) -> Self::Result;
}

/// Called by [lookup_cipher_sync] with the cipher type matching a runtime name.
pub trait SyncCipherCallback {
    type Result;

    fn callback<C: CipherDef + Send + Sync + 'static>(self) -> Self::Result;
}

pub fn lookup_cipher_sync<CB>(cipher_name: &str, callback: CB) -> Result<CB::Result>
where
    CB: SyncCipherCallback,
{
    match cipher_name {
        "xchacha20-poly1305" => Ok(callback.callback::<XChaCha20Poly1305>()),
        "aes-256-gcm" => Ok(callback.callback::<Aes256Gcm>()),
        "aes-128-gcm" => Ok(callback.callback::<Aes128Gcm>()),
        _ => bail!("Unknown cipher: {}", cipher_name),
    }
}

pub async fn lookup_cipher_async<CB>(cipher_name: &str, callback: CB) -> Result<CB::Result>
where
    CB: AsyncCipherCallback + Send,
{
    match cipher_name {
        "xchacha20-poly1305" => Ok(callback.callback::<XChaCha20Poly1305>().await),
        "aes-256-gcm" => Ok(callback.callback::<Aes256Gcm>().await),
        "aes-128-gcm" => Ok(callback.callback::<Aes128Gcm>().await),
        _ => bail!("Unknown cipher: {}", cipher_name),
    }
}

/// Look up a cipher by name and instantiate it behind a trait object.
/// `encryption_key` is called with the key size the cipher needs.
pub fn lookup_cipher_dyn(
    cipher_name: &str,
    encryption_key: impl FnOnce(usize) -> EncryptionKey,
) -> Result<Box<dyn Cipher + Send + Sync>> {
    struct DynCallback<K: FnOnce(usize) -> EncryptionKey> {
        encryption_key: K,
    }
    impl<K: FnOnce(usize) -> EncryptionKey> SyncCipherCallback for DynCallback<K> {
        type Result = Result<Box<dyn Cipher + Send + Sync>>;
        fn callback<C: CipherDef + Send + Sync + 'static>(self) -> Self::Result {
            let encryption_key = (self.encryption_key)(C::KEY_SIZE);
            Ok(Box::new(C::new(encryption_key)?))
        }
    }
    lookup_cipher_sync(cipher_name, DynCallback { encryption_key })?
}
