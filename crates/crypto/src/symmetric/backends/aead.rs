//! Ciphers implemented on top of the `aead` crate traits (`aes-gcm`, `chacha20poly1305`).

use aead::generic_array::typenum::Unsigned;
use aead::{AeadCore, AeadInPlace, KeyInit, Nonce};
use anyhow::{anyhow, ensure, Result};
use rand::{thread_rng, RngCore};

use super::super::{Cipher, CipherDef, EncryptionKey, InvalidKeySizeError};
use cryblocks_utils::data::Data;

/// Ciphertext layout: `nonce || encrypted payload || auth tag`
pub struct AeadCipher<C: KeyInit + AeadInPlace> {
    cipher: C,
}

impl<C: KeyInit + AeadInPlace> Cipher for AeadCipher<C> {
    fn encrypt(&self, mut plaintext: Data) -> Result<Data> {
        let plaintext_len = plaintext.len();
        let nonce = random_nonce::<C>();
        let auth_tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, &[], plaintext.as_mut())
            .map_err(|_| anyhow!("Encrypting data failed"))?;
        let mut ciphertext = plaintext;
        ciphertext.grow_region(
            Self::CIPHERTEXT_OVERHEAD_PREFIX,
            Self::CIPHERTEXT_OVERHEAD_SUFFIX,
        );
        ciphertext[..Self::CIPHERTEXT_OVERHEAD_PREFIX].copy_from_slice(nonce.as_ref());
        ciphertext[(Self::CIPHERTEXT_OVERHEAD_PREFIX + plaintext_len)..]
            .copy_from_slice(auth_tag.as_ref());
        Ok(ciphertext)
    }

    fn decrypt(&self, mut ciphertext: Data) -> Result<Data> {
        ensure!(
            ciphertext.len() >= Self::CIPHERTEXT_OVERHEAD_PREFIX + Self::CIPHERTEXT_OVERHEAD_SUFFIX,
            "Ciphertext is only {} bytes. That's too small to be decrypted, doesn't even have enough space for nonce and tag",
            ciphertext.len()
        );
        let (nonce, rest) = ciphertext
            .as_mut()
            .split_at_mut(Self::CIPHERTEXT_OVERHEAD_PREFIX);
        let (payload, auth_tag) = rest.split_at_mut(rest.len() - Self::CIPHERTEXT_OVERHEAD_SUFFIX);
        let nonce: &[u8] = nonce;
        let auth_tag: &[u8] = auth_tag;
        self.cipher
            .decrypt_in_place_detached(nonce.into(), &[], payload, auth_tag.into())
            .map_err(|_| anyhow!("Decrypting data failed"))?;
        let mut plaintext = ciphertext;
        plaintext.shrink_to_subregion(
            Self::CIPHERTEXT_OVERHEAD_PREFIX..(plaintext.len() - Self::CIPHERTEXT_OVERHEAD_SUFFIX),
        );
        Ok(plaintext)
    }

    fn ciphertext_overhead_prefix(&self) -> usize {
        Self::CIPHERTEXT_OVERHEAD_PREFIX
    }

    fn ciphertext_overhead_suffix(&self) -> usize {
        Self::CIPHERTEXT_OVERHEAD_SUFFIX
    }
}

impl<C: KeyInit + AeadInPlace> CipherDef for AeadCipher<C> {
    const KEY_SIZE: usize = C::KeySize::USIZE;
    const CIPHERTEXT_OVERHEAD_PREFIX: usize = C::NonceSize::USIZE;
    const CIPHERTEXT_OVERHEAD_SUFFIX: usize = C::TagSize::USIZE;

    fn new(encryption_key: EncryptionKey) -> Result<Self, InvalidKeySizeError> {
        let cipher =
            C::new_from_slice(encryption_key.as_bytes()).map_err(|_| InvalidKeySizeError {
                expected: Self::KEY_SIZE,
                got: encryption_key.num_bytes(),
            })?;
        Ok(Self { cipher })
    }
}

fn random_nonce<A: AeadCore>() -> Nonce<A> {
    let mut nonce = Nonce::<A>::default();
    thread_rng().fill_bytes(&mut nonce);
    nonce
}
