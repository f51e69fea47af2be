use generic_array::typenum::U16;

// GCM with a 12 byte nonce uses it directly as the IV, a 16 byte nonce gets hashed into one.
// Nonces here are random, and the longer random nonce makes collisions less likely.
pub type DefaultNonceSize = U16;

pub type Aes128Gcm<NonceSize = DefaultNonceSize> =
    super::backends::aead::AeadCipher<aes_gcm::AesGcm<aes_gcm::aes::Aes128, NonceSize>>;

pub type Aes256Gcm<NonceSize = DefaultNonceSize> =
    super::backends::aead::AeadCipher<aes_gcm::AesGcm<aes_gcm::aes::Aes256, NonceSize>>;
