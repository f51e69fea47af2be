/// XChaCha20-Poly1305 with a 24 byte random nonce and a 16 byte tag.
pub type XChaCha20Poly1305 = super::backends::aead::AeadCipher<chacha20poly1305::XChaCha20Poly1305>;
