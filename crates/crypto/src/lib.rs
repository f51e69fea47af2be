//! Symmetric authenticated encryption for cryblocks.
//!
//! Every block written by the encrypting block store goes through one of the AEAD ciphers
//! in [symmetric]. Ciphers are selected statically through [symmetric::CipherDef] or at
//! runtime by name through [symmetric::lookup_cipher_async].

#![forbid(unsafe_code)]

pub mod symmetric;
