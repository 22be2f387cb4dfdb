//! XChaCha20-Poly1305 envelope opening and XChaCha20 block keystreams.
//!
//! Envelope: XChaCha20-Poly1305 (IETF), 24-byte nonce, detached 16-byte tag.
//! Blocks:   raw XChaCha20, counter 0, nonce = block_number (LE u16) || 22 zero bytes.
//!
//! Block payloads carry no authenticator of their own.

use std::fmt;
use std::path::Path;

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::{Result, SsbfError};

/// Byte length of every symmetric key used by the format.
pub const KEY_LEN: usize = 32;
/// Byte length of an XChaCha20 nonce.
pub const NONCE_LEN: usize = 24;
/// Byte length of the Poly1305 tag following the encrypted header.
pub const TAG_LEN: usize = 16;

/// Distinct block nonces available under one derived key.
///
/// Only the block number feeds the nonce, so a producer must never emit more
/// than this many blocks per key.
pub const MAX_BLOCKS_PER_KEY: usize = 1 << 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Authentication failed: wrong key or corrupted data")]
    AuthenticationFailed,
    #[error("Keystream exhausted")]
    KeystreamExhausted,
}

/// A 32-byte symmetric key, wiped from memory on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; KEY_LEN]>);

impl SecretKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(SsbfError::InvalidKey { expected: KEY_LEN, actual: bytes.len() });
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Load a raw key file. Only the first 32 bytes are used.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = Zeroizing::new(std::fs::read(path)?);
        if contents.len() < KEY_LEN {
            return Err(SsbfError::InvalidKey { expected: KEY_LEN, actual: contents.len() });
        }
        Self::from_slice(&contents[..KEY_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Authenticate and decrypt a detached-tag XChaCha20-Poly1305 message.
///
/// No plaintext is returned unless the tag verifies.
pub fn open(
    key:             &SecretKey,
    nonce:           &[u8; NONCE_LEN],
    tag:             &[u8; TAG_LEN],
    ciphertext:      &[u8],
    associated_data: &[u8],
) -> std::result::Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            associated_data,
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(buffer)
}

/// Nonce for block `block_number`: the number in little-endian, rest zero.
pub fn block_nonce(block_number: u16) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..2].copy_from_slice(&block_number.to_le_bytes());
    nonce
}

/// XOR `data` in place with the XChaCha20 keystream. Encrypts and decrypts.
pub fn apply_keystream(
    key:   &SecretKey,
    nonce: &[u8; NONCE_LEN],
    data:  &mut [u8],
) -> std::result::Result<(), CryptoError> {
    let mut cipher = XChaCha20::new(
        chacha20::Key::from_slice(key.as_bytes()),
        chacha20::XNonce::from_slice(nonce),
    );
    cipher
        .try_apply_keystream(data)
        .map_err(|_| CryptoError::KeystreamExhausted)
}
