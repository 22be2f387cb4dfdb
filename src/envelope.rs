//! Encryption envelope: the 30-byte encryption header and the authenticated
//! blob that follows it.
//!
//! ```text
//! 0   nonce                    [u8; 24]
//! 24  encryption_payload_size  u16
//! 26  encrypted_header_size    u16
//! 28  flags                    u8   EnvelopeFlags
//! 29  checksum                 u8   checksum8 over bytes 0..29
//! 30  ciphertext               [u8; encrypted_header_size]
//! ..  tag                      [u8; 16]
//! ```
//!
//! The associated data bound by the tag is every byte of the file up to the
//! end of the encryption header (main header + encryption header).
//! Decrypted layout: 32 bytes of block key material, then the inner headers.

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use zeroize::Zeroizing;

use crate::checksum::checksum8;
use crate::crypto::{self, SecretKey, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{Result, SsbfError, Structure};

pub const ENCRYPTION_HEADER_SIZE: usize = 30;

bitflags! {
    /// Algorithms announced by the encryption header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvelopeFlags: u8 {
        const POLY1305 = 0x01;
        const CHACHA20 = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionHeader {
    pub nonce:                   [u8; NONCE_LEN],
    pub encryption_payload_size: u16,
    pub encrypted_header_size:   u16,
    pub flags:                   EnvelopeFlags,
    pub checksum:                u8,
}

impl EncryptionHeader {
    /// Decode the encryption header located at `offset` within `data`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let available = data.len().saturating_sub(offset);
        if available < ENCRYPTION_HEADER_SIZE {
            return Err(SsbfError::truncated(
                Structure::EncryptionHeader, offset, ENCRYPTION_HEADER_SIZE, available,
            ));
        }
        let raw = &data[offset..offset + ENCRYPTION_HEADER_SIZE];

        let mut reader = Cursor::new(raw);
        let mut nonce = [0u8; NONCE_LEN];
        reader.read_exact(&mut nonce)?;
        let encryption_payload_size = reader.read_u16::<LittleEndian>()?;
        let encrypted_header_size   = reader.read_u16::<LittleEndian>()?;
        let flags                   = EnvelopeFlags::from_bits_retain(reader.read_u8()?);
        let checksum                = reader.read_u8()?;

        let computed = checksum8(&raw[..ENCRYPTION_HEADER_SIZE - 1]);
        if computed != checksum {
            return Err(SsbfError::ChecksumMismatch {
                structure: Structure::EncryptionHeader,
                offset,
                stored:    checksum.into(),
                computed:  computed.into(),
            });
        }

        Ok(Self { nonce, encryption_payload_size, encrypted_header_size, flags, checksum })
    }
}

/// Material recovered by a successful envelope open.
struct OpenedEnvelope {
    block_key: SecretKey,
    plaintext: Zeroizing<Vec<u8>>,
}

/// The parsed envelope, opened when a key was supplied.
pub struct Envelope {
    pub header: EncryptionHeader,
    offset:     usize,
    tag:        Option<[u8; TAG_LEN]>,
    opened:     Option<OpenedEnvelope>,
}

impl Envelope {
    /// Parse the envelope at `offset`. With `key`, also authenticate and
    /// decrypt the encrypted header blob; without it only the public header
    /// is decoded.
    pub fn parse(data: &[u8], offset: usize, key: Option<&SecretKey>) -> Result<Self> {
        let header = EncryptionHeader::parse(data, offset)?;

        let blob_offset = offset + ENCRYPTION_HEADER_SIZE;
        let ct_len      = usize::from(header.encrypted_header_size);
        let tag_offset  = blob_offset + ct_len;

        let tag = data.get(tag_offset..tag_offset + TAG_LEN).map(|raw| {
            let mut tag = [0u8; TAG_LEN];
            tag.copy_from_slice(raw);
            tag
        });

        let opened = match key {
            None      => None,
            Some(key) => Some(Self::open(data, offset, &header, tag.as_ref(), key)?),
        };

        Ok(Self { header, offset, tag, opened })
    }

    fn open(
        data:   &[u8],
        offset: usize,
        header: &EncryptionHeader,
        tag:    Option<&[u8; TAG_LEN]>,
        key:    &SecretKey,
    ) -> Result<OpenedEnvelope> {
        let blob_offset = offset + ENCRYPTION_HEADER_SIZE;
        let ct_len      = usize::from(header.encrypted_header_size);
        let tag = tag.ok_or_else(|| SsbfError::truncated(
            Structure::EncryptedHeader,
            blob_offset,
            ct_len + TAG_LEN,
            data.len().saturating_sub(blob_offset),
        ))?;

        let ciphertext      = &data[blob_offset..blob_offset + ct_len];
        let associated_data = &data[..blob_offset];

        let plaintext = crypto::open(key, &header.nonce, tag, ciphertext, associated_data)
            .map_err(|_| SsbfError::DecryptionFailed {
                structure: Structure::EncryptedHeader,
                offset:    blob_offset,
            })?;

        if plaintext.len() < KEY_LEN {
            return Err(SsbfError::truncated(
                Structure::DerivedKey, blob_offset, KEY_LEN, plaintext.len(),
            ));
        }
        let block_key = SecretKey::from_slice(&plaintext[..KEY_LEN])?;

        Ok(OpenedEnvelope { block_key, plaintext })
    }

    /// Encoded size of the encryption header, for offset arithmetic.
    pub const fn size(&self) -> usize {
        ENCRYPTION_HEADER_SIZE
    }

    /// Absolute offset of the encryption header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn encrypted_header_size(&self) -> usize {
        usize::from(self.header.encrypted_header_size)
    }

    /// Absolute offset of the first byte after the MAC tag.
    pub fn end_offset(&self) -> usize {
        self.offset + ENCRYPTION_HEADER_SIZE + self.encrypted_header_size() + TAG_LEN
    }

    /// MAC tag, if the input is long enough to contain it.
    pub fn mac_tag(&self) -> Option<&[u8; TAG_LEN]> {
        self.tag.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// Derived key for block decryption (first 32 plaintext bytes).
    pub fn block_key(&self) -> Option<&SecretKey> {
        self.opened.as_ref().map(|o| &o.block_key)
    }

    /// Plaintext inner header region (after the derived key material).
    pub fn inner_header(&self) -> Option<&[u8]> {
        self.opened.as_ref().map(|o| &o.plaintext[KEY_LEN..])
    }

    /// Length of the decrypted blob, equal to `encrypted_header_size`.
    pub fn plaintext_len(&self) -> Option<usize> {
        self.opened.as_ref().map(|o| o.plaintext.len())
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("header", &self.header)
            .field("offset", &self.offset)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chacha20poly1305::aead::{AeadInPlace, KeyInit};
    use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

    const PREFIX: usize = 12;

    /// 12 filler bytes standing in for the main header, then a sealed envelope.
    fn sealed(key: &SecretKey, plaintext: &[u8]) -> Vec<u8> {
        let mut out = vec![0xEE; PREFIX];
        let mut hdr = [0u8; ENCRYPTION_HEADER_SIZE];
        hdr[..NONCE_LEN].copy_from_slice(&[0x5A; NONCE_LEN]);
        hdr[24..26].copy_from_slice(&(KEY_LEN as u16).to_le_bytes());
        hdr[26..28].copy_from_slice(&(plaintext.len() as u16).to_le_bytes());
        hdr[28] = (EnvelopeFlags::POLY1305 | EnvelopeFlags::CHACHA20).bits();
        hdr[29] = checksum8(&hdr[..29]);
        out.extend_from_slice(&hdr);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let mut buf = plaintext.to_vec();
        let aad = out.clone();
        let tag = cipher
            .encrypt_in_place_detached(XNonce::from_slice(&[0x5A; NONCE_LEN]), &aad, &mut buf)
            .unwrap();
        out.extend_from_slice(&buf);
        out.extend_from_slice(&tag);
        out
    }

    fn inner_plaintext() -> Vec<u8> {
        let mut p = vec![0x42; KEY_LEN];
        p.extend_from_slice(b"inner headers");
        p
    }

    #[test]
    fn header_only_without_key() {
        let key = SecretKey::new([1; KEY_LEN]);
        let data = sealed(&key, &inner_plaintext());
        let env = Envelope::parse(&data, PREFIX, None).unwrap();
        assert!(!env.is_open());
        assert_eq!(env.size(), 30);
        assert_eq!(env.encrypted_header_size(), KEY_LEN + 13);
        assert_eq!(env.end_offset(), data.len());
        assert!(env.mac_tag().is_some());
        assert!(env.block_key().is_none());
        assert!(env.header.flags.contains(EnvelopeFlags::CHACHA20));
    }

    #[test]
    fn opens_with_correct_key() {
        let key = SecretKey::new([1; KEY_LEN]);
        let data = sealed(&key, &inner_plaintext());
        let env = Envelope::parse(&data, PREFIX, Some(&key)).unwrap();
        assert_eq!(env.plaintext_len(), Some(env.encrypted_header_size()));
        assert_eq!(env.block_key().unwrap().as_bytes(), &[0x42; KEY_LEN]);
        assert_eq!(env.inner_header().unwrap(), b"inner headers");
    }

    #[test]
    fn tampered_tag_fails_without_plaintext() {
        let key = SecretKey::new([1; KEY_LEN]);
        let mut data = sealed(&key, &inner_plaintext());
        let last = data.len() - 1;
        data[last] ^= 0x01;
        assert!(matches!(
            Envelope::parse(&data, PREFIX, Some(&key)),
            Err(SsbfError::DecryptionFailed { structure: Structure::EncryptedHeader, offset: 42 })
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let key = SecretKey::new([1; KEY_LEN]);
        let data = sealed(&key, &inner_plaintext());
        let other = SecretKey::new([2; KEY_LEN]);
        assert!(matches!(
            Envelope::parse(&data, PREFIX, Some(&other)),
            Err(SsbfError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn associated_data_covers_preceding_header() {
        let key = SecretKey::new([1; KEY_LEN]);
        let mut data = sealed(&key, &inner_plaintext());
        data[0] ^= 0xFF;
        assert!(matches!(
            Envelope::parse(&data, PREFIX, Some(&key)),
            Err(SsbfError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn truncated_blob_with_key() {
        let key = SecretKey::new([1; KEY_LEN]);
        let data = sealed(&key, &inner_plaintext());
        let cut = &data[..data.len() - 4];
        assert!(matches!(
            Envelope::parse(cut, PREFIX, Some(&key)),
            Err(SsbfError::TruncatedInput { structure: Structure::EncryptedHeader, .. })
        ));
    }

    #[test]
    fn short_plaintext_has_no_key_material() {
        let key = SecretKey::new([1; KEY_LEN]);
        let data = sealed(&key, &[0u8; 16]);
        assert!(matches!(
            Envelope::parse(&data, PREFIX, Some(&key)),
            Err(SsbfError::TruncatedInput { structure: Structure::DerivedKey, .. })
        ));
    }

    #[test]
    fn header_checksum_is_checked() {
        let key = SecretKey::new([1; KEY_LEN]);
        let mut data = sealed(&key, &inner_plaintext());
        data[PREFIX + 3] ^= 0x10;
        assert!(matches!(
            Envelope::parse(&data, PREFIX, None),
            Err(SsbfError::ChecksumMismatch { structure: Structure::EncryptionHeader, offset: PREFIX, .. })
        ));
    }

    #[test]
    fn truncated_header() {
        let data = vec![0u8; PREFIX + 10];
        assert!(matches!(
            EncryptionHeader::parse(&data, PREFIX),
            Err(SsbfError::TruncatedInput { needed: 30, available: 10, .. })
        ));
    }
}
