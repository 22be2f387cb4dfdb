//! Data block framing and the per-block payload transform.
//!
//! ```text
//! 0  block_number      u16
//! 2  payload_size      u16
//! 4  payload_checksum  u16  checksum16 over the raw payload as stored
//! 6  flags             u8   BlockFlags
//! 7  header_checksum   u8   checksum8 over bytes 0..7
//! 8  payload           [u8; payload_size]
//! ```
//!
//! The producer compresses first and encrypts second, so decoding runs the
//! keystream first and decompresses its output.

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::checksum::{checksum16, checksum8};
use crate::codec::decompress_block;
use crate::crypto::{apply_keystream, block_nonce, SecretKey};
use crate::error::{Result, SsbfError, Structure};

pub const BLOCK_HEADER_SIZE: usize = 8;

bitflags! {
    /// Per-block processing flags. Encryption and compression are independent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        /// Informational: the producer's final block.
        const LAST       = 0x01;
        const COMPRESSED = 0x02;
        const ENCRYPTED  = 0x04;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_number:     u16,
    pub payload_size:     u16,
    pub payload_checksum: u16,
    pub flags:            BlockFlags,
    pub header_checksum:  u8,
}

impl BlockHeader {
    /// Decode a block header from the start of `data`; `offset` is the
    /// absolute position of `data` for error context.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(SsbfError::truncated(Structure::BlockHeader, offset, BLOCK_HEADER_SIZE, data.len()));
        }
        let raw = &data[..BLOCK_HEADER_SIZE];

        let mut reader = Cursor::new(raw);
        let block_number     = reader.read_u16::<LittleEndian>()?;
        let payload_size     = reader.read_u16::<LittleEndian>()?;
        let payload_checksum = reader.read_u16::<LittleEndian>()?;
        let flags            = BlockFlags::from_bits_retain(reader.read_u8()?);
        let header_checksum  = reader.read_u8()?;

        let computed = checksum8(&raw[..BLOCK_HEADER_SIZE - 1]);
        if computed != header_checksum {
            return Err(SsbfError::ChecksumMismatch {
                structure: Structure::BlockHeader,
                offset,
                stored:    header_checksum.into(),
                computed:  computed.into(),
            });
        }

        Ok(Self { block_number, payload_size, payload_checksum, flags, header_checksum })
    }
}

/// One framed block, borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    pub header:  BlockHeader,
    /// Absolute offset of the block header.
    pub offset:  usize,
    pub payload: &'a [u8],
}

impl<'a> DataBlock<'a> {
    pub fn number(&self) -> u16 {
        self.header.block_number
    }

    /// Bytes occupied on disk: header plus payload.
    pub fn span(&self) -> usize {
        BLOCK_HEADER_SIZE + self.payload.len()
    }

    pub fn payload_offset(&self) -> usize {
        self.offset + BLOCK_HEADER_SIZE
    }

    pub fn is_last(&self) -> bool {
        self.header.flags.contains(BlockFlags::LAST)
    }

    pub fn is_encrypted(&self) -> bool {
        self.header.flags.contains(BlockFlags::ENCRYPTED)
    }

    pub fn is_compressed(&self) -> bool {
        self.header.flags.contains(BlockFlags::COMPRESSED)
    }

    /// Check the stored 16-bit checksum against the raw payload bytes.
    pub fn verify_payload_checksum(&self) -> Result<()> {
        let computed = checksum16(self.payload);
        if computed != self.header.payload_checksum {
            return Err(SsbfError::ChecksumMismatch {
                structure: Structure::BlockPayload,
                offset:    self.payload_offset(),
                stored:    self.header.payload_checksum.into(),
                computed:  computed.into(),
            });
        }
        Ok(())
    }
}

/// Turn one block's raw payload into application bytes.
///
/// Encrypted blocks need `key`, the derived block key from the envelope.
/// `max_uncompressed` bounds the output of compressed blocks.
pub fn decode_block(
    block:            &DataBlock<'_>,
    key:              Option<&SecretKey>,
    max_uncompressed: usize,
) -> Result<Vec<u8>> {
    let mut buf = block.payload.to_vec();

    if block.is_encrypted() {
        let key = key.ok_or(SsbfError::MissingKey { block_number: block.number() })?;
        apply_keystream(key, &block_nonce(block.number()), &mut buf).map_err(|_| {
            SsbfError::DecryptionFailed {
                structure: Structure::BlockPayload,
                offset:    block.payload_offset(),
            }
        })?;
    }

    if block.is_compressed() {
        buf = decompress_block(&buf, max_uncompressed).map_err(|e| SsbfError::DecompressionFailed {
            block_number: block.number(),
            reason:       e.to_string(),
        })?;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn header_bytes(number: u16, payload: &[u8], flags: BlockFlags) -> Vec<u8> {
        let mut raw = Vec::with_capacity(BLOCK_HEADER_SIZE + payload.len());
        raw.extend_from_slice(&number.to_le_bytes());
        raw.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        raw.extend_from_slice(&checksum16(payload).to_le_bytes());
        raw.push(flags.bits());
        raw.push(checksum8(&raw));
        raw.extend_from_slice(payload);
        raw
    }

    fn block(raw: &[u8]) -> DataBlock<'_> {
        let header = BlockHeader::parse(raw, 0).unwrap();
        DataBlock { header, offset: 0, payload: &raw[BLOCK_HEADER_SIZE..] }
    }

    #[test]
    fn parses_header_fields() {
        let raw = header_bytes(7, b"hello", BlockFlags::LAST | BlockFlags::COMPRESSED);
        let b = block(&raw);
        assert_eq!(b.number(), 7);
        assert_eq!(b.header.payload_size, 5);
        assert_eq!(b.span(), 13);
        assert!(b.is_last());
        assert!(b.is_compressed());
        assert!(!b.is_encrypted());
        b.verify_payload_checksum().unwrap();
    }

    #[test]
    fn header_checksum_detects_corruption() {
        let mut raw = header_bytes(1, b"abc", BlockFlags::empty());
        raw[2] ^= 0x01;
        assert!(matches!(
            BlockHeader::parse(&raw, 100),
            Err(SsbfError::ChecksumMismatch { structure: Structure::BlockHeader, offset: 100, .. })
        ));
    }

    #[test]
    fn payload_checksum_detects_corruption() {
        let mut raw = header_bytes(1, b"abcdef", BlockFlags::empty());
        raw[BLOCK_HEADER_SIZE + 2] ^= 0x80;
        let b = block(&raw);
        assert!(matches!(
            b.verify_payload_checksum(),
            Err(SsbfError::ChecksumMismatch { structure: Structure::BlockPayload, offset: 8, .. })
        ));
    }

    #[test]
    fn plain_block_passes_through() {
        let raw = header_bytes(0, b"untouched", BlockFlags::empty());
        assert_eq!(decode_block(&block(&raw), None, 0).unwrap(), b"untouched");
    }

    #[test]
    fn encrypted_block_needs_key() {
        let raw = header_bytes(3, b"secret", BlockFlags::ENCRYPTED);
        assert!(matches!(
            decode_block(&block(&raw), None, 64),
            Err(SsbfError::MissingKey { block_number: 3 })
        ));
    }

    #[test]
    fn encrypted_then_compressed_block() {
        let key = SecretKey::new([9u8; KEY_LEN]);
        let expected = b"compressible compressible compressible compressible".to_vec();
        let mut payload = lz4_flex::block::compress(&expected);
        apply_keystream(&key, &block_nonce(5), &mut payload).unwrap();

        let raw = header_bytes(5, &payload, BlockFlags::ENCRYPTED | BlockFlags::COMPRESSED);
        let out = decode_block(&block(&raw), Some(&key), 1024).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn bad_compressed_payload() {
        let raw = header_bytes(2, &[0xF0, 0xFF, 0xFF], BlockFlags::COMPRESSED);
        assert!(matches!(
            decode_block(&block(&raw), None, 1024),
            Err(SsbfError::DecompressionFailed { block_number: 2, .. })
        ));
    }
}
