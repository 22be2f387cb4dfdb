//! Plaintext inner headers recovered from the envelope.
//!
//! ```text
//! meta header   id u16, payload_size u16, payload [u8; payload_size]
//! data header   total_uncompressed_size u32, max_uncompressed_block_size u16,
//!               flags u8, reserved u8, full_data_checksum u32
//! ```
//!
//! Offsets reported in errors are relative to the start of the inner header
//! region, since these bytes never exist in plaintext on disk.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Result, SsbfError, Structure};

pub const META_HEADER_SIZE: usize = 4;
pub const DATA_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaHeader {
    pub id:           u16,
    pub payload_size: u16,
}

/// Describes the plaintext stream carried by the data blocks.
///
/// `flags` and `reserved` are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub total_uncompressed_size:     u32,
    pub max_uncompressed_block_size: u16,
    pub flags:                       u8,
    pub reserved:                    u8,
    pub full_data_checksum:          u32,
}

/// Both inner headers, with the meta payload borrowed from the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerHeaders<'a> {
    pub meta:         MetaHeader,
    pub meta_payload: &'a [u8],
    pub data:         DataHeader,
}

impl MetaHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < META_HEADER_SIZE {
            return Err(SsbfError::truncated(Structure::MetaHeader, 0, META_HEADER_SIZE, data.len()));
        }
        let mut reader = Cursor::new(&data[..META_HEADER_SIZE]);
        Ok(Self {
            id:           reader.read_u16::<LittleEndian>()?,
            payload_size: reader.read_u16::<LittleEndian>()?,
        })
    }
}

impl DataHeader {
    /// Decode a data header; `offset` is only used for error context.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if data.len() < DATA_HEADER_SIZE {
            return Err(SsbfError::truncated(Structure::DataHeader, offset, DATA_HEADER_SIZE, data.len()));
        }
        let mut reader = Cursor::new(&data[..DATA_HEADER_SIZE]);
        Ok(Self {
            total_uncompressed_size:     reader.read_u32::<LittleEndian>()?,
            max_uncompressed_block_size: reader.read_u16::<LittleEndian>()?,
            flags:                       reader.read_u8()?,
            reserved:                    reader.read_u8()?,
            full_data_checksum:          reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Parse the meta header, its payload, and the data header that follows.
pub fn parse_inner_headers(plain: &[u8]) -> Result<InnerHeaders<'_>> {
    let meta = MetaHeader::parse(plain)?;

    let payload_start = META_HEADER_SIZE;
    let payload_end   = payload_start + usize::from(meta.payload_size);
    let meta_payload  = plain.get(payload_start..payload_end).ok_or_else(|| {
        SsbfError::truncated(
            Structure::MetaPayload,
            payload_start,
            usize::from(meta.payload_size),
            plain.len() - payload_start,
        )
    })?;

    let data = DataHeader::parse(&plain[payload_end..], payload_end)?;

    Ok(InnerHeaders { meta, meta_payload, data })
}
