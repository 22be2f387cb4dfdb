//! Fixed 12-byte container header at offset 0.
//!
//! ```text
//! 0   magic             u32  0x19345601
//! 4   payload_size      u32  bytes of block data after the header region
//! 8   full_header_size  u16  header region size as written by the producer
//! 10  flags             u8   MainFlags
//! 11  checksum          u8   checksum8 over bytes 0..11
//! ```

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::checksum::checksum8;
use crate::error::{Result, SsbfError, Structure};

pub const MAGIC: u32 = 0x1934_5601;
pub const MAIN_HEADER_SIZE: usize = 12;

bitflags! {
    /// Extensions announced by the container header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MainFlags: u8 {
        const META_EXTENSION       = 0x01;
        const ENCRYPTION_EXTENSION = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainHeader {
    pub magic:            u32,
    pub payload_size:     u32,
    pub full_header_size: u16,
    pub flags:            MainFlags,
    pub checksum:         u8,
}

impl MainHeader {
    /// Decode the container header from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MAIN_HEADER_SIZE {
            return Err(SsbfError::truncated(Structure::MainHeader, 0, MAIN_HEADER_SIZE, data.len()));
        }
        let raw = &data[..MAIN_HEADER_SIZE];

        let mut reader = Cursor::new(raw);
        let magic            = reader.read_u32::<LittleEndian>()?;
        let payload_size     = reader.read_u32::<LittleEndian>()?;
        let full_header_size = reader.read_u16::<LittleEndian>()?;
        let flags            = MainFlags::from_bits_retain(reader.read_u8()?);
        let checksum         = reader.read_u8()?;

        if magic != MAGIC {
            return Err(SsbfError::BadMagic { found: magic });
        }

        let computed = checksum8(&raw[..MAIN_HEADER_SIZE - 1]);
        if computed != checksum {
            return Err(SsbfError::ChecksumMismatch {
                structure: Structure::MainHeader,
                offset:    0,
                stored:    checksum.into(),
                computed:  computed.into(),
            });
        }

        Ok(Self { magic, payload_size, full_header_size, flags, checksum })
    }

    /// Encoded size of this header, for offset arithmetic.
    pub const fn size(&self) -> usize {
        MAIN_HEADER_SIZE
    }

    pub fn uses_meta_extension(&self) -> bool {
        self.flags.contains(MainFlags::META_EXTENSION)
    }

    pub fn uses_encryption_extension(&self) -> bool {
        self.flags.contains(MainFlags::ENCRYPTION_EXTENSION)
    }
}
