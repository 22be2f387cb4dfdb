//! Error types for SSBF decoding.
//!
//! Every failure is terminal for the current decode attempt. Variants carry
//! the [`Structure`] that failed and, where it makes sense, the absolute byte
//! offset of that structure within the input buffer.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::header::MAGIC;

/// Result type for SSBF operations.
pub type Result<T> = std::result::Result<T, SsbfError>;

/// The on-disk structure an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    MainHeader,
    EncryptionHeader,
    EncryptedHeader,
    DerivedKey,
    MetaHeader,
    MetaPayload,
    DataHeader,
    BlockHeader,
    BlockPayload,
    DataStream,
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Structure::MainHeader       => "main header",
            Structure::EncryptionHeader => "encryption header",
            Structure::EncryptedHeader  => "encrypted header blob",
            Structure::DerivedKey       => "derived key material",
            Structure::MetaHeader       => "meta header",
            Structure::MetaPayload      => "meta payload",
            Structure::DataHeader       => "data header",
            Structure::BlockHeader      => "block header",
            Structure::BlockPayload     => "block payload",
            Structure::DataStream       => "data stream",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SsbfError {
    #[error("Truncated {structure} at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedInput {
        structure: Structure,
        offset:    usize,
        needed:    usize,
        available: usize,
    },

    #[error("Invalid magic number: expected {:#010x}, got {found:#010x}", MAGIC)]
    BadMagic { found: u32 },

    #[error("{structure} checksum mismatch at offset {offset}: stored {stored:#x}, computed {computed:#x}")]
    ChecksumMismatch {
        structure: Structure,
        offset:    usize,
        stored:    u32,
        computed:  u32,
    },

    #[error("Decryption of {structure} at offset {offset} failed")]
    DecryptionFailed { structure: Structure, offset: usize },

    #[error("Decompression of block {block_number} failed: {reason}")]
    DecompressionFailed { block_number: u16, reason: String },

    #[error("Block sequence broken at offset {offset}: expected block {expected}, found {found}")]
    SequenceMismatch { offset: usize, expected: u32, found: u16 },

    #[error("Block {block_number} is encrypted but no key was provided")]
    MissingKey { block_number: u16 },

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("Decoded size mismatch: data header declares {expected} bytes, blocks produced {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SsbfError {
    pub(crate) fn truncated(structure: Structure, offset: usize, needed: usize, available: usize) -> Self {
        SsbfError::TruncatedInput { structure, offset, needed, available }
    }
}
