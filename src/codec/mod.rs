//! Block compression: raw LZ4 block format.
//!
//! Blocks carry no size prefix and no frame header. The data header's
//! `max_uncompressed_block_size` is the only size information available, so
//! decompression runs into a buffer of exactly that many bytes and fails if
//! the block would expand beyond it.

use lz4_flex::block::DecompressError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed block exceeds the {limit}-byte limit")]
    OutputTooLarge { limit: usize },
}

/// Decompress one LZ4 block into at most `max_output` bytes.
pub fn decompress_block(data: &[u8], max_output: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![0u8; max_output];
    let written = lz4_flex::block::decompress_into(data, &mut out).map_err(|e| match e {
        DecompressError::OutputTooSmall { .. } => CodecError::OutputTooLarge { limit: max_output },
        other => CodecError::Decompression(other.to_string()),
    })?;
    out.truncate(written);
    Ok(out)
}
