//! Parallel block payload transform.
//!
//! Framing has to be walked in order (see [`crate::stream`]), but once the
//! blocks are known every transform is independent: the keystream nonce comes
//! from the block's own number and no block reads another's plaintext.
//! [`decode_blocks_parallel`] therefore fans the transforms out over Rayon's
//! global pool when the `parallel` feature is enabled, and runs them
//! sequentially otherwise. Output order always matches input order.

use crate::block::{decode_block, DataBlock};
use crate::crypto::SecretKey;
use crate::error::Result;

/// Decode `blocks` concurrently, returning one plaintext buffer per block in
/// the same order. If any block fails, the first error in block order is
/// returned.
pub fn decode_blocks_parallel(
    blocks:           &[DataBlock<'_>],
    key:              Option<&SecretKey>,
    max_uncompressed: usize,
) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let results: Vec<Result<Vec<u8>>> = blocks
            .par_iter()
            .map(|block| decode_block(block, key, max_uncompressed))
            .collect();

        let mut out = Vec::with_capacity(blocks.len());
        for r in results {
            out.push(r?);
        }
        Ok(out)
    }

    #[cfg(not(feature = "parallel"))]
    {
        blocks
            .iter()
            .map(|block| decode_block(block, key, max_uncompressed))
            .collect()
    }
}
