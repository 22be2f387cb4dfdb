//! Sequential block stream decoder.
//!
//! Blocks are located by walking headers from the first block offset: each
//! block's position depends on the sizes of all blocks before it, so this walk
//! is inherently single-threaded. The iterator ends cleanly when the input is
//! exhausted and ends after yielding the first error otherwise.
//!
//! Block numbers must increase by exactly one from whatever number the first
//! block carries. Numbers never wrap: after block 65535 any further block is a
//! sequence error, which also keeps block nonces unique under one key.

use crate::block::{BlockHeader, DataBlock, BLOCK_HEADER_SIZE};
use crate::error::{Result, SsbfError, Structure};

#[derive(Debug, Clone)]
pub struct BlockStream<'a> {
    data:           &'a [u8],
    start:          usize,
    pos:            usize,
    previous:       Option<u16>,
    verify_payload: bool,
    done:           bool,
}

impl<'a> BlockStream<'a> {
    /// Walk blocks in `data` starting at absolute offset `start`.
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            start,
            pos: start,
            previous: None,
            verify_payload: true,
            done: false,
        }
    }

    /// Enable or disable the per-block payload checksum check (on by default).
    pub fn verify_payload_checksums(mut self, verify: bool) -> Self {
        self.verify_payload = verify;
        self
    }

    /// Rewind to the first block.
    pub fn restart(&mut self) {
        self.pos      = self.start;
        self.previous = None;
        self.done     = false;
    }

    /// Absolute offset of the next block header to be read.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_block(&mut self) -> Result<DataBlock<'a>> {
        let offset = self.pos;
        let rest   = &self.data[offset..];
        let header = BlockHeader::parse(rest, offset)?;

        let payload_len = usize::from(header.payload_size);
        let payload = rest
            .get(BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + payload_len)
            .ok_or_else(|| SsbfError::truncated(
                Structure::BlockPayload,
                offset + BLOCK_HEADER_SIZE,
                payload_len,
                rest.len() - BLOCK_HEADER_SIZE,
            ))?;

        let block = DataBlock { header, offset, payload };
        if self.verify_payload {
            block.verify_payload_checksum()?;
        }

        if let Some(prev) = self.previous {
            let expected = u32::from(prev) + 1;
            if u32::from(block.number()) != expected {
                return Err(SsbfError::SequenceMismatch {
                    offset,
                    expected,
                    found: block.number(),
                });
            }
        }

        self.previous = Some(block.number());
        self.pos     += block.span();
        Ok(block)
    }
}

impl<'a> Iterator for BlockStream<'a> {
    type Item = Result<DataBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.data.len() {
            return None;
        }
        match self.read_block() {
            Ok(block) => Some(Ok(block)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
