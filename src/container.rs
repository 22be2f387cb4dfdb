//! High-level [`Container`] API, the main embedding surface.
//!
//! ```no_run
//! use ssbf::container::Container;
//! use ssbf::crypto::SecretKey;
//!
//! let data = std::fs::read("payload.ssbf")?;
//! let key  = SecretKey::from_file("payload.key")?;
//!
//! let container = Container::parse(&data, Some(&key))?;
//! let plaintext = container.decode_payload()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Without a key only the public structure is available: the container
//! header, the encryption header and the block framing. Blocks that are
//! neither encrypted nor compressed can still be decoded.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace};

use crate::block::{decode_block, DataBlock};
use crate::checksum::checksum16;
use crate::crypto::{SecretKey, TAG_LEN};
use crate::envelope::{Envelope, ENCRYPTION_HEADER_SIZE};
use crate::error::{Result, SsbfError, Structure};
use crate::header::{MainHeader, MAIN_HEADER_SIZE};
use crate::inner::{parse_inner_headers, DataHeader, InnerHeaders, MetaHeader, META_HEADER_SIZE};
use crate::perf::decode_blocks_parallel;
use crate::stream::BlockStream;

// ── DecodeOptions ─────────────────────────────────────────────────────────────

/// Configuration for decoding a container.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Check each block's stored payload checksum while framing.
    pub verify_block_checksums: bool,
    /// Check the decoded stream against the data header's size and checksum.
    pub verify_stream_checksum: bool,
    /// Run block transforms on the Rayon pool (requires the `parallel` feature).
    pub parallel:               bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_block_checksums: true,
            verify_stream_checksum: true,
            parallel:               false,
        }
    }
}

// ── LayoutReport ──────────────────────────────────────────────────────────────

/// Declared sizes from the container header next to the sizes actually found.
///
/// Purely diagnostic; a mismatch never fails a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    pub declared_payload_size:     u32,
    pub actual_payload_size:       usize,
    pub declared_full_header_size: u16,
    /// Main header + encryption header + encrypted header, MAC tag excluded.
    pub actual_full_header_size:   usize,
}

impl LayoutReport {
    pub fn payload_size_matches(&self) -> bool {
        self.declared_payload_size as usize == self.actual_payload_size
    }

    pub fn full_header_size_matches(&self) -> bool {
        usize::from(self.declared_full_header_size) == self.actual_full_header_size
    }

    pub fn is_consistent(&self) -> bool {
        self.payload_size_matches() && self.full_header_size_matches()
    }
}

// ── Container ─────────────────────────────────────────────────────────────────

pub struct Container<'a> {
    data:     &'a [u8],
    main:     MainHeader,
    envelope: Envelope,
    inner:    Option<(MetaHeader, DataHeader)>,
}

impl<'a> Container<'a> {
    /// Parse the container header, the envelope and (with `key`) the inner
    /// headers. Block framing is not touched until [`Container::blocks`].
    pub fn parse(data: &'a [u8], key: Option<&SecretKey>) -> Result<Self> {
        let main = MainHeader::parse(data)?;
        debug!(
            payload_size     = main.payload_size,
            full_header_size = main.full_header_size,
            flags            = main.flags.bits(),
            "container header"
        );

        let envelope = Envelope::parse(data, main.size(), key)?;
        debug!(
            encrypted_header_size = envelope.header.encrypted_header_size,
            flags                 = envelope.header.flags.bits(),
            opened                = envelope.is_open(),
            "encryption header"
        );

        let inner = match envelope.inner_header() {
            None        => None,
            Some(plain) => {
                let h = parse_inner_headers(plain)?;
                debug!(
                    meta_id                     = h.meta.id,
                    meta_payload_size           = h.meta.payload_size,
                    total_uncompressed_size     = h.data.total_uncompressed_size,
                    max_uncompressed_block_size = h.data.max_uncompressed_block_size,
                    "inner headers"
                );
                Some((h.meta, h.data))
            }
        };

        let blocks_offset = envelope.end_offset();
        if blocks_offset > data.len() {
            let blob_offset = envelope.offset() + ENCRYPTION_HEADER_SIZE;
            return Err(SsbfError::truncated(
                Structure::EncryptedHeader,
                blob_offset,
                envelope.encrypted_header_size() + TAG_LEN,
                data.len().saturating_sub(blob_offset),
            ));
        }

        Ok(Self { data, main, envelope, inner })
    }

    // ── Structure ────────────────────────────────────────────────────────────

    pub fn main_header(&self) -> &MainHeader {
        &self.main
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Inner headers, available only when the envelope was opened.
    pub fn inner_headers(&self) -> Option<InnerHeaders<'_>> {
        let (meta, data) = self.inner?;
        let plain = self.envelope.inner_header()?;
        let end   = META_HEADER_SIZE + usize::from(meta.payload_size);
        Some(InnerHeaders { meta, meta_payload: &plain[META_HEADER_SIZE..end], data })
    }

    pub fn data_header(&self) -> Option<&DataHeader> {
        self.inner.as_ref().map(|(_, d)| d)
    }

    /// Derived key for block decryption, available only when opened.
    pub fn block_key(&self) -> Option<&SecretKey> {
        self.envelope.block_key()
    }

    /// Absolute offset of the first data block.
    pub fn blocks_offset(&self) -> usize {
        self.envelope.end_offset()
    }

    /// Upper bound for one decompressed block.
    ///
    /// Without the data header this falls back to `u16::MAX`, the largest
    /// value the header field can hold.
    pub fn max_uncompressed_block_size(&self) -> usize {
        self.data_header()
            .map_or(usize::from(u16::MAX), |d| usize::from(d.max_uncompressed_block_size))
    }

    pub fn layout(&self) -> LayoutReport {
        LayoutReport {
            declared_payload_size:     self.main.payload_size,
            actual_payload_size:       self.data.len() - self.blocks_offset(),
            declared_full_header_size: self.main.full_header_size,
            actual_full_header_size:   MAIN_HEADER_SIZE
                + ENCRYPTION_HEADER_SIZE
                + self.envelope.encrypted_header_size(),
        }
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    /// A fresh pass over the block stream.
    pub fn blocks(&self) -> BlockStream<'a> {
        BlockStream::new(self.data, self.blocks_offset())
    }

    /// Transform one block into application bytes.
    pub fn decode_block(&self, block: &DataBlock<'_>) -> Result<Vec<u8>> {
        decode_block(block, self.block_key(), self.max_uncompressed_block_size())
    }

    /// Decode every block, in block order.
    pub fn decode_blocks(&self) -> Result<Vec<Vec<u8>>> {
        self.decode_blocks_with(&DecodeOptions::default())
    }

    pub fn decode_blocks_with(&self, opts: &DecodeOptions) -> Result<Vec<Vec<u8>>> {
        let blocks: Vec<DataBlock<'a>> = self
            .blocks()
            .verify_payload_checksums(opts.verify_block_checksums)
            .inspect(|b| {
                if let Ok(b) = b {
                    trace!(
                        block_number = b.number(),
                        offset       = b.offset,
                        payload_size = b.header.payload_size,
                        flags        = b.header.flags.bits(),
                        "block"
                    );
                }
            })
            .collect::<Result<_>>()?;
        debug!(count = blocks.len(), parallel = opts.parallel, "decoding blocks");

        let key = self.block_key();
        let max = self.max_uncompressed_block_size();
        if opts.parallel {
            decode_blocks_parallel(&blocks, key, max)
        } else {
            blocks.iter().map(|b| decode_block(b, key, max)).collect()
        }
    }

    /// Decode and concatenate the whole data stream.
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        self.decode_payload_with(&DecodeOptions::default())
    }

    /// Decode and concatenate the whole data stream. When the data header is
    /// known and `verify_stream_checksum` is set, the result must match its
    /// declared size and checksum.
    pub fn decode_payload_with(&self, opts: &DecodeOptions) -> Result<Vec<u8>> {
        let out = self.decode_blocks_with(opts)?.concat();

        if let (true, Some(d)) = (opts.verify_stream_checksum, self.data_header()) {
            verify_stream(&out, d)?;
        }
        Ok(out)
    }
}

fn verify_stream(out: &[u8], header: &DataHeader) -> Result<()> {
    let expected = u64::from(header.total_uncompressed_size);
    if out.len() as u64 != expected {
        return Err(SsbfError::SizeMismatch { expected, actual: out.len() as u64 });
    }
    let computed = u32::from(checksum16(out));
    if computed != header.full_data_checksum {
        return Err(SsbfError::ChecksumMismatch {
            structure: Structure::DataStream,
            offset:    0,
            stored:    header.full_data_checksum,
            computed,
        });
    }
    Ok(())
}

/// Load `path`, open it with the key in `key_path`, and return the decoded
/// payload.
pub fn decode_file<P: AsRef<Path>, K: AsRef<Path>>(
    path:     P,
    key_path: K,
    opts:     &DecodeOptions,
) -> Result<Vec<u8>> {
    let key  = SecretKey::from_file(key_path)?;
    let data = std::fs::read(path)?;
    Container::parse(&data, Some(&key))?.decode_payload_with(opts)
}
