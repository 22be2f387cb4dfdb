//! Builds complete, valid containers for integration tests and benches.
#![allow(dead_code)]

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ssbf::checksum::{checksum16, checksum8};
use ssbf::crypto::{apply_keystream, block_nonce, SecretKey, KEY_LEN, NONCE_LEN, TAG_LEN};
use ssbf::header::MAGIC;

pub const OUTER_KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];
pub const BLOCK_KEY: [u8; KEY_LEN] = [0x5A; KEY_LEN];

#[derive(Debug, Clone)]
pub struct BlockPlan {
    pub number:    u16,
    pub plaintext: Vec<u8>,
    pub compress:  bool,
    pub encrypt:   bool,
    pub last:      bool,
}

/// A built container and the values it was built from.
pub struct Fixture {
    pub bytes:     Vec<u8>,
    pub plaintext: Vec<u8>,
    /// Absolute offset of the first block header.
    pub blocks_at: usize,
}

pub struct FixtureBuilder {
    nonce:        [u8; NONCE_LEN],
    meta_id:      u16,
    meta_payload: Vec<u8>,
    max_block:    u16,
    blocks:       Vec<BlockPlan>,
    /// Overrides the data header's stream checksum when set.
    stream_checksum: Option<u32>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self {
            nonce:           [0x24; NONCE_LEN],
            meta_id:         0x0001,
            meta_payload:    b"fw-1.2.3".to_vec(),
            max_block:       4096,
            blocks:          Vec::new(),
            stream_checksum: None,
        }
    }
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `data` into `chunk`-sized blocks numbered from zero.
    pub fn chunks(mut self, data: &[u8], chunk: usize, compress: bool, encrypt: bool) -> Self {
        let count = data.chunks(chunk).count();
        for (i, part) in data.chunks(chunk).enumerate() {
            self.blocks.push(BlockPlan {
                number:    i as u16,
                plaintext: part.to_vec(),
                compress,
                encrypt,
                last:      i + 1 == count,
            });
        }
        self
    }

    pub fn block(mut self, plan: BlockPlan) -> Self {
        self.blocks.push(plan);
        self
    }

    pub fn max_block(mut self, size: u16) -> Self {
        self.max_block = size;
        self
    }

    pub fn stream_checksum(mut self, checksum: u32) -> Self {
        self.stream_checksum = Some(checksum);
        self
    }

    pub fn build(self) -> Fixture {
        let block_key = SecretKey::new(BLOCK_KEY);

        let mut plaintext = Vec::new();
        let mut block_bytes = Vec::new();
        for plan in &self.blocks {
            plaintext.extend_from_slice(&plan.plaintext);
            push_block(&mut block_bytes, plan, &block_key);
        }

        // Derived key, meta header + payload, data header.
        let mut inner = BLOCK_KEY.to_vec();
        inner.extend_from_slice(&self.meta_id.to_le_bytes());
        inner.extend_from_slice(&(self.meta_payload.len() as u16).to_le_bytes());
        inner.extend_from_slice(&self.meta_payload);
        inner.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
        inner.extend_from_slice(&self.max_block.to_le_bytes());
        inner.push(0);
        inner.push(0);
        let stream = self.stream_checksum.unwrap_or(u32::from(checksum16(&plaintext)));
        inner.extend_from_slice(&stream.to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&(block_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&((12 + 30 + inner.len()) as u16).to_le_bytes());
        out.push(0x03);
        out.push(checksum8(&out));

        let start = out.len();
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(KEY_LEN as u16).to_le_bytes());
        out.extend_from_slice(&(inner.len() as u16).to_le_bytes());
        out.push(0x09);
        let cs = checksum8(&out[start..]);
        out.push(cs);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&OUTER_KEY));
        let tag = cipher
            .encrypt_in_place_detached(XNonce::from_slice(&self.nonce), &out, &mut inner)
            .unwrap();
        out.extend_from_slice(&inner);
        out.extend_from_slice(&tag);
        assert_eq!(tag.len(), TAG_LEN);

        let blocks_at = out.len();
        out.extend_from_slice(&block_bytes);

        Fixture { bytes: out, plaintext, blocks_at }
    }
}

fn push_block(out: &mut Vec<u8>, plan: &BlockPlan, key: &SecretKey) {
    let mut payload = plan.plaintext.clone();
    let mut flags = 0u8;
    if plan.last {
        flags |= 0x01;
    }
    if plan.compress {
        payload = lz4_flex::block::compress(&payload);
        flags |= 0x02;
    }
    if plan.encrypt {
        apply_keystream(key, &block_nonce(plan.number), &mut payload).unwrap();
        flags |= 0x04;
    }

    let start = out.len();
    out.extend_from_slice(&plan.number.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&checksum16(&payload).to_le_bytes());
    out.push(flags);
    let cs = checksum8(&out[start..]);
    out.push(cs);
    out.extend_from_slice(&payload);
}

pub fn outer_key() -> SecretKey {
    SecretKey::new(OUTER_KEY)
}

/// Deterministic, moderately compressible test data.
pub fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| b"secure streaming block format "[i % 30] ^ (i / 977) as u8).collect()
}
