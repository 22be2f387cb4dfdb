//! Structural report of a container, for diagnostics.
//!
//! [`explain`] runs the same validation as decoding but stops short of
//! transforming block payloads. The resulting [`ContainerReport`] serializes
//! to JSON and renders as text via `Display`.

use std::fmt;

use serde::Serialize;

use crate::container::{Container, LayoutReport};
use crate::crypto::SecretKey;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct MainHeaderReport {
    pub magic:            u32,
    pub payload_size:     u32,
    pub full_header_size: u16,
    pub flags:            u8,
    pub flag_names:       Vec<&'static str>,
    pub checksum:         u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeReport {
    pub nonce:                   String,
    pub encryption_payload_size: u16,
    pub encrypted_header_size:   u16,
    pub flags:                   u8,
    pub flag_names:              Vec<&'static str>,
    pub checksum:                u8,
    pub mac_tag:                 Option<String>,
    pub opened:                  bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InnerReport {
    pub meta_id:                     u16,
    pub meta_payload_size:           u16,
    pub meta_payload:                String,
    pub total_uncompressed_size:     u32,
    pub max_uncompressed_block_size: u16,
    pub flags:                       u8,
    pub reserved:                    u8,
    pub full_data_checksum:          u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub block_number:     u16,
    pub offset:           usize,
    pub payload_size:     u16,
    pub payload_checksum: u16,
    pub flags:            u8,
    pub flag_names:       Vec<&'static str>,
}

/// Complete report produced by [`explain`].
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    pub main:     MainHeaderReport,
    pub envelope: EnvelopeReport,
    pub layout:   LayoutReport,
    /// Present only when a key opened the envelope.
    pub inner:    Option<InnerReport>,
    pub blocks:   Vec<BlockReport>,
}

/// Parse `data` and describe every structure found in it.
pub fn explain(data: &[u8], key: Option<&SecretKey>) -> Result<ContainerReport> {
    let container = Container::parse(data, key)?;
    let main = container.main_header();
    let env  = container.envelope();

    let main_report = MainHeaderReport {
        magic:            main.magic,
        payload_size:     main.payload_size,
        full_header_size: main.full_header_size,
        flags:            main.flags.bits(),
        flag_names:       main.flags.iter_names().map(|(n, _)| n).collect(),
        checksum:         main.checksum,
    };

    let envelope_report = EnvelopeReport {
        nonce:                   hex::encode(env.header.nonce),
        encryption_payload_size: env.header.encryption_payload_size,
        encrypted_header_size:   env.header.encrypted_header_size,
        flags:                   env.header.flags.bits(),
        flag_names:              env.header.flags.iter_names().map(|(n, _)| n).collect(),
        checksum:                env.header.checksum,
        mac_tag:                 env.mac_tag().map(hex::encode),
        opened:                  env.is_open(),
    };

    let inner = container.inner_headers().map(|h| InnerReport {
        meta_id:                     h.meta.id,
        meta_payload_size:           h.meta.payload_size,
        meta_payload:                hex::encode(h.meta_payload),
        total_uncompressed_size:     h.data.total_uncompressed_size,
        max_uncompressed_block_size: h.data.max_uncompressed_block_size,
        flags:                       h.data.flags,
        reserved:                    h.data.reserved,
        full_data_checksum:          h.data.full_data_checksum,
    });

    let blocks = container
        .blocks()
        .map(|b| {
            b.map(|b| BlockReport {
                block_number:     b.number(),
                offset:           b.offset,
                payload_size:     b.header.payload_size,
                payload_checksum: b.header.payload_checksum,
                flags:            b.header.flags.bits(),
                flag_names:       b.header.flags.iter_names().map(|(n, _)| n).collect(),
            })
        })
        .collect::<Result<_>>()?;

    Ok(ContainerReport {
        main: main_report,
        envelope: envelope_report,
        layout: container.layout(),
        inner,
        blocks,
    })
}

fn names(list: &[&str]) -> String {
    if list.is_empty() { "-".to_string() } else { list.join(" | ") }
}

impl fmt::Display for ContainerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.main;
        writeln!(f, "Main header:")?;
        writeln!(f, "  magic             {:#010x}", m.magic)?;
        writeln!(f, "  payload size      {} B", m.payload_size)?;
        writeln!(f, "  full header size  {} B", m.full_header_size)?;
        writeln!(f, "  flags             {:#04x} ({})", m.flags, names(&m.flag_names))?;
        writeln!(f, "  checksum          {:#04x}", m.checksum)?;

        let e = &self.envelope;
        writeln!(f, "Encryption header:")?;
        writeln!(f, "  nonce             {}", e.nonce)?;
        writeln!(f, "  payload size      {} B", e.encryption_payload_size)?;
        writeln!(f, "  encrypted header  {} B", e.encrypted_header_size)?;
        writeln!(f, "  flags             {:#04x} ({})", e.flags, names(&e.flag_names))?;
        writeln!(f, "  checksum          {:#04x}", e.checksum)?;
        writeln!(f, "  MAC               {}", e.mac_tag.as_deref().unwrap_or("-"))?;

        let l = &self.layout;
        if !l.payload_size_matches() {
            writeln!(f, "  warning: header declares {} B of blocks, found {} B",
                l.declared_payload_size, l.actual_payload_size)?;
        }
        if !l.full_header_size_matches() {
            writeln!(f, "  warning: header declares a {} B header region, found {} B",
                l.declared_full_header_size, l.actual_full_header_size)?;
        }

        match &self.inner {
            None => writeln!(f, "Encrypted header: {} B (no key supplied)", e.encrypted_header_size)?,
            Some(i) => {
                writeln!(f, "Meta header:")?;
                writeln!(f, "  id                {:#06x}", i.meta_id)?;
                writeln!(f, "  payload           {} B {}", i.meta_payload_size, i.meta_payload)?;
                writeln!(f, "Data header:")?;
                writeln!(f, "  uncompressed size {} B", i.total_uncompressed_size)?;
                writeln!(f, "  max block size    {} B", i.max_uncompressed_block_size)?;
                writeln!(f, "  data checksum     {:#06x}", i.full_data_checksum)?;
            }
        }

        writeln!(f, "Blocks ({}):", self.blocks.len())?;
        for b in &self.blocks {
            writeln!(f, "  #{:<5} @{:<8} {:>6} B  {}",
                b.block_number, b.offset, b.payload_size, names(&b.flag_names))?;
        }
        Ok(())
    }
}
