//! BSD-style rotate-and-accumulate checksums.
//!
//! Every SSBF header ends with an 8-bit checksum over the bytes before it,
//! and every data block carries a 16-bit checksum over its raw payload.
//! These are corruption detectors only; they offer no protection against
//! deliberate tampering.

/// 8-bit BSD checksum.
#[inline]
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |cs, &b| cs.rotate_right(1).wrapping_add(b))
}

/// 16-bit BSD checksum.
#[inline]
pub fn checksum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |cs, &b| cs.rotate_right(1).wrapping_add(u16::from(b)))
}
