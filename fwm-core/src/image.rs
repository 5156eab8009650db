// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QFU image container format.
//!
//! A QFU image is a fixed base header, an optional extended header, and a
//! sequence of data blocks:
//!
//! ```text
//! [ base header | extended header ]   padded to one block
//! [ data block 0 ]
//! [ ... ]
//! [ data block N-1 ]                  last block may be shorter
//! ```
//!
//! The block count declared in the header includes the header block, so
//! `n_blocks == 1 + N`. With HMAC256 authentication the extended header
//! carries the image SVN, one SHA-256 digest per data block, and a final
//! HMAC-SHA-256 tag over the whole header (base + extended, tag excluded)
//! keyed by the firmware key.

use crate::config::{BLOCK_PAGES, BLOCK_SIZE, PARTITION_MAX_PAGES};
use crate::crypto::DIGEST_LEN;

/// Header magic: "QFUH".
pub const QFU_MAGIC: u32 = 0x4855_4651;

/// Size of the base header in bytes.
pub const BASE_HDR_LEN: usize = 24;

/// Largest number of data blocks an image can carry (largest partition,
/// expressed in blocks).
pub const MAX_DATA_BLOCKS: usize = PARTITION_MAX_PAGES as usize / BLOCK_PAGES;

/// Size of the buffer needed for a full header: base header plus the
/// largest HMAC256 extended header (svn, digest table, final tag).
pub const HDR_BUF_LEN: usize =
    BASE_HDR_LEN + 4 + DIGEST_LEN * MAX_DATA_BLOCKS + DIGEST_LEN;

// The header must fit in its single padded block.
const _: () = assert!(HDR_BUF_LEN <= BLOCK_SIZE);

/// Extended-header kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExtHdrKind {
    None = 0,
    Sha256 = 1,
    Hmac256 = 2,
}

/// The decoded QFU base header (little-endian, packed on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QfuHeader {
    pub vid: u16,
    pub pid: u16,
    pub pid_dfu: u16,
    /// Target partition, as an alternate-setting number (1-based).
    pub partition: u16,
    pub version: u32,
    pub block_sz: u16,
    /// Total number of blocks, header block included.
    pub n_blocks: u16,
    /// Raw extended-header type field (see [`ExtHdrKind`] wire values).
    pub ext_hdr_type: u16,
}

impl QfuHeader {
    /// Decode the base header. Returns `None` when the buffer is too short
    /// or the magic does not match.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < BASE_HDR_LEN || rd_u32(buf, 0) != QFU_MAGIC {
            return None;
        }
        Some(Self {
            vid: rd_u16(buf, 4),
            pid: rd_u16(buf, 6),
            pid_dfu: rd_u16(buf, 8),
            partition: rd_u16(buf, 10),
            version: rd_u32(buf, 12),
            block_sz: rd_u16(buf, 16),
            n_blocks: rd_u16(buf, 18),
            ext_hdr_type: rd_u16(buf, 20),
        })
    }

    /// The extended-header kind, if the type field names a known one.
    pub fn ext_kind(&self) -> Option<ExtHdrKind> {
        match self.ext_hdr_type {
            0 => Some(ExtHdrKind::None),
            1 => Some(ExtHdrKind::Sha256),
            2 => Some(ExtHdrKind::Hmac256),
            _ => None,
        }
    }

    /// Encode the base header (reserved field zero).
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&QFU_MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&self.vid.to_le_bytes());
        out[6..8].copy_from_slice(&self.pid.to_le_bytes());
        out[8..10].copy_from_slice(&self.pid_dfu.to_le_bytes());
        out[10..12].copy_from_slice(&self.partition.to_le_bytes());
        out[12..16].copy_from_slice(&self.version.to_le_bytes());
        out[16..18].copy_from_slice(&self.block_sz.to_le_bytes());
        out[18..20].copy_from_slice(&self.n_blocks.to_le_bytes());
        out[20..22].copy_from_slice(&self.ext_hdr_type.to_le_bytes());
        out[22..24].fill(0);
    }
}

/// Byte length of the HMAC256 extended header for `n_data_blocks` data
/// blocks, final tag included.
pub const fn hmac_ext_len(n_data_blocks: usize) -> usize {
    4 + DIGEST_LEN * n_data_blocks + DIGEST_LEN
}

/// Byte length of the header region covered by the HMAC tag (base header
/// plus extended header up to the tag).
pub const fn hmac_signed_len(n_data_blocks: usize) -> usize {
    BASE_HDR_LEN + 4 + DIGEST_LEN * n_data_blocks
}

/// Read-only view of the HMAC256 extended header inside a header buffer.
#[derive(Clone, Copy)]
pub struct HmacExt<'a> {
    buf: &'a [u8],
    n_data_blocks: usize,
}

impl<'a> HmacExt<'a> {
    /// `buf` is the full header buffer (base header included) and must hold
    /// at least `hmac_signed_len(n_data_blocks) + DIGEST_LEN` bytes.
    pub fn new(buf: &'a [u8], n_data_blocks: usize) -> Self {
        debug_assert!(buf.len() >= hmac_signed_len(n_data_blocks) + DIGEST_LEN);
        Self { buf, n_data_blocks }
    }

    /// Security Version Number of the image.
    pub fn svn(&self) -> u32 {
        rd_u32(self.buf, BASE_HDR_LEN)
    }

    /// SHA-256 digest of data block `i`.
    pub fn block_digest(&self, i: usize) -> [u8; DIGEST_LEN] {
        let off = BASE_HDR_LEN + 4 + i * DIGEST_LEN;
        let mut d = [0u8; DIGEST_LEN];
        d.copy_from_slice(&self.buf[off..off + DIGEST_LEN]);
        d
    }

    /// The final HMAC tag over the header.
    pub fn header_tag(&self) -> [u8; DIGEST_LEN] {
        let off = hmac_signed_len(self.n_data_blocks);
        let mut t = [0u8; DIGEST_LEN];
        t.copy_from_slice(&self.buf[off..off + DIGEST_LEN]);
        t
    }

    /// The header bytes covered by the tag.
    pub fn signed_bytes(&self) -> &'a [u8] {
        &self.buf[..hmac_signed_len(self.n_data_blocks)]
    }
}

fn rd_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn rd_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
