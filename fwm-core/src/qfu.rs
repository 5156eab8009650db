// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QFU: the firmware-upgrade request handler, active on every alternate
//! setting above 0 (one per partition).
//!
//! Block 0 of a Dnload transfer carries the image header (padded to one
//! block); every further block carries image data, written to flash as it
//! arrives. An empty Dnload manifests the image: the partition is marked
//! consistent, its version recorded, the target switched to it, and (with
//! authentication) the target SVN raised to the image SVN.
//!
//! Header validation, per-block hash checks and the flash commits run with
//! interrupts masked so nothing can retarget the header buffer or the
//! BL-Data shadow mid-check. The masked sections are scoped closures; every
//! early error return passes through the scope exit and re-enables
//! interrupts.

use crate::config::{AuthMode, BLOCK_PAGES, BLOCK_SIZE, PAGE_SIZE, PAGE_WORDS};
use crate::crypto::{hmac_verify, is_default_key, sha256};
use crate::dfu::{Ctx, DfuStatus, RequestHandler};
use crate::flash::{flush_prefetch, read_page, Flash, FlashRegion};
use crate::image::{ExtHdrKind, HmacExt, QfuHeader, HDR_BUF_LEN, MAX_DATA_BLOCKS};
use crate::Board;

/// Blocks occupied by the header (the header is padded to one block).
const NUM_HDR_BLOCKS: u32 = 1;

/// Facts retained from a validated header for the rest of the transfer.
#[derive(Clone, Copy, Debug)]
struct ImageInfo {
    version: u32,
    n_blocks: u32,
    n_data_blocks: u32,
    /// Image SVN; present only with the HMAC256 extended header.
    svn: Option<u32>,
}

/// The QFU DFU request handler.
pub(crate) struct QfuHandler {
    status: DfuStatus,
    /// The active alternate setting; the image header must name it.
    alt: u8,
    /// The full header (base + extended) of the image in flight. Copied out
    /// of the transport buffer before any validation.
    hdr_buf: [u8; HDR_BUF_LEN],
    image: Option<ImageInfo>,
    /// Staging buffer for one block, pre-filled with the erased-flash value
    /// so a short last block programs cleanly.
    blk_buf: [u8; BLOCK_SIZE],
}

impl QfuHandler {
    pub(crate) fn new() -> Self {
        Self {
            status: DfuStatus::Ok,
            alt: 1,
            hdr_buf: [0; HDR_BUF_LEN],
            image: None,
            blk_buf: [0; BLOCK_SIZE],
        }
    }

    fn part_idx(&self) -> usize {
        // First QFU alternate setting is 1, first partition is 0.
        (self.alt - 1) as usize
    }

    /// Validate a block expected to contain the image header.
    fn handle_hdr<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>, data: &[u8]) -> DfuStatus {
        // The host pads the header to a whole block.
        if data.len() != BLOCK_SIZE {
            return DfuStatus::ErrAddress;
        }
        // Move the header out of the transport buffer before looking at it.
        self.hdr_buf.copy_from_slice(&data[..HDR_BUF_LEN]);
        let Some(hdr) = QfuHeader::parse(&self.hdr_buf) else {
            return DfuStatus::ErrTarget;
        };
        let cfg = ctx.cfg;
        if cfg.enforce_vid && hdr.vid != cfg.vid {
            return DfuStatus::ErrTarget;
        }
        if cfg.enforce_pid && hdr.pid != cfg.pid {
            return DfuStatus::ErrTarget;
        }
        if cfg.enforce_pid_dfu && hdr.pid_dfu != cfg.pid_dfu {
            return DfuStatus::ErrTarget;
        }
        // The image must be built for the selected alternate setting.
        if hdr.partition != self.alt as u16 {
            return DfuStatus::ErrAddress;
        }
        // Hosts may legally use a smaller block size, but forcing the
        // device block size keeps the flashing path to whole pages.
        if hdr.block_sz as usize != BLOCK_SIZE {
            return DfuStatus::ErrFile;
        }
        if hdr.n_blocks == 0 {
            return DfuStatus::ErrAddress;
        }
        let n_data_blocks = hdr.n_blocks as u32 - NUM_HDR_BLOCKS;
        let part = &ctx.store.data().partitions[self.part_idx()];
        if n_data_blocks as usize > MAX_DATA_BLOCKS
            || n_data_blocks * BLOCK_PAGES as u32 > part.num_pages
        {
            return DfuStatus::ErrAddress;
        }
        let expected_ext = match ctx.cfg.auth {
            AuthMode::None => ExtHdrKind::None,
            AuthMode::Hmac256 => ExtHdrKind::Hmac256,
        };
        if hdr.ext_kind() != Some(expected_ext) {
            return DfuStatus::ErrFile;
        }
        let mut svn = None;
        if ctx.cfg.auth == AuthMode::Hmac256 {
            let bl = ctx.store.data();
            // An unprovisioned device cannot authenticate anything.
            if is_default_key(&bl.fw_key) {
                return DfuStatus::ErrFile;
            }
            let ext = HmacExt::new(&self.hdr_buf, n_data_blocks as usize);
            let target = &bl.targets[part.target_idx as usize];
            if ext.svn() < target.svn {
                return DfuStatus::ErrFile;
            }
            if !hmac_verify(&bl.fw_key, ext.signed_bytes(), &ext.header_tag()) {
                return DfuStatus::ErrFile;
            }
            svn = Some(ext.svn());
        }
        self.image = Some(ImageInfo {
            version: hdr.version,
            n_blocks: hdr.n_blocks as u32,
            n_data_blocks,
            svn,
        });
        DfuStatus::Ok
    }

    /// Validate a data block and commit it to flash.
    fn handle_blk<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        blk_num: u32,
        data: &[u8],
    ) -> DfuStatus {
        let Some(image) = self.image else {
            return DfuStatus::ErrAddress;
        };
        // Only the declared number of blocks is accepted, and only the last
        // one may be short (never long).
        if blk_num >= image.n_blocks
            || data.len() > BLOCK_SIZE
            || (blk_num + 1 < image.n_blocks && data.len() != BLOCK_SIZE)
        {
            return DfuStatus::ErrAddress;
        }
        self.blk_buf.fill(0xFF);
        self.blk_buf[..data.len()].copy_from_slice(data);
        if image.svn.is_some() {
            let ext = HmacExt::new(&self.hdr_buf, image.n_data_blocks as usize);
            let digest = sha256(&self.blk_buf[..data.len()]);
            if digest != ext.block_digest((blk_num - NUM_HDR_BLOCKS) as usize) {
                // Whatever was written so far is unauthenticated; erase the
                // partition and mark it back as consistent (but empty).
                let _ = ctx.store.sanitize(ctx.flash, ctx.board);
                return DfuStatus::ErrFile;
            }
        }
        let idx = self.part_idx();
        if blk_num == NUM_HDR_BLOCKS {
            // First data block: flag the partition inconsistent so a failed
            // upgrade gets erased at the next sanitize.
            let prepared = ctx
                .store
                .update(ctx.flash, |bl| bl.partitions[idx].is_consistent = false);
            if prepared.is_err() {
                return DfuStatus::ErrWrite;
            }
        }
        // Write the block page by page (a block can span multiple pages),
        // verifying each page after the program.
        let part = ctx.store.data().partitions[idx];
        let first = part.first_page + (blk_num - NUM_HDR_BLOCKS) * BLOCK_PAGES as u32;
        for i in 0..BLOCK_PAGES {
            let page = first + i as u32;
            let chunk = &self.blk_buf[i * PAGE_SIZE..(i + 1) * PAGE_SIZE];
            let mut words = [0u32; PAGE_WORDS];
            for (w, b) in words.iter_mut().zip(chunk.chunks_exact(4)) {
                *w = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }
            if ctx
                .flash
                .write_page(part.controller, FlashRegion::Sys, page, &words)
                .is_err()
            {
                return DfuStatus::ErrProg;
            }
            flush_prefetch(ctx.flash, part.controller);
            let mut readback = [0u8; PAGE_SIZE];
            let verified = read_page(ctx.flash, part.controller, FlashRegion::Sys, page, &mut readback)
                .is_ok()
                && readback == *chunk;
            if !verified {
                let _ = ctx.store.sanitize(ctx.flash, ctx.board);
                return DfuStatus::ErrVerify;
            }
        }
        DfuStatus::Ok
    }
}

impl RequestHandler for QfuHandler {
    fn init<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>, alt: u8) {
        self.alt = alt;
        self.image = None;
        self.status = DfuStatus::Ok;
        // Re-assert BL-Data consistency before touching any partition.
        if ctx.store.sanitize(ctx.flash, ctx.board).is_err() {
            self.status = DfuStatus::ErrUnknown;
        }
    }

    fn status(&mut self) -> (DfuStatus, u32) {
        // Blocks are committed as they arrive, so there is never a pending
        // poll interval.
        (self.status, 0)
    }

    fn clear<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>) {
        // The cleared error may be a failed upgrade; erase anything left
        // inconsistent.
        let _ = ctx.store.sanitize(ctx.flash, ctx.board);
        self.status = DfuStatus::Ok;
    }

    fn process_dnload<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
        data: &[u8],
    ) {
        self.status = critical_section::with(|_| {
            if seq == 0 {
                self.handle_hdr(ctx, data)
            } else {
                self.handle_blk(ctx, seq, data)
            }
        });
    }

    fn finalize<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
    ) -> Result<(), DfuStatus> {
        let idx = self.part_idx();
        match self.image.take() {
            Some(image) if image.n_blocks == seq => {
                let committed = ctx.store.update(ctx.flash, |bl| {
                    let t_idx = bl.partitions[idx].target_idx as usize;
                    bl.partitions[idx].is_consistent = true;
                    bl.partitions[idx].app_version = image.version;
                    bl.targets[t_idx].active_partition_idx = idx as u32;
                    if let Some(svn) = image.svn {
                        bl.targets[t_idx].svn = svn;
                    }
                });
                committed.map_err(|_| DfuStatus::ErrNotDone)
            }
            _ => {
                // Wrong number of blocks; erase the partial partition.
                let _ = ctx.store.sanitize(ctx.flash, ctx.board);
                Err(DfuStatus::ErrNotDone)
            }
        }
    }

    fn fill_upload(&mut self, _seq: u32, _out: &mut [u8]) -> usize {
        // Firmware extraction is not allowed; upload nothing.
        0
    }

    fn abort<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>) {
        self.image = None;
        let _ = ctx.store.sanitize(ctx.flash, ctx.board);
    }
}
