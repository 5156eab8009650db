// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader data (BL-Data): the persistent metadata record of the device.
//!
//! BL-Data lives in a dedicated flash section of two consecutive pages, each
//! holding one CRC-protected copy of the record: the main copy and the
//! backup copy. The backup copy exists to recover from power loss during an
//! update, which may corrupt an entire page. At any instant at least one
//! copy is valid.
//!
//! The record layout within a page:
//!
//! ```text
//! ----------------------------------
//! |       Shadowed trim codes      |
//! ----------------------------------
//! |           ROM version          |
//! ----------------------------------
//! |        Protection gap          |  pad so the rest starts on a 1-KiB
//! ----------------------------------  boundary (protection granularity)
//! | Array of partition descriptors |
//! ----------------------------------
//! |  Array of target descriptors   |
//! ----------------------------------
//! |          Firmware key          |
//! ----------------------------------
//! |         Revocation key         |
//! ----------------------------------
//! |              CRC               |  CRC-16/CCITT of the previous fields
//! ----------------------------------
//! ```
//!
//! A RAM shadow of the record is loaded from the valid flash copy at boot
//! and is authoritative between writebacks; the flash copies are
//! authoritative across resets.

use crate::config::{
    BL_DATA_BACKUP_PAGE, BL_DATA_CTRL, BL_DATA_MAIN_PAGE, BL_DATA_REGION, FPR_GRANULARITY,
    PAGE_SIZE, PARTITION_COUNT, PARTITION_DEFAULTS, ROM_VERSION, TARGET_COUNT, TARGET_DEFAULTS,
};
use crate::crypto::{crc16_ccitt, HmacKey};
use crate::flash::{flush_prefetch, read_page, Flash, FlashCtrl, FlashError, FlashRegion};
use crate::Board;

/// Number of per-frequency oscillator trim words.
pub const TRIM_CODE_COUNT: usize = 4;

/// Shadowed oscillator trim codes, one word per supported system clock
/// frequency. Opaque to this crate; computed by the board at provisioning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimCodes(pub [u32; TRIM_CODE_COUNT]);

/// A flash partition able to hold one application image for one target.
///
/// The first five fields are build-time constants replicated into flash for
/// fast access; only `is_consistent` and `app_version` ever change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Index of the target this partition belongs to.
    pub target_idx: u32,
    /// Flash controller hosting the partition.
    pub controller: FlashCtrl,
    /// First page of the partition (system region).
    pub first_page: u32,
    /// Size of the partition in pages.
    pub num_pages: u32,
    /// Application entry address of the partition.
    pub start_addr: u32,
    /// Cleared while the partition is being rewritten; a partition left
    /// inconsistent is erased at the next sanitize.
    pub is_consistent: bool,
    /// Version of the application installed in the partition.
    pub app_version: u32,
}

/// A boot target: a core able to run code from its partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    /// Index (into the global partition table) of the partition this target
    /// boots from.
    pub active_partition_idx: u32,
    /// Security Version Number. Images with a lower SVN are rejected;
    /// a successful upgrade raises it to the image's SVN.
    pub svn: u32,
}

/// The RAM shadow of the BL-Data record (CRC excluded; it is computed at
/// encode time).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlData {
    pub trim_codes: TrimCodes,
    pub rom_version: u32,
    pub partitions: [Partition; PARTITION_COUNT],
    pub targets: [Target; TARGET_COUNT],
    pub fw_key: HmacKey,
    pub rv_key: HmacKey,
}

// --- On-flash layout (byte offsets within a page) ---

pub const TRIM_CODES_OFF: usize = 0;
pub const ROM_VERSION_OFF: usize = TRIM_CODE_COUNT * 4;
/// Descriptors start on the next protection-granularity boundary so a single
/// region can hide everything below while leaving trim codes readable.
pub const PARTITIONS_OFF: usize = FPR_GRANULARITY;
pub const PARTITION_ENC_LEN: usize = 28;
pub const TARGETS_OFF: usize = PARTITIONS_OFF + PARTITION_COUNT * PARTITION_ENC_LEN;
pub const TARGET_ENC_LEN: usize = 8;
pub const FW_KEY_OFF: usize = TARGETS_OFF + TARGET_COUNT * TARGET_ENC_LEN;
pub const RV_KEY_OFF: usize = FW_KEY_OFF + 32;
pub const CRC_OFF: usize = RV_KEY_OFF + 32;
/// Size of one encoded record. The remainder of the page stays erased.
pub const ENCODED_LEN: usize = CRC_OFF + 4;

const _: () = assert!(ENCODED_LEN <= PAGE_SIZE);
const _: () = assert!(ENCODED_LEN % 4 == 0);
const _: () = assert!(ROM_VERSION_OFF + 4 <= FPR_GRANULARITY);

fn rd_u32(img: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([img[off], img[off + 1], img[off + 2], img[off + 3]])
}

fn wr_u32(img: &mut [u8], off: usize, v: u32) {
    img[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

impl BlData {
    /// The record installed at first-boot provisioning.
    pub fn initial(trim_codes: TrimCodes) -> Self {
        Self {
            trim_codes,
            rom_version: ROM_VERSION,
            partitions: PARTITION_DEFAULTS,
            targets: TARGET_DEFAULTS,
            fw_key: [0; 32],
            rv_key: [0; 32],
        }
    }

    /// Encode the record into its on-flash image, CRC included.
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut img = [0u8; ENCODED_LEN];
        for (i, &w) in self.trim_codes.0.iter().enumerate() {
            wr_u32(&mut img, TRIM_CODES_OFF + i * 4, w);
        }
        wr_u32(&mut img, ROM_VERSION_OFF, self.rom_version);
        for (i, p) in self.partitions.iter().enumerate() {
            let off = PARTITIONS_OFF + i * PARTITION_ENC_LEN;
            wr_u32(&mut img, off, p.target_idx);
            wr_u32(&mut img, off + 4, p.controller as u32);
            wr_u32(&mut img, off + 8, p.first_page);
            wr_u32(&mut img, off + 12, p.num_pages);
            wr_u32(&mut img, off + 16, p.start_addr);
            wr_u32(&mut img, off + 20, p.is_consistent as u32);
            wr_u32(&mut img, off + 24, p.app_version);
        }
        for (i, t) in self.targets.iter().enumerate() {
            let off = TARGETS_OFF + i * TARGET_ENC_LEN;
            wr_u32(&mut img, off, t.active_partition_idx);
            wr_u32(&mut img, off + 4, t.svn);
        }
        img[FW_KEY_OFF..FW_KEY_OFF + 32].copy_from_slice(&self.fw_key);
        img[RV_KEY_OFF..RV_KEY_OFF + 32].copy_from_slice(&self.rv_key);
        let crc = crc16_ccitt(&img[..CRC_OFF]) as u32;
        wr_u32(&mut img, CRC_OFF, crc);
        img
    }

    /// Decode a record from its on-flash image. The image must have been
    /// validated with [`image_valid`] first.
    pub fn decode(img: &[u8]) -> Self {
        let mut trim = [0u32; TRIM_CODE_COUNT];
        for (i, w) in trim.iter_mut().enumerate() {
            *w = rd_u32(img, TRIM_CODES_OFF + i * 4);
        }
        let mut partitions = PARTITION_DEFAULTS;
        for (i, p) in partitions.iter_mut().enumerate() {
            let off = PARTITIONS_OFF + i * PARTITION_ENC_LEN;
            *p = Partition {
                target_idx: rd_u32(img, off),
                controller: if rd_u32(img, off + 4) == 1 { FlashCtrl::C1 } else { FlashCtrl::C0 },
                first_page: rd_u32(img, off + 8),
                num_pages: rd_u32(img, off + 12),
                start_addr: rd_u32(img, off + 16),
                is_consistent: rd_u32(img, off + 20) != 0,
                app_version: rd_u32(img, off + 24),
            };
        }
        let mut targets = TARGET_DEFAULTS;
        for (i, t) in targets.iter_mut().enumerate() {
            let off = TARGETS_OFF + i * TARGET_ENC_LEN;
            *t = Target {
                active_partition_idx: rd_u32(img, off),
                svn: rd_u32(img, off + 4),
            };
        }
        let mut fw_key = [0u8; 32];
        fw_key.copy_from_slice(&img[FW_KEY_OFF..FW_KEY_OFF + 32]);
        let mut rv_key = [0u8; 32];
        rv_key.copy_from_slice(&img[RV_KEY_OFF..RV_KEY_OFF + 32]);
        Self {
            trim_codes: TrimCodes(trim),
            rom_version: rd_u32(img, ROM_VERSION_OFF),
            partitions,
            targets,
            fw_key,
            rv_key,
        }
    }
}

/// Check a page image against its stored CRC. The CRC word carries the
/// CRC-16 in its low half; the upper half must be zero.
pub fn image_valid(img: &[u8]) -> bool {
    img.len() >= ENCODED_LEN && rd_u32(img, CRC_OFF) == crc16_ccitt(&img[..CRC_OFF]) as u32
}

/// The BL-Data store: owns the RAM shadow and mediates every durable
/// mutation of the record.
pub struct BlDataStore {
    shadow: BlData,
}

impl BlDataStore {
    /// Load the store from flash, running the full sanitize protocol.
    ///
    /// On a blank BL-Data section this performs first-boot provisioning; on
    /// a non-blank section with both copies invalid it never returns (the
    /// board's tamper response).
    pub fn load<F: Flash, B: Board>(flash: &mut F, board: &mut B) -> Result<Self, FlashError> {
        let mut store = Self {
            shadow: BlData::initial(TrimCodes::default()),
        };
        store.sanitize(flash, board)?;
        Ok(store)
    }

    /// Read access to the shadow.
    pub fn data(&self) -> &BlData {
        &self.shadow
    }

    /// Mutate the shadow and immediately write it back to both flash copies.
    pub fn update<F: Flash>(
        &mut self,
        flash: &mut F,
        f: impl FnOnce(&mut BlData),
    ) -> Result<(), FlashError> {
        f(&mut self.shadow);
        self.writeback(flash)
    }

    /// Check the validity of both flash copies and fix them if necessary,
    /// then reload the shadow and erase any partition left inconsistent by
    /// an interrupted upgrade.
    ///
    /// Fixing consists of:
    /// - first-boot provisioning, if both copies are invalid and the whole
    ///   section is blank;
    /// - copying backup over main, if only main is invalid;
    /// - copying main over backup, if backup is invalid or differs;
    /// - the board tamper response, if both copies are invalid and the
    ///   section is not blank.
    pub fn sanitize<F: Flash, B: Board>(
        &mut self,
        flash: &mut F,
        board: &mut B,
    ) -> Result<(), FlashError> {
        let mut main = [0u8; PAGE_SIZE];
        let mut backup = [0u8; PAGE_SIZE];
        read_page(flash, BL_DATA_CTRL, BL_DATA_REGION, BL_DATA_MAIN_PAGE, &mut main)?;
        read_page(flash, BL_DATA_CTRL, BL_DATA_REGION, BL_DATA_BACKUP_PAGE, &mut backup)?;

        if !image_valid(&main) {
            if !image_valid(&backup) {
                // Both copies invalid: expected only before provisioning,
                // when the whole section still reads as erased. Anything
                // else means tampering or a hardware fault, and the device
                // must not silently self-heal.
                if !section_blank(&main, &backup) {
                    board.tamper_halt();
                }
                self.provision(flash, board)?;
            } else {
                // An upgrade failed while rewriting main; restore it from
                // the backup copy.
                write_image(flash, BL_DATA_MAIN_PAGE, &backup)?;
            }
        } else if main[..ENCODED_LEN] != backup[..ENCODED_LEN] {
            // Backup is corrupted or outdated; restore it from main.
            write_image(flash, BL_DATA_BACKUP_PAGE, &main)?;
        }

        read_page(flash, BL_DATA_CTRL, BL_DATA_REGION, BL_DATA_MAIN_PAGE, &mut main)?;
        self.shadow = BlData::decode(&main);

        if self.sanitize_partitions(flash)? {
            self.writeback(flash)?;
        }
        Ok(())
    }

    /// Write the shadow back to flash: main copy first, then backup.
    ///
    /// A power cut anywhere in this sequence leaves at least one valid copy:
    /// either the old backup (main not yet rewritten) or the new main.
    pub fn writeback<F: Flash>(&mut self, flash: &mut F) -> Result<(), FlashError> {
        let img = self.shadow.encode();
        write_image(flash, BL_DATA_MAIN_PAGE, &img)?;
        write_image(flash, BL_DATA_BACKUP_PAGE, &img)
    }

    /// First-boot provisioning: compute trim codes, install the default
    /// partition and target tables, and store both flash copies.
    fn provision<F: Flash, B: Board>(
        &mut self,
        flash: &mut F,
        board: &mut B,
    ) -> Result<(), FlashError> {
        self.shadow = BlData::initial(board.trim_codes());
        self.writeback(flash)
    }

    /// Erase every partition marked inconsistent and mark it back as
    /// consistent. Returns whether the shadow changed and needs writeback.
    ///
    /// Empty partitions are not booted even when consistent.
    fn sanitize_partitions<F: Flash>(&mut self, flash: &mut F) -> Result<bool, FlashError> {
        let mut wb_needed = false;
        for i in 0..PARTITION_COUNT {
            if !self.shadow.partitions[i].is_consistent {
                let part = self.shadow.partitions[i];
                erase_partition(flash, &part)?;
                self.shadow.partitions[i].is_consistent = true;
                wb_needed = true;
            }
        }
        Ok(wb_needed)
    }
}

/// Erase all pages of a partition and flush the controller prefetch buffer.
fn erase_partition<F: Flash>(flash: &mut F, part: &Partition) -> Result<(), FlashError> {
    for page in part.first_page..part.first_page + part.num_pages {
        flash.erase_page(part.controller, FlashRegion::Sys, page)?;
    }
    flush_prefetch(flash, part.controller);
    Ok(())
}

fn write_image<F: Flash>(flash: &mut F, page: u32, img: &[u8]) -> Result<(), FlashError> {
    let mut words = [0u32; ENCODED_LEN / 4];
    for (i, w) in words.iter_mut().enumerate() {
        *w = rd_u32(img, i * 4);
    }
    flash.write_page(BL_DATA_CTRL, BL_DATA_REGION, page, &words)
}

fn section_blank(main: &[u8; PAGE_SIZE], backup: &[u8; PAGE_SIZE]) -> bool {
    main.iter().chain(backup.iter()).all(|&b| b == 0xFF)
}
