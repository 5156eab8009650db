// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot-time partition selection.
//!
//! Pure decision logic over a sanitized BL-Data shadow; the CPU-specific
//! jump into the selected image is the caller's business.

use crate::bl_data::{BlData, Partition};
use crate::config::{BLANK_WORD, PAGE_SIZE};
use crate::flash::{Flash, FlashRegion};

/// Whether an application is installed in the partition: its first word is
/// not the erased-flash sentinel.
pub fn app_present<F: Flash>(flash: &F, part: &Partition) -> bool {
    let mut word = [0u8; 4];
    let offset = part.first_page * PAGE_SIZE as u32;
    if flash.read(part.controller, FlashRegion::Sys, offset, &mut word).is_err() {
        return false;
    }
    u32::from_le_bytes(word) != BLANK_WORD
}

/// Pick the partition a target should boot from.
///
/// The target's active partition wins when it is consistent and holds an
/// image; otherwise any other bootable partition of the same target is
/// taken. Returns the global partition index, or `None` when the target has
/// nothing to boot.
pub fn select_boot_partition<F: Flash>(flash: &F, bl: &BlData, target_idx: usize) -> Option<usize> {
    let target = bl.targets.get(target_idx)?;
    let bootable = |p: &Partition| {
        p.target_idx as usize == target_idx && p.is_consistent && app_present(flash, p)
    };
    let active = target.active_partition_idx as usize;
    if bl.partitions.get(active).is_some_and(|p| bootable(p)) {
        return Some(active);
    }
    bl.partitions
        .iter()
        .enumerate()
        .find(|(i, p)| *i != active && bootable(p))
        .map(|(i, _)| i)
}
