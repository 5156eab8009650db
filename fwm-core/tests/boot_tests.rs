// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot-partition selection tests.

use fwm_core::bl_data::BlData;
use fwm_core::boot::{app_present, select_boot_partition};
use fwm_core::config::PARTITION_DEFAULTS;
use fwm_core::sim::{MemFlash, SimBoard};
use fwm_core::{Flash, FlashCtrl, FlashRegion};

fn install_app(flash: &mut MemFlash, partition: usize) {
    let first_page = PARTITION_DEFAULTS[partition].first_page;
    flash
        .write_page(FlashCtrl::C0, FlashRegion::Sys, first_page, &[0x2000_4000; 8])
        .unwrap();
}

fn bl() -> BlData {
    BlData::initial(SimBoard::new().trim)
}

#[test]
fn empty_device_has_nothing_to_boot() {
    let flash = MemFlash::new();
    let bl = bl();
    assert!(!app_present(&flash, &bl.partitions[0]));
    assert_eq!(select_boot_partition(&flash, &bl, 0), None);
}

#[test]
fn active_partition_wins_when_bootable() {
    let mut flash = MemFlash::new();
    install_app(&mut flash, 0);
    install_app(&mut flash, 1);
    let mut bl = bl();
    bl.targets[0].active_partition_idx = 1;
    assert_eq!(select_boot_partition(&flash, &bl, 0), Some(1));
}

#[test]
fn empty_active_partition_falls_back() {
    let mut flash = MemFlash::new();
    install_app(&mut flash, 1);
    let bl = bl();
    // Active partition 0 holds no image.
    assert_eq!(select_boot_partition(&flash, &bl, 0), Some(1));
}

#[test]
fn inconsistent_partition_is_not_bootable() {
    let mut flash = MemFlash::new();
    install_app(&mut flash, 0);
    let mut bl = bl();
    bl.partitions[0].is_consistent = false;
    assert_eq!(select_boot_partition(&flash, &bl, 0), None);
}

#[test]
fn partitions_of_other_targets_are_ignored() {
    let mut flash = MemFlash::new();
    install_app(&mut flash, 0);
    install_app(&mut flash, 1);
    let mut bl = bl();
    bl.partitions[1].target_idx = 5;
    bl.targets[0].active_partition_idx = 1;
    // The active index points at a foreign partition; only partition 0
    // belongs to target 0.
    assert_eq!(select_boot_partition(&flash, &bl, 0), Some(0));
}

#[test]
fn unknown_target_has_nothing_to_boot() {
    let flash = MemFlash::new();
    assert_eq!(select_boot_partition(&flash, &bl(), 9), None);
}
