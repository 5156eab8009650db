// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! DFU state machine tests: transitions, block ordering, buffer hygiene.

mod common;

use common::{build_image, new_core, payload, seed_bl_data, Core, ImageAuth, FW_KEY};
use fwm_core::config::ALT_SETTING_COUNT;
use fwm_core::qfm::QFM_SYS_INFO_REQ;
use fwm_core::sim::MemFlash;
use fwm_core::{DeviceConfig, DfuState, DfuStatus};

fn qfu_core() -> Core {
    let mut flash = MemFlash::new();
    seed_bl_data(&mut flash, |bl| {
        bl.fw_key = FW_KEY;
        bl.targets[0].svn = 4;
    });
    let mut core = new_core(flash, DeviceConfig::DEFAULT);
    core.set_alt_setting(1).unwrap();
    core
}

fn image_blocks() -> Vec<Vec<u8>> {
    build_image(1, 0x0100, &payload(4096), Some(&ImageAuth { fw_key: FW_KEY, svn: 5 }))
}

#[test]
fn invalid_alt_setting_is_rejected() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    assert!(core.set_alt_setting(ALT_SETTING_COUNT).is_err());
    assert_eq!(core.get_state(), DfuState::Idle);
}

#[test]
fn empty_first_dnload_stalls() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let mut empty: [u8; 0] = [];
    assert!(core.process_dnload(0, &mut empty).is_err());
    let (status, state, poll) = core.get_status();
    assert_eq!(status, DfuStatus::ErrStalledPkt);
    assert_eq!(state, DfuState::Error);
    assert_eq!(poll, 0);

    core.clr_status().unwrap();
    assert_eq!(core.get_state(), DfuState::Idle);
    let (status, _, _) = core.get_status();
    assert_eq!(status, DfuStatus::Ok);
}

#[test]
fn clr_status_outside_error_state_stalls() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    assert!(core.clr_status().is_err());
    let (status, state, _) = core.get_status();
    assert_eq!(status, DfuStatus::ErrStalledPkt);
    assert_eq!(state, DfuState::Error);
}

#[test]
fn get_status_advances_dnload_sync_to_dnload_idle() {
    let mut core = qfu_core();
    let blocks = image_blocks();
    let mut buf = blocks[0].clone();
    core.process_dnload(0, &mut buf).unwrap();
    assert_eq!(core.get_state(), DfuState::DnloadSync);
    let (status, state, _) = core.get_status();
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(state, DfuState::DnloadIdle);
}

#[test]
fn out_of_order_block_fails_the_transfer() {
    let mut core = qfu_core();
    let blocks = image_blocks();
    let mut buf = blocks[0].clone();
    core.process_dnload(0, &mut buf).unwrap();
    core.get_status();

    // Block 2 while block 1 is expected.
    let mut buf = blocks[1].clone();
    assert!(core.process_dnload(2, &mut buf).is_err());
    let (status, state, _) = core.get_status();
    assert_eq!(status, DfuStatus::ErrVendor);
    assert_eq!(state, DfuState::Error);
}

#[test]
fn host_block_numbering_may_start_anywhere() {
    let mut core = qfu_core();
    let blocks = image_blocks();
    for (i, block) in blocks.iter().enumerate() {
        let mut buf = block.clone();
        core.process_dnload(10 + i as u16, &mut buf).unwrap();
        let (status, _, _) = core.get_status();
        assert_eq!(status, DfuStatus::Ok);
    }
    let mut empty: [u8; 0] = [];
    core.process_dnload(10 + blocks.len() as u16, &mut empty).unwrap();
    let (status, state, _) = core.get_status();
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(state, DfuState::Idle);
    assert_eq!(core.bl_data().targets[0].svn, 5);
}

#[test]
fn abort_mid_transfer_returns_to_idle() {
    let mut core = qfu_core();
    let blocks = image_blocks();
    let mut buf = blocks[0].clone();
    core.process_dnload(0, &mut buf).unwrap();
    core.get_status();
    assert_eq!(core.get_state(), DfuState::DnloadIdle);

    core.abort().unwrap();
    assert_eq!(core.get_state(), DfuState::Idle);
}

#[test]
fn abort_in_idle_stalls() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    assert!(core.abort().is_err());
    assert_eq!(core.get_state(), DfuState::Error);
}

#[test]
fn qfu_upload_returns_no_data() {
    let mut core = qfu_core();
    let mut out = [0u8; 256];
    let len = core.process_upload(0, &mut out).unwrap();
    assert_eq!(len, 0);
    assert_eq!(core.get_state(), DfuState::Idle);
}

#[test]
fn dnload_payload_is_zeroized_after_processing() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let mut buf = QFM_SYS_INFO_REQ.to_le_bytes().to_vec();
    buf.extend_from_slice(&[0x5A; 60]);
    core.process_dnload(0, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn set_alt_setting_clears_an_error() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let mut empty: [u8; 0] = [];
    let _ = core.process_dnload(0, &mut empty);
    assert_eq!(core.get_state(), DfuState::Error);

    core.set_alt_setting(0).unwrap();
    assert_eq!(core.get_state(), DfuState::Idle);
    let (status, _, _) = core.get_status();
    assert_eq!(status, DfuStatus::Ok);
}
