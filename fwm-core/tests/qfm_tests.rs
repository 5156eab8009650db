// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QFM handler tests: SysInfo, application erase, authenticated key
//! rotation.

mod common;

use common::{new_core, push_image, seed_bl_data, Core, FW_KEY, RV_KEY};
use fwm_core::config::{BLOCK_SIZE, PARTITION_DEFAULTS, ROM_VERSION, SOC_ID};
use fwm_core::crypto::HmacKey;
use fwm_core::qfm::{
    seal_key_update, KeySlot, SysInfo, QFM_APP_ERASE, QFM_SYS_INFO_REQ, SYS_INFO_RSP_LEN,
};
use fwm_core::sim::MemFlash;
use fwm_core::{AuthMode, DeviceConfig, DfuState, DfuStatus, Flash, FlashCtrl, FlashRegion};

const ZERO_KEY: HmacKey = [0; 32];

fn qfm_request(core: &mut Core, pkt: &[u8]) -> (DfuStatus, DfuState) {
    push_image(core, &[pkt.to_vec()])
}

fn fetch_response(core: &mut Core) -> Vec<u8> {
    let mut out = vec![0u8; BLOCK_SIZE];
    let len = core.process_upload(0, &mut out).unwrap();
    out.truncate(len);
    out
}

fn sys_info_req() -> Vec<u8> {
    QFM_SYS_INFO_REQ.to_le_bytes().to_vec()
}

fn install_app(flash: &mut MemFlash, partition: usize) {
    let first_page = PARTITION_DEFAULTS[partition].first_page;
    flash
        .write_page(FlashCtrl::C0, FlashRegion::Sys, first_page, &[0xCAFE_BABE; 8])
        .unwrap();
}

// --- SysInfo ---

#[test]
fn sys_info_reports_device_state() {
    let mut flash = MemFlash::new();
    seed_bl_data(&mut flash, |bl| {
        bl.partitions[0].app_version = 3;
        bl.targets[0].active_partition_idx = 0;
    });
    install_app(&mut flash, 0);
    let mut core = new_core(flash, DeviceConfig::DEFAULT);

    let (status, state) = qfm_request(&mut core, &sys_info_req());
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(state, DfuState::Idle);

    let rsp = fetch_response(&mut core);
    assert_eq!(rsp.len(), SYS_INFO_RSP_LEN);
    let info = SysInfo::parse(&rsp).expect("well-formed response");
    assert_eq!(info.rom_version, ROM_VERSION);
    assert_eq!(info.soc_id, SOC_ID);
    assert_eq!(info.auth_mode, AuthMode::Hmac256.wire_id());
    assert_eq!(info.targets[0].active_partition_idx, 0);
    assert!(info.partitions[0].app_present);
    assert_eq!(info.partitions[0].app_version, 3);
    assert!(!info.partitions[1].app_present);
}

#[test]
fn sys_info_response_requires_room() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    qfm_request(&mut core, &sys_info_req());

    let mut small = vec![0u8; SYS_INFO_RSP_LEN - 1];
    let len = core.process_upload(0, &mut small).unwrap();
    assert_eq!(len, 0);
}

#[test]
fn sys_info_response_is_one_shot() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    qfm_request(&mut core, &sys_info_req());

    assert_eq!(fetch_response(&mut core).len(), SYS_INFO_RSP_LEN);
    assert_eq!(fetch_response(&mut core).len(), 0);
}

// --- Application erase ---

#[test]
fn app_erase_wipes_every_partition() {
    let mut flash = MemFlash::new();
    seed_bl_data(&mut flash, |_| {});
    install_app(&mut flash, 0);
    install_app(&mut flash, 1);
    let cfg = DeviceConfig {
        auth: AuthMode::None,
        ..DeviceConfig::DEFAULT
    };
    let mut core = new_core(flash, cfg);

    let (status, _) = qfm_request(&mut core, &QFM_APP_ERASE.to_le_bytes());
    assert_eq!(status, DfuStatus::Ok);

    for part in PARTITION_DEFAULTS.iter() {
        for page in part.first_page..part.first_page + part.num_pages {
            assert!(core
                .flash()
                .page(FlashCtrl::C0, FlashRegion::Sys, page)
                .iter()
                .all(|&b| b == 0xFF));
        }
    }
    assert!(core.bl_data().partitions.iter().all(|p| p.is_consistent));
}

#[test]
fn app_erase_is_refused_when_authentication_is_on() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let (status, state) = qfm_request(&mut core, &QFM_APP_ERASE.to_le_bytes());
    assert_eq!(status, DfuStatus::ErrTarget);
    assert_eq!(state, DfuState::Error);
}

// --- Key rotation ---

#[test]
fn fw_key_rotation_requires_a_revocation_key_first() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);

    // Factory state: both keys default. The firmware key must not rotate.
    let pkt = seal_key_update(KeySlot::Firmware, &FW_KEY, &ZERO_KEY, &ZERO_KEY);
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::ErrVendor);
    assert_eq!(core.bl_data().fw_key, ZERO_KEY);
}

#[test]
fn key_provisioning_sequence() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);

    // Provision the revocation key first.
    let pkt = seal_key_update(KeySlot::Revocation, &RV_KEY, &ZERO_KEY, &ZERO_KEY);
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(core.bl_data().rv_key, RV_KEY);

    // Now the firmware key may rotate; its MAC chains through both keys.
    let pkt = seal_key_update(KeySlot::Firmware, &FW_KEY, &ZERO_KEY, &RV_KEY);
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(core.bl_data().fw_key, FW_KEY);

    // And rotating it again must be sealed with the new firmware key.
    let newer: HmacKey = [0x33; 32];
    let pkt = seal_key_update(KeySlot::Firmware, &newer, &FW_KEY, &RV_KEY);
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::Ok);
    assert_eq!(core.bl_data().fw_key, newer);
}

#[test]
fn key_update_with_wrong_mac_is_rejected() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);

    let mut pkt = seal_key_update(KeySlot::Revocation, &RV_KEY, &ZERO_KEY, &ZERO_KEY);
    let last = pkt.len() - 1;
    pkt[last] ^= 0x01;
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::ErrVendor);
    assert_eq!(core.bl_data().rv_key, ZERO_KEY);

    // A near-miss at the other end of the tag fares no better.
    core.clr_status().unwrap();
    let mut pkt = seal_key_update(KeySlot::Revocation, &RV_KEY, &ZERO_KEY, &ZERO_KEY);
    pkt[pkt.len() - 32] ^= 0x80;
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::ErrVendor);
    assert_eq!(core.bl_data().rv_key, ZERO_KEY);
}

#[test]
fn key_update_is_refused_without_authentication() {
    let cfg = DeviceConfig {
        auth: AuthMode::None,
        ..DeviceConfig::DEFAULT
    };
    let mut core = new_core(MemFlash::new(), cfg);
    let pkt = seal_key_update(KeySlot::Revocation, &RV_KEY, &ZERO_KEY, &ZERO_KEY);
    let (status, _) = qfm_request(&mut core, &pkt);
    assert_eq!(status, DfuStatus::ErrTarget);
}

// --- Packet framing ---

#[test]
fn qfm_request_after_block_zero_fails() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let mut buf = sys_info_req();
    core.process_dnload(0, &mut buf).unwrap();
    let (status, _, _) = core.get_status();
    assert_eq!(status, DfuStatus::Ok);

    let mut buf = sys_info_req();
    core.process_dnload(1, &mut buf).unwrap();
    let (status, state, _) = core.get_status();
    assert_eq!(status, DfuStatus::ErrTarget);
    assert_eq!(state, DfuState::Error);
}

#[test]
fn runt_packet_is_rejected() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let (status, _) = qfm_request(&mut core, &[0x00, 0x01]);
    assert_eq!(status, DfuStatus::ErrTarget);
}

#[test]
fn unknown_request_kind_is_rejected() {
    let mut core = new_core(MemFlash::new(), DeviceConfig::DEFAULT);
    let (status, _) = qfm_request(&mut core, &0x77u32.to_le_bytes());
    assert_eq!(status, DfuStatus::ErrTarget);
}
