// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared fixtures: seeded BL-Data sections, QFU image construction, and a
//! host-side driver for the DFU dialogue.

#![allow(dead_code)]

use fwm_core::bl_data::BlData;
use fwm_core::config::{
    BLOCK_SIZE, BL_DATA_BACKUP_PAGE, BL_DATA_CTRL, BL_DATA_MAIN_PAGE, BL_DATA_REGION, PID, PID_DFU,
    VID,
};
use fwm_core::crypto::{hmac_sha256, sha256, HmacKey, DIGEST_LEN};
use fwm_core::image::{hmac_signed_len, QfuHeader, BASE_HDR_LEN};
use fwm_core::sim::{MemFlash, SimBoard};
use fwm_core::{DeviceConfig, DfuCore, DfuState, DfuStatus, Flash};

pub type Core = DfuCore<MemFlash, SimBoard>;

pub const FW_KEY: HmacKey = [0x11; 32];
pub const RV_KEY: HmacKey = [0x22; 32];

/// Write a BL-Data record (the provisioning defaults, adjusted by `f`) to
/// both flash copies, as a completed earlier boot would have left it.
pub fn seed_bl_data(flash: &mut MemFlash, f: impl FnOnce(&mut BlData)) {
    let mut bl = BlData::initial(SimBoard::new().trim);
    f(&mut bl);
    let img = bl.encode();
    let mut words = vec![0u32; img.len() / 4];
    for (i, w) in words.iter_mut().enumerate() {
        *w = u32::from_le_bytes([img[4 * i], img[4 * i + 1], img[4 * i + 2], img[4 * i + 3]]);
    }
    flash
        .write_page(BL_DATA_CTRL, BL_DATA_REGION, BL_DATA_MAIN_PAGE, &words)
        .unwrap();
    flash
        .write_page(BL_DATA_CTRL, BL_DATA_REGION, BL_DATA_BACKUP_PAGE, &words)
        .unwrap();
}

pub fn new_core(flash: MemFlash, cfg: DeviceConfig) -> Core {
    DfuCore::new(flash, SimBoard::new(), cfg).expect("core init")
}

/// Authentication material for a built image.
pub struct ImageAuth {
    pub fw_key: HmacKey,
    pub svn: u32,
}

/// Build the DFU blocks of a QFU image: the padded header block followed by
/// the payload cut into blocks.
pub fn build_image(
    partition: u16,
    version: u32,
    payload: &[u8],
    auth: Option<&ImageAuth>,
) -> Vec<Vec<u8>> {
    let data_blocks: Vec<&[u8]> = payload.chunks(BLOCK_SIZE).collect();
    let hdr = QfuHeader {
        vid: VID,
        pid: PID,
        pid_dfu: PID_DFU,
        partition,
        version,
        block_sz: BLOCK_SIZE as u16,
        n_blocks: (1 + data_blocks.len()) as u16,
        ext_hdr_type: if auth.is_some() { 2 } else { 0 },
    };
    let mut hdr_block = vec![0xFFu8; BLOCK_SIZE];
    hdr.write_to(&mut hdr_block);
    if let Some(auth) = auth {
        let mut off = BASE_HDR_LEN;
        hdr_block[off..off + 4].copy_from_slice(&auth.svn.to_le_bytes());
        off += 4;
        for block in &data_blocks {
            hdr_block[off..off + DIGEST_LEN].copy_from_slice(&sha256(block));
            off += DIGEST_LEN;
        }
        let signed = hmac_signed_len(data_blocks.len());
        assert_eq!(off, signed);
        let tag = hmac_sha256(&auth.fw_key, &hdr_block[..signed]);
        hdr_block[signed..signed + DIGEST_LEN].copy_from_slice(&tag);
    }
    let mut blocks = vec![hdr_block];
    blocks.extend(data_blocks.iter().map(|b| b.to_vec()));
    blocks
}

/// Drive a complete Dnload dialogue: every block, a GetStatus after each,
/// and the empty finalize. Stops at the first non-Ok status.
pub fn push_image(core: &mut Core, blocks: &[Vec<u8>]) -> (DfuStatus, DfuState) {
    for (i, block) in blocks.iter().enumerate() {
        let mut buf = block.clone();
        let _ = core.process_dnload(i as u16, &mut buf);
        let (status, state, _) = core.get_status();
        if status != DfuStatus::Ok {
            return (status, state);
        }
    }
    let mut empty: [u8; 0] = [];
    let _ = core.process_dnload(blocks.len() as u16, &mut empty);
    let (status, state, _) = core.get_status();
    (status, state)
}

/// A deterministic non-blank payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
