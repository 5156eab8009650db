// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QFM: the metadata and admin request family carried on alternate
//! setting 0.
//!
//! A QFM request is a compact packet carried in a single Dnload block
//! (block 0 only); a request that produces a response (currently only
//! SysInfo) stages it for the next Upload block. All packet fields are
//! little-endian `u32`s except the raw key and MAC bytes.

use crate::boot::app_present;
use crate::config::{AuthMode, PARTITION_COUNT, ROM_VERSION, SOC_ID, TARGET_COUNT, TARGET_TYPES};
use crate::crypto::{hmac_sha256, hmac_verify, is_default_key, HmacKey, DIGEST_LEN};
use crate::dfu::{Ctx, DfuStatus, RequestHandler};
use crate::flash::Flash;
use crate::Board;

// Packet type discriminants.
pub const QFM_SYS_INFO_REQ: u32 = 0;
pub const QFM_SYS_INFO_RSP: u32 = 1;
pub const QFM_APP_ERASE: u32 = 2;
pub const QFM_UPDATE_FW_KEY: u32 = 3;
pub const QFM_UPDATE_RV_KEY: u32 = 4;

/// Size of the SysInfo response packet: the fixed part, one descriptor per
/// target (type tag + active partition), one per partition (presence +
/// version).
pub const SYS_INFO_RSP_LEN: usize = 24 + TARGET_COUNT * 8 + PARTITION_COUNT * 8;

/// Offset of the new key within a key-update packet.
pub const KEY_UPDATE_KEY_OFF: usize = 4;
/// Offset of the MAC within a key-update packet; the MAC covers everything
/// before it.
pub const KEY_UPDATE_MAC_OFF: usize = KEY_UPDATE_KEY_OFF + DIGEST_LEN;
/// Total size of a key-update packet.
pub const KEY_UPDATE_PKT_LEN: usize = KEY_UPDATE_MAC_OFF + DIGEST_LEN;

/// Which key slot a key-update packet targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySlot {
    Firmware,
    Revocation,
}

/// Build an authenticated key-update packet (host side).
///
/// The MAC chains both device keys: `HMAC(rv_key, HMAC(fw_key, body))`,
/// so rotating either key requires knowledge of both.
pub fn seal_key_update(
    slot: KeySlot,
    new_key: &HmacKey,
    fw_key: &HmacKey,
    rv_key: &HmacKey,
) -> [u8; KEY_UPDATE_PKT_LEN] {
    let kind = match slot {
        KeySlot::Firmware => QFM_UPDATE_FW_KEY,
        KeySlot::Revocation => QFM_UPDATE_RV_KEY,
    };
    let mut pkt = [0u8; KEY_UPDATE_PKT_LEN];
    pkt[..4].copy_from_slice(&kind.to_le_bytes());
    pkt[KEY_UPDATE_KEY_OFF..KEY_UPDATE_MAC_OFF].copy_from_slice(new_key);
    let inner = hmac_sha256(fw_key, &pkt[..KEY_UPDATE_MAC_OFF]);
    let mac = hmac_sha256(rv_key, &inner);
    pkt[KEY_UPDATE_MAC_OFF..].copy_from_slice(&mac);
    pkt
}

/// Decoded SysInfo response (host side).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SysInfo {
    pub rom_version: u32,
    pub soc_id: u32,
    pub auth_mode: u32,
    pub targets: [SysInfoTarget; TARGET_COUNT],
    pub partitions: [SysInfoPartition; PARTITION_COUNT],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SysInfoTarget {
    pub target_type: u32,
    pub active_partition_idx: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SysInfoPartition {
    pub app_present: bool,
    pub app_version: u32,
}

impl SysInfo {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < SYS_INFO_RSP_LEN
            || rd_u32(buf, 0) != QFM_SYS_INFO_RSP
            || rd_u32(buf, 16) != TARGET_COUNT as u32
            || rd_u32(buf, 20) != PARTITION_COUNT as u32
        {
            return None;
        }
        let mut info = Self {
            rom_version: rd_u32(buf, 4),
            soc_id: rd_u32(buf, 8),
            auth_mode: rd_u32(buf, 12),
            targets: [SysInfoTarget::default(); TARGET_COUNT],
            partitions: [SysInfoPartition::default(); PARTITION_COUNT],
        };
        for (i, t) in info.targets.iter_mut().enumerate() {
            let off = 24 + i * 8;
            t.target_type = rd_u32(buf, off);
            t.active_partition_idx = rd_u32(buf, off + 4);
        }
        let parts_off = 24 + TARGET_COUNT * 8;
        for (i, p) in info.partitions.iter_mut().enumerate() {
            let off = parts_off + i * 8;
            p.app_present = rd_u32(buf, off) != 0;
            p.app_version = rd_u32(buf, off + 4);
        }
        Some(info)
    }
}

/// The QFM DFU request handler.
pub(crate) struct QfmHandler {
    status: DfuStatus,
    rsp: [u8; SYS_INFO_RSP_LEN],
    rsp_pending: bool,
}

impl QfmHandler {
    pub(crate) fn new() -> Self {
        Self {
            status: DfuStatus::Ok,
            rsp: [0; SYS_INFO_RSP_LEN],
            rsp_pending: false,
        }
    }

    fn process_req<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>, data: &[u8]) -> DfuStatus {
        if data.len() < 4 {
            return DfuStatus::ErrTarget;
        }
        // Extra bytes past the packet are simply discarded; a short packet
        // fails the length check of its specific kind.
        match rd_u32(data, 0) {
            QFM_SYS_INFO_REQ => {
                self.prepare_sys_info(ctx);
                DfuStatus::Ok
            }
            // Application erase wipes every partition; only available while
            // authentication is off.
            QFM_APP_ERASE if ctx.cfg.auth == AuthMode::None => app_erase(ctx),
            // Key provisioning is the authenticated counterpart. The
            // firmware key may only rotate once a revocation key exists.
            QFM_UPDATE_FW_KEY if ctx.cfg.auth == AuthMode::Hmac256 => {
                if is_default_key(&ctx.store.data().rv_key) {
                    return DfuStatus::ErrVendor;
                }
                update_key(ctx, data, KeySlot::Firmware)
            }
            QFM_UPDATE_RV_KEY if ctx.cfg.auth == AuthMode::Hmac256 => {
                update_key(ctx, data, KeySlot::Revocation)
            }
            _ => DfuStatus::ErrTarget,
        }
    }

    /// Stage a SysInfo response for the next Upload block.
    fn prepare_sys_info<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>) {
        let bl = ctx.store.data();
        let rsp = &mut self.rsp;
        wr_u32(rsp, 0, QFM_SYS_INFO_RSP);
        wr_u32(rsp, 4, ROM_VERSION);
        wr_u32(rsp, 8, SOC_ID);
        wr_u32(rsp, 12, ctx.cfg.auth.wire_id());
        wr_u32(rsp, 16, TARGET_COUNT as u32);
        wr_u32(rsp, 20, PARTITION_COUNT as u32);
        for (i, t) in bl.targets.iter().enumerate() {
            let off = 24 + i * 8;
            wr_u32(rsp, off, TARGET_TYPES[i]);
            wr_u32(rsp, off + 4, t.active_partition_idx);
        }
        let parts_off = 24 + TARGET_COUNT * 8;
        for (i, p) in bl.partitions.iter().enumerate() {
            let off = parts_off + i * 8;
            wr_u32(rsp, off, app_present(ctx.flash, p) as u32);
            wr_u32(rsp, off + 4, p.app_version);
        }
        self.rsp_pending = true;
    }
}

impl RequestHandler for QfmHandler {
    fn init<F: Flash, B: Board>(&mut self, _ctx: &mut Ctx<'_, F, B>, _alt: u8) {
        self.status = DfuStatus::Ok;
    }

    fn status(&mut self) -> (DfuStatus, u32) {
        (self.status, 0)
    }

    fn clear<F: Flash, B: Board>(&mut self, _ctx: &mut Ctx<'_, F, B>) {
        self.status = DfuStatus::Ok;
    }

    fn process_dnload<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
        data: &[u8],
    ) {
        self.rsp_pending = false;
        // A QFM request must fit in the first (and only) block; multi-block
        // requests buy the host nothing.
        if seq != 0 {
            self.status = DfuStatus::ErrTarget;
            return;
        }
        self.status = self.process_req(ctx, data);
    }

    fn finalize<F: Flash, B: Board>(
        &mut self,
        _ctx: &mut Ctx<'_, F, B>,
        _seq: u32,
    ) -> Result<(), DfuStatus> {
        Ok(())
    }

    fn fill_upload(&mut self, _seq: u32, out: &mut [u8]) -> usize {
        // The response must fit in one Upload block; hosts have no reason to
        // request less than the device block size.
        let len = if self.rsp_pending && out.len() >= SYS_INFO_RSP_LEN {
            out[..SYS_INFO_RSP_LEN].copy_from_slice(&self.rsp);
            SYS_INFO_RSP_LEN
        } else {
            0
        };
        self.rsp_pending = false;
        len
    }

    fn abort<F: Flash, B: Board>(&mut self, _ctx: &mut Ctx<'_, F, B>) {
        self.rsp_pending = false;
    }
}

/// Mark every partition inconsistent and let sanitize erase them.
fn app_erase<F: Flash, B: Board>(ctx: &mut Ctx<'_, F, B>) -> DfuStatus {
    let wrote = ctx.store.update(ctx.flash, |bl| {
        for p in bl.partitions.iter_mut() {
            p.is_consistent = false;
        }
    });
    if wrote.is_err() {
        return DfuStatus::ErrWrite;
    }
    match ctx.store.sanitize(ctx.flash, ctx.board) {
        Ok(()) => DfuStatus::Ok,
        Err(_) => DfuStatus::ErrErase,
    }
}

/// Authenticated key rotation.
fn update_key<F: Flash, B: Board>(ctx: &mut Ctx<'_, F, B>, data: &[u8], slot: KeySlot) -> DfuStatus {
    if data.len() < KEY_UPDATE_PKT_LEN {
        return DfuStatus::ErrTarget;
    }
    critical_section::with(|_| {
        let bl = ctx.store.data();
        let inner = hmac_sha256(&bl.fw_key, &data[..KEY_UPDATE_MAC_OFF]);
        let mut mac = [0u8; DIGEST_LEN];
        mac.copy_from_slice(&data[KEY_UPDATE_MAC_OFF..KEY_UPDATE_PKT_LEN]);
        if !hmac_verify(&bl.rv_key, &inner, &mac) {
            return DfuStatus::ErrVendor;
        }
        let mut key = [0u8; DIGEST_LEN];
        key.copy_from_slice(&data[KEY_UPDATE_KEY_OFF..KEY_UPDATE_MAC_OFF]);
        // The packet buffer itself is cleared by the DFU core after
        // processing.
        let wrote = ctx.store.update(ctx.flash, |bl| match slot {
            KeySlot::Firmware => bl.fw_key = key,
            KeySlot::Revocation => bl.rv_key = key,
        });
        match wrote {
            Ok(()) => DfuStatus::Ok,
            Err(_) => DfuStatus::ErrWrite,
        }
    })
}

fn rd_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn wr_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}
