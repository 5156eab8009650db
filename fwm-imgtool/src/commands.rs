// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Subcommand implementations.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use fwm_core::bl_data::BlData;
use fwm_core::config::{
    BLOCK_SIZE, BL_DATA_BACKUP_PAGE, BL_DATA_CTRL, BL_DATA_MAIN_PAGE, BL_DATA_REGION, PID,
    PID_DFU, VID,
};
use fwm_core::crypto::{hmac_sha256, sha256, HmacKey, DIGEST_LEN};
use fwm_core::image::{hmac_ext_len, HmacExt, QfuHeader, BASE_HDR_LEN};
use fwm_core::qfm::{seal_key_update, KeySlot, SysInfo, QFM_SYS_INFO_REQ};
use fwm_core::sim::{MemFlash, SimBoard};
use fwm_core::{AuthMode, DeviceConfig, DfuCore, DfuState, DfuStatus, Flash};

use crate::cli::Slot;

const ZERO_KEY: HmacKey = [0; 32];

/// Read a key file: either 32 raw bytes or 64 hex digits.
fn read_key(path: &Path) -> Result<HmacKey> {
    let bytes = fs::read(path).with_context(|| format!("reading key {}", path.display()))?;
    if bytes.len() == DIGEST_LEN {
        let mut key = [0u8; DIGEST_LEN];
        key.copy_from_slice(&bytes);
        return Ok(key);
    }
    let text: String = String::from_utf8_lossy(&bytes)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if text.len() != DIGEST_LEN * 2 {
        bail!("{}: expected 32 raw bytes or 64 hex digits", path.display());
    }
    let mut key = [0u8; DIGEST_LEN];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[2 * i..2 * i + 2], 16)
            .with_context(|| format!("{}: invalid hex", path.display()))?;
    }
    Ok(key)
}

fn read_key_or_default(path: Option<&Path>) -> Result<HmacKey> {
    path.map(read_key).transpose().map(|k| k.unwrap_or(ZERO_KEY))
}

/// Wrap a raw binary into a QFU image.
pub fn build(
    input: &Path,
    output: &Path,
    partition: u16,
    version: u32,
    svn: u32,
    fw_key: Option<&Path>,
) -> Result<()> {
    let payload = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if payload.is_empty() {
        bail!("{}: empty firmware binary", input.display());
    }
    let data_blocks: Vec<&[u8]> = payload.chunks(BLOCK_SIZE).collect();
    let key = fw_key.map(read_key).transpose()?;

    let hdr = QfuHeader {
        vid: VID,
        pid: PID,
        pid_dfu: PID_DFU,
        partition,
        version,
        block_sz: BLOCK_SIZE as u16,
        n_blocks: (1 + data_blocks.len()) as u16,
        ext_hdr_type: if key.is_some() { 2 } else { 0 },
    };
    let mut hdr_block = vec![0xFFu8; BLOCK_SIZE];
    hdr.write_to(&mut hdr_block);
    if let Some(key) = key {
        let mut off = BASE_HDR_LEN;
        hdr_block[off..off + 4].copy_from_slice(&svn.to_le_bytes());
        off += 4;
        for block in &data_blocks {
            hdr_block[off..off + DIGEST_LEN].copy_from_slice(&sha256(block));
            off += DIGEST_LEN;
        }
        let tag = hmac_sha256(&key, &hdr_block[..off]);
        hdr_block[off..off + DIGEST_LEN].copy_from_slice(&tag);
    }

    let mut image = hdr_block;
    image.extend_from_slice(&payload);
    fs::write(output, &image).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{}: partition {}, version {}, {} data block(s), {}",
        output.display(),
        partition,
        version,
        data_blocks.len(),
        if fw_key.is_some() {
            format!("HMAC256 authenticated (svn {svn})")
        } else {
            "unauthenticated".to_string()
        }
    );
    Ok(())
}

/// Decode and print an image header; verify digests when present.
pub fn inspect(image: &Path) -> Result<()> {
    let data = fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let hdr = QfuHeader::parse(&data).ok_or_else(|| anyhow!("{}: not a QFU image", image.display()))?;
    if hdr.block_sz == 0 {
        bail!("{}: header declares a zero block size", image.display());
    }

    println!("vid:pid      {:04x}:{:04x} (dfu {:04x})", hdr.vid, hdr.pid, hdr.pid_dfu);
    println!("partition    {}", hdr.partition);
    println!("version      {}", hdr.version);
    println!("block size   {}", hdr.block_sz);
    println!("blocks       {} (1 header + {} data)", hdr.n_blocks, hdr.n_blocks.saturating_sub(1));

    match hdr.ext_hdr_type {
        0 => println!("auth         none"),
        2 => {
            let n_data = hdr.n_blocks.saturating_sub(1) as usize;
            let hdr_len = BASE_HDR_LEN + hmac_ext_len(n_data);
            if data.len() < hdr_len {
                bail!("{}: truncated HMAC256 extended header", image.display());
            }
            let ext = HmacExt::new(&data[..hdr_len], n_data);
            println!("auth         HMAC256, svn {}", ext.svn());
            if data.len() <= hdr.block_sz as usize {
                bail!("{}: image carries no payload", image.display());
            }
            let payload = &data[hdr.block_sz as usize..];
            for (i, block) in payload.chunks(hdr.block_sz as usize).enumerate() {
                let ok = i < n_data && sha256(block) == ext.block_digest(i);
                println!("  block {:<3} digest {}", i, if ok { "ok" } else { "MISMATCH" });
            }
        }
        other => println!("auth         unknown extended header type {other}"),
    }
    Ok(())
}

/// Build an authenticated key-update packet.
pub fn keypkt(
    slot: Slot,
    new_key: &Path,
    fw_key: Option<&Path>,
    rv_key: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let slot = match slot {
        Slot::Fw => KeySlot::Firmware,
        Slot::Rv => KeySlot::Revocation,
    };
    let new_key = read_key(new_key)?;
    let fw_key = read_key_or_default(fw_key)?;
    let rv_key = read_key_or_default(rv_key)?;
    let pkt = seal_key_update(slot, &new_key, &fw_key, &rv_key);
    fs::write(output, pkt).with_context(|| format!("writing {}", output.display()))?;
    println!("{}: {} bytes", output.display(), pkt.len());
    Ok(())
}

/// Provision a BL-Data record with the given firmware key, as an earlier
/// boot plus key rotation would have left it.
fn provision(flash: &mut MemFlash, fw_key: HmacKey) -> Result<()> {
    let mut bl = BlData::initial(SimBoard::new().trim);
    bl.fw_key = fw_key;
    let img = bl.encode();
    let mut words = vec![0u32; img.len() / 4];
    for (i, w) in words.iter_mut().enumerate() {
        *w = u32::from_le_bytes([img[4 * i], img[4 * i + 1], img[4 * i + 2], img[4 * i + 3]]);
    }
    for page in [BL_DATA_MAIN_PAGE, BL_DATA_BACKUP_PAGE] {
        flash
            .write_page(BL_DATA_CTRL, BL_DATA_REGION, page, &words)
            .map_err(|e| anyhow!("seeding BL-Data: {e:?}"))?;
    }
    Ok(())
}

/// Run an image through the real DFU core against in-memory flash.
pub fn flash(image: &Path, fw_key: Option<&Path>) -> Result<()> {
    let data = fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let hdr = QfuHeader::parse(&data).ok_or_else(|| anyhow!("{}: not a QFU image", image.display()))?;

    let auth = match hdr.ext_hdr_type {
        0 => AuthMode::None,
        2 => AuthMode::Hmac256,
        other => bail!("unsupported extended header type {other}"),
    };
    let mut mem = MemFlash::new();
    let mut board = SimBoard::new();
    if auth == AuthMode::Hmac256 {
        let key_path = fw_key.ok_or_else(|| anyhow!("authenticated image needs --fw-key"))?;
        provision(&mut mem, read_key(key_path)?)?;
    }
    let cfg = DeviceConfig {
        auth,
        ..DeviceConfig::DEFAULT
    };
    let mut core =
        DfuCore::new(&mut mem, &mut board, cfg).map_err(|e| anyhow!("device init: {e:?}"))?;
    core.set_alt_setting(hdr.partition as u8)
        .map_err(|_| anyhow!("partition {} has no alternate setting", hdr.partition))?;

    let mut blocks: Vec<&[u8]> = vec![&data[..BLOCK_SIZE.min(data.len())]];
    blocks.extend(data[BLOCK_SIZE.min(data.len())..].chunks(BLOCK_SIZE));
    for (i, block) in blocks.iter().enumerate() {
        let mut buf = block.to_vec();
        let _ = core.process_dnload(i as u16, &mut buf);
        let (status, state, _) = core.get_status();
        if status != DfuStatus::Ok {
            bail!("block {i}: {status:?} ({state:?})");
        }
        println!("block {i}: ok");
    }
    let mut empty: [u8; 0] = [];
    let _ = core.process_dnload(blocks.len() as u16, &mut empty);
    let (status, state, _) = core.get_status();
    if status != DfuStatus::Ok || state != DfuState::Idle {
        bail!("manifest: {status:?} ({state:?})");
    }
    println!("manifest: ok");

    // Read the device state back over the metadata setting.
    core.set_alt_setting(0).map_err(|_| anyhow!("alt 0 rejected"))?;
    let mut req = QFM_SYS_INFO_REQ.to_le_bytes().to_vec();
    let _ = core.process_dnload(0, &mut req);
    core.get_status();
    let mut fin: [u8; 0] = [];
    let _ = core.process_dnload(1, &mut fin);
    core.get_status();
    let mut rsp = vec![0u8; BLOCK_SIZE];
    let len = core
        .process_upload(0, &mut rsp)
        .map_err(|_| anyhow!("SysInfo upload rejected"))?;
    let info = SysInfo::parse(&rsp[..len]).ok_or_else(|| anyhow!("malformed SysInfo response"))?;
    for (i, t) in info.targets.iter().enumerate() {
        println!("target {i}: active partition {}", t.active_partition_idx);
    }
    for (i, p) in info.partitions.iter().enumerate() {
        println!(
            "partition {i}: {} (version {})",
            if p.app_present { "present" } else { "empty" },
            p.app_version
        );
    }
    let bl = core.bl_data();
    for (i, t) in bl.targets.iter().enumerate() {
        println!("target {i}: svn {}", t.svn);
    }
    Ok(())
}
