// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device configuration: flash geometry, partition/target tables, and the
//! DFU identity of the device.
//!
//! Everything here is fixed at build time for a given SoC. The partition and
//! target tables are replicated into BL-Data at provisioning so the boot path
//! can read them from a single flash section.

use crate::bl_data::{Partition, Target};
use crate::flash::{FlashCtrl, FlashRegion};

// --- Flash geometry ---

/// Flash page size in bytes. Erased pages read back as all `0xFF`.
pub const PAGE_SIZE: usize = 2048;
/// Flash page size in 32-bit words.
pub const PAGE_WORDS: usize = PAGE_SIZE / 4;

/// Size of one QFU block, in pages.
pub const BLOCK_PAGES: usize = 1;
/// Size of one QFU block, in bytes. Every DFU transfer block is this large,
/// except the last data block of an image, which may be shorter.
pub const BLOCK_SIZE: usize = PAGE_SIZE * BLOCK_PAGES;

/// Granularity of a flash protection region. The BL-Data layout keeps the
/// application-readable prefix (trim codes + ROM version) in its own 1-KiB
/// unit so a single protection region hides the rest.
pub const FPR_GRANULARITY: usize = 1024;

/// Erased-flash sentinel word.
pub const BLANK_WORD: u32 = 0xFFFF_FFFF;

// --- BL-Data section ---

/// Controller hosting the BL-Data section.
pub const BL_DATA_CTRL: FlashCtrl = FlashCtrl::C0;
/// Region hosting the BL-Data section.
pub const BL_DATA_REGION: FlashRegion = FlashRegion::Data;
/// Page (within the data region) of the BL-Data main copy.
pub const BL_DATA_MAIN_PAGE: u32 = 0;
/// Page (within the data region) of the BL-Data backup copy.
pub const BL_DATA_BACKUP_PAGE: u32 = BL_DATA_MAIN_PAGE + 1;

// --- Partition / target tables ---

/// Number of boot targets (cores able to run an application partition).
pub const TARGET_COUNT: usize = 1;
/// Partitions per target (dual-bank layout).
pub const PARTITIONS_PER_TARGET: usize = 2;
/// Total number of application partitions.
pub const PARTITION_COUNT: usize = TARGET_COUNT * PARTITIONS_PER_TARGET;

/// Largest partition size in pages; bounds the QFU header digest table.
pub const PARTITION_MAX_PAGES: u32 = 32;

/// Base address of the system flash region on controller 0.
pub const SYS0_BASE_ADDR: u32 = 0x0018_0000;

const fn partition(target_idx: u32, first_page: u32, num_pages: u32) -> Partition {
    Partition {
        target_idx,
        controller: FlashCtrl::C0,
        first_page,
        num_pages,
        start_addr: SYS0_BASE_ADDR + first_page * PAGE_SIZE as u32,
        is_consistent: true,
        app_version: 0,
    }
}

/// Initial partition table installed at first-boot provisioning.
pub const PARTITION_DEFAULTS: [Partition; PARTITION_COUNT] =
    [partition(0, 16, PARTITION_MAX_PAGES), partition(0, 48, PARTITION_MAX_PAGES)];

/// Initial target table installed at first-boot provisioning.
pub const TARGET_DEFAULTS: [Target; TARGET_COUNT] = [Target {
    active_partition_idx: 0,
    svn: 0,
}];

// --- Identity ---

/// ROM version, fixed at provisioning time.
pub const ROM_VERSION: u32 = 0x0001_0000;

/// SoC identifier reported in the SysInfo response.
pub const SOC_ID: u32 = 0x0000_00D2;

/// Per-target type tags reported in the SysInfo response.
pub const TARGET_TYPES: [u32; TARGET_COUNT] = [0];

/// USB Vendor ID of the device.
pub const VID: u16 = 0x1209;
/// USB Product ID when running the application.
pub const PID: u16 = 0x0071;
/// USB Product ID when in DFU mode.
pub const PID_DFU: u16 = 0x0072;

/// Number of DFU alternate settings: the QFM setting (0) plus one QFU
/// setting per partition.
pub const ALT_SETTING_COUNT: u8 = 1 + PARTITION_COUNT as u8;

// --- Runtime-selectable policy ---

/// Image authentication mode of the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthMode {
    /// No authentication: images carry no extended header; application
    /// erase is permitted; key rotation is not.
    None,
    /// HMAC-SHA-256 authentication: images carry the HMAC256 extended
    /// header; key rotation is permitted; application erase is not.
    Hmac256,
}

impl AuthMode {
    /// Wire value of the authentication selector (matches the QFU
    /// extended-header type values).
    pub const fn wire_id(self) -> u32 {
        match self {
            AuthMode::None => 0,
            AuthMode::Hmac256 => 2,
        }
    }
}

/// DFU identity and policy of the device.
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    pub vid: u16,
    pub pid: u16,
    pub pid_dfu: u16,
    /// Reject images whose `vid` field does not match.
    pub enforce_vid: bool,
    /// Reject images whose `pid` field does not match.
    pub enforce_pid: bool,
    /// Reject images whose `pid_dfu` field does not match.
    pub enforce_pid_dfu: bool,
    pub auth: AuthMode,
}

impl DeviceConfig {
    pub const DEFAULT: Self = Self {
        vid: VID,
        pid: PID,
        pid_dfu: PID_DFU,
        enforce_vid: false,
        enforce_pid: false,
        enforce_pid_dfu: false,
        auth: AuthMode::Hmac256,
    };
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
