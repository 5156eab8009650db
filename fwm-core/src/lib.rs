// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware-management core of the boot ROM.
//!
//! This crate owns the device's persistent bootloader metadata (BL-Data),
//! accepts authenticated QFU firmware images over a request-level DFU
//! interface, writes them into partitioned flash while staying bootable
//! across power loss, and selects the application partition to hand control
//! to.
//!
//! Hardware is reached only through two seams: the [`flash::Flash`] driver
//! trait and the [`Board`] trait (trim codes, tamper response). Interrupt
//! masking goes through `critical-section`. The crate is `no_std` by
//! default; the `std` feature enables the host-side pieces used by tools
//! and tests.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bl_data;
pub mod boot;
pub mod config;
pub mod crypto;
pub mod dfu;
pub mod flash;
pub mod image;
pub mod qfm;
pub mod qfu;
pub mod sim;

pub use bl_data::{BlData, BlDataStore, Partition, Target, TrimCodes};
pub use config::{AuthMode, DeviceConfig};
pub use dfu::{DfuCore, DfuState, DfuStatus, Stall};
pub use flash::{Flash, FlashCtrl, FlashError, FlashRegion};

/// Board services the core cannot provide for itself.
pub trait Board {
    /// Compute the per-frequency oscillator trim codes. Called once, during
    /// first-boot provisioning; the result is shadowed in BL-Data.
    fn trim_codes(&mut self) -> TrimCodes;

    /// Terminal tamper response: mask interrupts and trap control flow.
    /// Never returns and must not be recoverable.
    fn tamper_halt(&mut self) -> !;
}

impl<T: Board + ?Sized> Board for &mut T {
    fn trim_codes(&mut self) -> TrimCodes {
        (**self).trim_codes()
    }

    fn tamper_halt(&mut self) -> ! {
        (**self).tamper_halt()
    }
}
