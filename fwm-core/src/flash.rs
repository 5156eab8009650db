// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash access façade.
//!
//! The core never touches flash hardware directly; it programs and reads
//! pages through this trait. Page erase and page program are the only write
//! granularities used on the hot path; a page program is always preceded by
//! an erase of the same page. Controllers keep a prefetch buffer that must be
//! flushed after any program or erase that changes a cached page.

use crate::config::PAGE_SIZE;

/// Flash controller selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashCtrl {
    C0 = 0,
    C1 = 1,
}

/// Region within a flash controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashRegion {
    /// System region: application partitions.
    Sys,
    /// Data region: the BL-Data section.
    Data,
}

/// Flash driver failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Page erase failed.
    Erase,
    /// Program operation failed.
    Program,
    /// Page or offset outside the region.
    OutOfRange,
}

/// Low-level flash driver contract consumed by the core.
pub trait Flash {
    /// Erase one page. The page reads back as all `0xFF` afterwards.
    fn erase_page(&mut self, ctrl: FlashCtrl, region: FlashRegion, page: u32)
        -> Result<(), FlashError>;

    /// Erase `page`, then program `words` from the start of the page.
    /// `words.len()` must not exceed the page size.
    fn write_page(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        page: u32,
        words: &[u32],
    ) -> Result<(), FlashError>;

    /// Program a single word at a byte offset within the region. The target
    /// word must be in the erased state.
    fn write_word(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        word: u32,
    ) -> Result<(), FlashError>;

    /// Assert or release the prefetch-buffer flush line of a controller.
    fn set_prefetch_flush(&mut self, ctrl: FlashCtrl, enable: bool);

    /// Read `buf.len()` bytes starting at a byte offset within the region.
    fn read(
        &self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        buf: &mut [u8],
    ) -> Result<(), FlashError>;
}

impl<T: Flash + ?Sized> Flash for &mut T {
    fn erase_page(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        page: u32,
    ) -> Result<(), FlashError> {
        (**self).erase_page(ctrl, region, page)
    }

    fn write_page(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        page: u32,
        words: &[u32],
    ) -> Result<(), FlashError> {
        (**self).write_page(ctrl, region, page, words)
    }

    fn write_word(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        word: u32,
    ) -> Result<(), FlashError> {
        (**self).write_word(ctrl, region, byte_offset, word)
    }

    fn set_prefetch_flush(&mut self, ctrl: FlashCtrl, enable: bool) {
        (**self).set_prefetch_flush(ctrl, enable)
    }

    fn read(
        &self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        buf: &mut [u8],
    ) -> Result<(), FlashError> {
        (**self).read(ctrl, region, byte_offset, buf)
    }
}

/// Pulse the prefetch flush line after a program/erase burst so stale cached
/// pages are dropped.
pub fn flush_prefetch<F: Flash>(flash: &mut F, ctrl: FlashCtrl) {
    flash.set_prefetch_flush(ctrl, true);
    flash.set_prefetch_flush(ctrl, false);
}

/// Read one page into `buf` (`buf.len()` must be `PAGE_SIZE`).
pub fn read_page<F: Flash>(
    flash: &F,
    ctrl: FlashCtrl,
    region: FlashRegion,
    page: u32,
    buf: &mut [u8; PAGE_SIZE],
) -> Result<(), FlashError> {
    flash.read(ctrl, region, page * PAGE_SIZE as u32, buf)
}
