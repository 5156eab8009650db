// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory doubles for the hardware seams, used by the test suite and the
//! host-side simulation.
//!
//! `MemFlash` models NOR semantics: erased pages read as all `0xFF` and
//! programming can only clear bits. Write faults can be injected to exercise
//! the torn-write recovery paths.

use crate::bl_data::TrimCodes;
use crate::config::PAGE_SIZE;
use crate::flash::{Flash, FlashCtrl, FlashError, FlashRegion};
use crate::Board;

/// Pages per system region in the simulated part.
pub const SIM_SYS_PAGES: usize = 96;
/// Pages per data region in the simulated part (the BL-Data section).
pub const SIM_DATA_PAGES: usize = 2;

const CTRL_COUNT: usize = 2;

/// In-memory flash with two controllers, each with a system and a data
/// region.
pub struct MemFlash {
    sys: [[u8; SIM_SYS_PAGES * PAGE_SIZE]; CTRL_COUNT],
    data: [[u8; SIM_DATA_PAGES * PAGE_SIZE]; CTRL_COUNT],
    /// Remaining erase/program operations before an injected failure, if a
    /// fault is armed.
    ops_until_fail: Option<u32>,
    /// If armed, the next program writes only this many words, then fails.
    truncate_words: Option<usize>,
    /// If armed, the next program lands with one bit wrong, as a marginal
    /// cell would read back.
    corrupt_next: bool,
    /// Prefetch flush pulses observed, per controller.
    pub flush_pulses: [u32; CTRL_COUNT],
    flush_line: [bool; CTRL_COUNT],
}

impl MemFlash {
    /// A fully erased part.
    pub fn new() -> Self {
        Self {
            sys: [[0xFF; SIM_SYS_PAGES * PAGE_SIZE]; CTRL_COUNT],
            data: [[0xFF; SIM_DATA_PAGES * PAGE_SIZE]; CTRL_COUNT],
            ops_until_fail: None,
            truncate_words: None,
            corrupt_next: false,
            flush_pulses: [0; CTRL_COUNT],
            flush_line: [false; CTRL_COUNT],
        }
    }

    /// Fail every erase/program operation after the next `n` succeed.
    pub fn fail_after_ops(&mut self, n: u32) {
        self.ops_until_fail = Some(n);
    }

    /// Make the next program write only `words` words and then fail,
    /// simulating a power cut mid-page.
    pub fn truncate_next_program(&mut self, words: usize) {
        self.truncate_words = Some(words);
    }

    /// Make the next program complete with a single-bit readback error.
    pub fn corrupt_next_program(&mut self) {
        self.corrupt_next = true;
    }

    /// Disarm all injected faults.
    pub fn clear_faults(&mut self) {
        self.ops_until_fail = None;
        self.truncate_words = None;
        self.corrupt_next = false;
    }

    /// Direct read access to a whole page, for assertions.
    pub fn page(&self, ctrl: FlashCtrl, region: FlashRegion, page: u32) -> &[u8] {
        let base = page as usize * PAGE_SIZE;
        &self.region(ctrl, region)[base..base + PAGE_SIZE]
    }

    fn region(&self, ctrl: FlashCtrl, region: FlashRegion) -> &[u8] {
        match region {
            FlashRegion::Sys => &self.sys[ctrl as usize],
            FlashRegion::Data => &self.data[ctrl as usize],
        }
    }

    fn region_mut(&mut self, ctrl: FlashCtrl, region: FlashRegion) -> &mut [u8] {
        match region {
            FlashRegion::Sys => &mut self.sys[ctrl as usize],
            FlashRegion::Data => &mut self.data[ctrl as usize],
        }
    }

    /// Account one erase/program operation against an armed fault.
    fn take_op(&mut self) -> Result<(), FlashError> {
        match &mut self.ops_until_fail {
            Some(0) => Err(FlashError::Program),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for MemFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl Flash for MemFlash {
    fn erase_page(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        page: u32,
    ) -> Result<(), FlashError> {
        self.take_op().map_err(|_| FlashError::Erase)?;
        let base = page as usize * PAGE_SIZE;
        let mem = self.region_mut(ctrl, region);
        if base + PAGE_SIZE > mem.len() {
            return Err(FlashError::OutOfRange);
        }
        mem[base..base + PAGE_SIZE].fill(0xFF);
        Ok(())
    }

    fn write_page(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        page: u32,
        words: &[u32],
    ) -> Result<(), FlashError> {
        if words.len() > PAGE_SIZE / 4 {
            return Err(FlashError::OutOfRange);
        }
        self.erase_page(ctrl, region, page)?;
        self.take_op()?;
        let limit = self.truncate_words.take();
        let corrupt = core::mem::take(&mut self.corrupt_next);
        let base = page as usize * PAGE_SIZE;
        let mem = self.region_mut(ctrl, region);
        for (i, &w) in words.iter().enumerate() {
            if limit.is_some_and(|l| i >= l) {
                return Err(FlashError::Program);
            }
            let off = base + i * 4;
            for (j, &b) in w.to_le_bytes().iter().enumerate() {
                // NOR programming only clears bits.
                mem[off + j] &= b;
            }
        }
        if corrupt && !words.is_empty() {
            mem[base] ^= 0x01;
        }
        Ok(())
    }

    fn write_word(
        &mut self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        word: u32,
    ) -> Result<(), FlashError> {
        self.take_op()?;
        let off = byte_offset as usize;
        let mem = self.region_mut(ctrl, region);
        if off % 4 != 0 || off + 4 > mem.len() {
            return Err(FlashError::OutOfRange);
        }
        for (j, &b) in word.to_le_bytes().iter().enumerate() {
            mem[off + j] &= b;
        }
        Ok(())
    }

    fn set_prefetch_flush(&mut self, ctrl: FlashCtrl, enable: bool) {
        let i = ctrl as usize;
        if enable && !self.flush_line[i] {
            self.flush_pulses[i] += 1;
        }
        self.flush_line[i] = enable;
    }

    fn read(
        &self,
        ctrl: FlashCtrl,
        region: FlashRegion,
        byte_offset: u32,
        buf: &mut [u8],
    ) -> Result<(), FlashError> {
        let off = byte_offset as usize;
        let mem = self.region(ctrl, region);
        if off + buf.len() > mem.len() {
            return Err(FlashError::OutOfRange);
        }
        buf.copy_from_slice(&mem[off..off + buf.len()]);
        Ok(())
    }
}

/// Board double: fixed trim codes and a panicking tamper response.
pub struct SimBoard {
    pub trim: TrimCodes,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            trim: TrimCodes([0x0000_2021, 0x0000_2223, 0x0000_2425, 0x0000_2627]),
        }
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for SimBoard {
    fn trim_codes(&mut self) -> TrimCodes {
        self.trim
    }

    fn tamper_halt(&mut self) -> ! {
        // The real board masks interrupts and spins forever; under test a
        // panic is the observable equivalent of "never returns".
        panic!("tamper response: BL-Data section invalid and not blank");
    }
}
