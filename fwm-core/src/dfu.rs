// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Request-level DFU state machine.
//!
//! The machine multiplexes two request handlers behind one uniform block
//! interface: the QFM handler on alternate setting 0 (metadata and admin)
//! and the QFU handler on alternate settings 1..N (one per partition).
//!
//! Block numbering seen by handlers always starts at zero and is maintained
//! here, independently of the host's wire block number. The host's first
//! block number is recorded; every subsequent block must follow it exactly.
//! Out-of-order blocks fail the transfer — handlers rely on blocks being
//! sequential.
//!
//! States `DnBusy`, `Manifest`, `AppIdle`, `AppDetach` and
//! `ManifestWaitReset` exist as wire values but are never entered: blocks
//! are committed to flash as they arrive, so the machine never lingers in a
//! busy state.

use zeroize::Zeroize;

use crate::bl_data::{BlData, BlDataStore};
use crate::config::{DeviceConfig, ALT_SETTING_COUNT};
use crate::flash::{Flash, FlashError};
use crate::qfm::QfmHandler;
use crate::qfu::QfuHandler;
use crate::Board;

/// DFU device status codes (wire values).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuStatus {
    Ok = 0x00,
    /// File is not targeted for this device.
    ErrTarget = 0x01,
    /// File is for this device but fails a vendor-specific check.
    ErrFile = 0x02,
    ErrWrite = 0x03,
    ErrErase = 0x04,
    ErrCheckErased = 0x05,
    ErrProg = 0x06,
    /// Programmed memory failed verification.
    ErrVerify = 0x07,
    /// Received address out of range.
    ErrAddress = 0x08,
    /// Empty Dnload received but the device expects more data.
    ErrNotDone = 0x09,
    ErrFirmware = 0x0A,
    /// Vendor-specific error (here: out-of-order block or MAC failure).
    ErrVendor = 0x0B,
    ErrUsbr = 0x0C,
    ErrPor = 0x0D,
    ErrUnknown = 0x0E,
    /// Device stalled an unexpected request.
    ErrStalledPkt = 0x0F,
}

/// DFU device states (wire values).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuState {
    /// Reserved wire value; never entered in DFU mode.
    AppIdle = 0,
    /// Reserved wire value; never entered in DFU mode.
    AppDetach = 1,
    /// Waiting for requests.
    Idle = 2,
    /// A Dnload block was received; waiting for GetStatus.
    DnloadSync = 3,
    /// Reserved; blocks are committed synchronously.
    DnBusy = 4,
    /// A Dnload transfer is in progress; expecting more blocks.
    DnloadIdle = 5,
    /// Final block received; waiting for GetStatus to manifest.
    ManifestSync = 6,
    /// Reserved; manifestation is synchronous.
    Manifest = 7,
    /// Reserved wire value; never entered.
    ManifestWaitReset = 8,
    /// An Upload transfer is in progress.
    UploadIdle = 9,
    /// An error occurred; awaiting ClrStatus.
    Error = 10,
}

/// A rejected request. The transport stalls it; the detail is surfaced
/// through GetStatus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stall;

/// Shared device services handed to the backend handlers.
pub(crate) struct Ctx<'a, F: Flash, B: Board> {
    pub flash: &'a mut F,
    pub board: &'a mut B,
    pub store: &'a mut BlDataStore,
    pub cfg: &'a DeviceConfig,
}

/// The capability set every DFU request handler provides.
pub(crate) trait RequestHandler {
    /// Called when an alternate setting bound to this handler is selected.
    fn init<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>, alt: u8);

    /// Status of the last Dnload block processing and the poll timeout the
    /// host must respect before the next GetStatus.
    fn status(&mut self) -> (DfuStatus, u32);

    /// Reset the handler after an error (ClrStatus).
    fn clear<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>);

    /// Process Dnload block `seq` (first block of a transfer is 0).
    fn process_dnload<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
        data: &[u8],
    );

    /// The host signalled the end of the Dnload transfer after `seq` blocks.
    fn finalize<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
    ) -> Result<(), DfuStatus>;

    /// Fill Upload block `seq`; returns the number of bytes written. Writing
    /// less than `out.len()` ends the transfer.
    fn fill_upload(&mut self, seq: u32, out: &mut [u8]) -> usize;

    /// Abort the current Dnload transfer.
    fn abort<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>);
}

/// The two backends, dispatched by active alternate setting.
pub(crate) enum Backend {
    Qfm(QfmHandler),
    Qfu(QfuHandler),
}

macro_rules! dispatch {
    ($self:expr, $h:ident => $e:expr) => {
        match $self {
            Backend::Qfm($h) => $e,
            Backend::Qfu($h) => $e,
        }
    };
}

impl Backend {
    fn init<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>, alt: u8) {
        dispatch!(self, h => h.init(ctx, alt))
    }
    fn status(&mut self) -> (DfuStatus, u32) {
        dispatch!(self, h => h.status())
    }
    fn clear<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>) {
        dispatch!(self, h => h.clear(ctx))
    }
    fn process_dnload<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
        data: &[u8],
    ) {
        dispatch!(self, h => h.process_dnload(ctx, seq, data))
    }
    fn finalize<F: Flash, B: Board>(
        &mut self,
        ctx: &mut Ctx<'_, F, B>,
        seq: u32,
    ) -> Result<(), DfuStatus> {
        dispatch!(self, h => h.finalize(ctx, seq))
    }
    fn fill_upload(&mut self, seq: u32, out: &mut [u8]) -> usize {
        dispatch!(self, h => h.fill_upload(seq, out))
    }
    fn abort<F: Flash, B: Board>(&mut self, ctx: &mut Ctx<'_, F, B>) {
        dispatch!(self, h => h.abort(ctx))
    }
}

/// The DFU core: owns the flash, the board services, the BL-Data store and
/// the active backend, and processes one host request at a time.
pub struct DfuCore<F: Flash, B: Board> {
    flash: F,
    board: B,
    cfg: DeviceConfig,
    store: BlDataStore,
    backend: Backend,
    state: DfuState,
    status: DfuStatus,
    /// Zero-based block counter handed to the backend.
    block_cnt: u32,
    /// Wire block number expected next from the host.
    next_block: u16,
}

impl<F: Flash, B: Board> DfuCore<F, B> {
    /// Sanitize BL-Data, then start in the default alternate setting (0).
    pub fn new(mut flash: F, mut board: B, cfg: DeviceConfig) -> Result<Self, FlashError> {
        let store = BlDataStore::load(&mut flash, &mut board)?;
        let mut core = Self {
            flash,
            board,
            cfg,
            store,
            backend: Backend::Qfm(QfmHandler::new()),
            state: DfuState::Idle,
            status: DfuStatus::Ok,
            block_cnt: 0,
            next_block: 0,
        };
        core.activate(0);
        Ok(core)
    }

    /// Select an alternate setting: 0 activates the QFM handler, any higher
    /// value the QFU handler for partition `alt - 1`. Resets the machine.
    pub fn set_alt_setting(&mut self, alt: u8) -> Result<(), Stall> {
        if alt >= ALT_SETTING_COUNT {
            return Err(Stall);
        }
        self.activate(alt);
        Ok(())
    }

    /// Process a Dnload request. The payload is zeroized before returning,
    /// whatever the outcome: key material may traverse this buffer.
    pub fn process_dnload(&mut self, block_num: u16, data: &mut [u8]) -> Result<(), Stall> {
        match self.state {
            DfuState::Idle => {
                // A new transfer; its first block cannot be empty.
                if data.is_empty() {
                    return self.stall(DfuStatus::ErrStalledPkt);
                }
                self.block_cnt = 0;
            }
            DfuState::DnloadIdle => {
                if block_num != self.next_block {
                    return self.stall(DfuStatus::ErrVendor);
                }
                if data.is_empty() {
                    // End of the transfer; ask the backend to manifest.
                    let mut ctx = Ctx {
                        flash: &mut self.flash,
                        board: &mut self.board,
                        store: &mut self.store,
                        cfg: &self.cfg,
                    };
                    return match self.backend.finalize(&mut ctx, self.block_cnt) {
                        Ok(()) => {
                            self.state = DfuState::ManifestSync;
                            Ok(())
                        }
                        Err(status) => self.stall(status),
                    };
                }
            }
            _ => return self.stall(DfuStatus::ErrStalledPkt),
        }
        self.next_block = block_num.wrapping_add(1);
        let mut ctx = Ctx {
            flash: &mut self.flash,
            board: &mut self.board,
            store: &mut self.store,
            cfg: &self.cfg,
        };
        self.backend.process_dnload(&mut ctx, self.block_cnt, data);
        data.zeroize();
        self.block_cnt += 1;
        self.state = DfuState::DnloadSync;
        Ok(())
    }

    /// Process an Upload request; returns the number of bytes written into
    /// `out`. Writing less than `out.len()` ends the transfer.
    pub fn process_upload(&mut self, block_num: u16, out: &mut [u8]) -> Result<usize, Stall> {
        match self.state {
            DfuState::Idle => {
                self.block_cnt = 0;
                self.next_block = block_num;
            }
            DfuState::UploadIdle => {}
            _ => return self.stall(DfuStatus::ErrStalledPkt),
        }
        if block_num != self.next_block {
            return self.stall(DfuStatus::ErrVendor);
        }
        let len = self.backend.fill_upload(self.block_cnt, out);
        self.next_block = block_num.wrapping_add(1);
        self.block_cnt += 1;
        self.state = if len < out.len() {
            DfuState::Idle
        } else {
            DfuState::UploadIdle
        };
        Ok(len)
    }

    /// GetStatus: report status, state and the poll timeout. In the sync
    /// states this polls the backend and advances the machine.
    pub fn get_status(&mut self) -> (DfuStatus, DfuState, u32) {
        let mut poll_ms = 0;
        if matches!(self.state, DfuState::DnloadSync | DfuState::ManifestSync) {
            let (status, poll) = self.backend.status();
            self.status = status;
            poll_ms = poll;
            if status != DfuStatus::Ok {
                self.state = DfuState::Error;
            } else if poll_ms == 0 {
                self.state = if self.state == DfuState::DnloadSync {
                    DfuState::DnloadIdle
                } else {
                    DfuState::Idle
                };
            }
            // A nonzero poll timeout would transition through DnBusy or
            // Manifest behind a timer; blocks are committed synchronously
            // here, so the machine stays put and a well-behaved host simply
            // polls again.
        }
        (self.status, self.state, poll_ms)
    }

    /// GetState: report the current state.
    pub fn get_state(&self) -> DfuState {
        self.state
    }

    /// ClrStatus: leave the error state. Only valid in the error state.
    pub fn clr_status(&mut self) -> Result<(), Stall> {
        if self.state != DfuState::Error {
            return self.stall(DfuStatus::ErrStalledPkt);
        }
        let mut ctx = Ctx {
            flash: &mut self.flash,
            board: &mut self.board,
            store: &mut self.store,
            cfg: &self.cfg,
        };
        self.backend.clear(&mut ctx);
        self.state = DfuState::Idle;
        self.status = DfuStatus::Ok;
        Ok(())
    }

    /// Abort the transfer in progress and return to Idle.
    pub fn abort(&mut self) -> Result<(), Stall> {
        match self.state {
            DfuState::DnloadIdle => {
                let mut ctx = Ctx {
                    flash: &mut self.flash,
                    board: &mut self.board,
                    store: &mut self.store,
                    cfg: &self.cfg,
                };
                self.backend.abort(&mut ctx);
            }
            DfuState::UploadIdle => {}
            _ => return self.stall(DfuStatus::ErrStalledPkt),
        }
        self.state = DfuState::Idle;
        Ok(())
    }

    /// Read access to the BL-Data shadow.
    pub fn bl_data(&self) -> &BlData {
        self.store.data()
    }

    /// Read access to the flash behind the core.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable access to the flash behind the core.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    fn activate(&mut self, alt: u8) {
        self.state = DfuState::Idle;
        self.status = DfuStatus::Ok;
        self.backend = if alt == 0 {
            Backend::Qfm(QfmHandler::new())
        } else {
            Backend::Qfu(QfuHandler::new())
        };
        let mut ctx = Ctx {
            flash: &mut self.flash,
            board: &mut self.board,
            store: &mut self.store,
            cfg: &self.cfg,
        };
        self.backend.init(&mut ctx, alt);
    }

    fn stall<T>(&mut self, status: DfuStatus) -> Result<T, Stall> {
        self.state = DfuState::Error;
        self.status = status;
        Err(Stall)
    }
}
