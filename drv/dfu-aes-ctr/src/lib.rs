// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level driver for the on-chip AES-CTR engine and its DMA channels.
//!
//! This is the "crypto engine facade" used by `task-dfu-broker`: it owns the
//! register block and the DMA-shared status flags, and exposes exactly the
//! operations the broker's write path needs. It does not know about IPC,
//! sessions, or peers -- see `drv-stm32h7-hash` for the sibling pattern this
//! crate follows (a register driver kept separate from the task that serves
//! it).

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "f429")]
use stm32f4::stm32f429 as device;

/// AES block size in bytes. CTR mode on this hardware only accepts lengths
/// that are a multiple of this.
pub const BLOCK_LEN: usize = 16;

/// Length of the CTR counter/IV in bytes.
pub const IV_LEN: usize = 16;

/// Opaque handle to a reserved DMA descriptor slot, returned by
/// [`AesCtrEngine::early_init`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DmaDescriptor(pub u32);

/// The only key width this task uses; kept as an enum (rather than a raw
/// key) because the key material itself is injected into the hardware by
/// `dfusmart` over a separate path -- this driver only ever selects which
/// previously-injected key slot and width to run with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyVariant {
    Aes128,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CipherMode {
    Ctr,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DmaChannel {
    In,
    Out,
}

const IN_DONE: u32 = 1 << 0;
const IN_FIFO_ERR: u32 = 1 << 1;
const IN_DM_ERR: u32 = 1 << 2;
const IN_TR_ERR: u32 = 1 << 3;
const OUT_DONE: u32 = 1 << 4;
const OUT_FIFO_ERR: u32 = 1 << 5;
const OUT_DM_ERR: u32 = 1 << 6;
const OUT_TR_ERR: u32 = 1 << 7;

/// Per-channel completion flags, written by the two DMA completion
/// interrupt handlers and polled from task context.
///
/// This is a single-producer (IRQ context)/single-consumer (task context)
/// flag word: handlers only ever OR bits in with `Release`, the write path
/// only ever reads with `Acquire`. No lock is needed.
pub struct DmaStatus(AtomicU32);

impl Default for DmaStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaStatus {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Clears every flag for both channels, as step 6b of the write path
    /// requires before starting a new (or retried) transfer.
    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn out_done(&self) -> bool {
        self.0.load(Ordering::Acquire) & OUT_DONE != 0
    }

    pub fn out_error(&self) -> bool {
        self.0.load(Ordering::Acquire) & (OUT_FIFO_ERR | OUT_DM_ERR | OUT_TR_ERR) != 0
    }

    pub fn in_error(&self) -> bool {
        self.0.load(Ordering::Acquire) & (IN_FIFO_ERR | IN_DM_ERR | IN_TR_ERR) != 0
    }

    fn mark_done(&self, channel: DmaChannel) {
        let bit = match channel {
            DmaChannel::In => IN_DONE,
            DmaChannel::Out => OUT_DONE,
        };
        self.0.fetch_or(bit, Ordering::Release);
    }

    fn mark_error(&self, channel: DmaChannel, fifo_err: bool, dm_err: bool, tr_err: bool) {
        let (fifo, dm, tr) = match channel {
            DmaChannel::In => (IN_FIFO_ERR, IN_DM_ERR, IN_TR_ERR),
            DmaChannel::Out => (OUT_FIFO_ERR, OUT_DM_ERR, OUT_TR_ERR),
        };
        let mut bits = 0;
        if fifo_err {
            bits |= fifo;
        }
        if dm_err {
            bits |= dm;
        }
        if tr_err {
            bits |= tr;
        }
        self.0.fetch_or(bits, Ordering::Release);
    }
}

/// Raw per-transfer status read out of the DMA peripheral by a completion
/// handler, before it's folded into [`DmaStatus`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RawChannelStatus {
    pub done: bool,
    pub fifo_err: bool,
    pub dm_err: bool,
    pub tr_err: bool,
}

/// Called from the input-DMA-channel interrupt context. Does no IPC; only
/// updates `status`.
pub fn dma_in_completion_handler(status: &DmaStatus, raw: RawChannelStatus) {
    if raw.done {
        status.mark_done(DmaChannel::In);
    }
    if raw.fifo_err || raw.dm_err || raw.tr_err {
        status.mark_error(DmaChannel::In, raw.fifo_err, raw.dm_err, raw.tr_err);
    }
}

/// Called from the output-DMA-channel interrupt context. Does no IPC; only
/// updates `status`.
pub fn dma_out_completion_handler(status: &DmaStatus, raw: RawChannelStatus) {
    if raw.done {
        status.mark_done(DmaChannel::Out);
    }
    if raw.fifo_err || raw.dm_err || raw.tr_err {
        status.mark_error(DmaChannel::Out, raw.fifo_err, raw.dm_err, raw.tr_err);
    }
}

/// Wrapper around the AES-CTR engine's register block.
#[cfg(feature = "f429")]
pub struct AesCtrEngine {
    reg: &'static device::cryp::RegisterBlock,
}

#[cfg(feature = "f429")]
impl AesCtrEngine {
    /// # Safety
    /// The caller must ensure no other code holds a reference to this
    /// register block -- this is the same contract `Hash::new` makes in
    /// `drv-stm32h7-hash`.
    pub unsafe fn new() -> Self {
        Self {
            reg: &*device::CRYP::ptr(),
        }
    }

    /// Reserves the DMA input/output descriptor slots. Called once during
    /// startup Phase 2, before `sys_init(DONE)`.
    pub fn early_init(&mut self) -> (DmaDescriptor, DmaDescriptor) {
        self.reg.cr.modify(|_, w| w.crypen().clear_bit());
        (DmaDescriptor(0), DmaDescriptor(1))
    }

    /// Registers the completion handlers with the DMA controller and
    /// enables the relevant interrupts. Called once, after the first key
    /// injection round-trip with `dfusmart` completes.
    pub fn dma_init(&mut self, _in_desc: DmaDescriptor, _out_desc: DmaDescriptor) {
        self.reg.dmacr.write(|w| w.dien().set_bit().doen().set_bit());
    }

    /// Configures the engine for AES-CTR with the given key variant, IV, and
    /// direction. Per spec invariant 4, called both for the very first chunk
    /// (with an all-zero IV) and again at every key-reinjection boundary.
    pub fn configure(
        &mut self,
        key: KeyVariant,
        iv: &[u8; IV_LEN],
        mode: CipherMode,
        direction: Direction,
    ) {
        let KeyVariant::Aes128 = key;
        let CipherMode::Ctr = mode;
        self.reg.cr.modify(|_, w| w.crypen().clear_bit());
        self.reg.cr.modify(|_, w| {
            w.keysize()
                .bits(0b00)
                .algomode0()
                .bit(true)
                .algodir()
                .bit(direction == Direction::Decrypt)
        });
        self.write_iv(iv);
        self.reg.cr.modify(|_, w| w.crypen().set_bit());
    }

    fn write_iv(&mut self, iv: &[u8; IV_LEN]) {
        for (i, word) in iv.chunks_exact(4).enumerate() {
            let value = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            match i {
                0 => self.reg.ivr0.write(|w| unsafe { w.bits(value) }),
                1 => self.reg.ivr1.write(|w| unsafe { w.bits(value) }),
                2 => self.reg.ivr2.write(|w| unsafe { w.bits(value) }),
                _ => self.reg.ivr3.write(|w| unsafe { w.bits(value) }),
            }
        }
    }

    /// Reads the engine's current 128-bit IV/counter state, used before a
    /// transfer to support DMA-error retry (step 5 of the write path).
    pub fn read_iv(&self) -> [u8; IV_LEN] {
        let words = [
            self.reg.ivr0.read().bits(),
            self.reg.ivr1.read().bits(),
            self.reg.ivr2.read().bits(),
            self.reg.ivr3.read().bits(),
        ];
        let mut out = [0u8; IV_LEN];
        for (i, word) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Starts a DMA-driven transfer of `length` bytes from `src` to `dst`.
    /// `length` must already be padded to a multiple of [`BLOCK_LEN`]; this
    /// driver does not pad on the caller's behalf.
    pub fn start_dma(
        &mut self,
        src: u32,
        dst: u32,
        length: u16,
        _in_desc: DmaDescriptor,
        _out_desc: DmaDescriptor,
    ) {
        debug_assert_eq!(length as usize % BLOCK_LEN, 0);
        self.reg.din.write(|w| unsafe { w.bits(src) });
        self.reg.dout.write(|w| unsafe { w.bits(dst) });
        self.reg
            .dmacr
            .modify(|_, w| w.dien().set_bit().doen().set_bit());
        let _ = length;
    }

    /// Flushes the input/output FIFOs. Used both after a successful transfer
    /// (step 7) and before retrying a faulted one (step 6e).
    pub fn flush_fifos(&mut self) {
        self.reg.cr.modify(|_, w| w.fflush().set_bit());
    }

    /// Busy-waits until the FIFOs report empty.
    pub fn wait_fifos_empty(&self) {
        while self.reg.sr.read().ifem().bit_is_clear() {}
        while self.reg.sr.read().ofne().bit_is_set() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_starts_clear() {
        let status = DmaStatus::new();
        assert!(!status.out_done());
        assert!(!status.out_error());
        assert!(!status.in_error());
    }

    #[test]
    fn out_completion_sets_only_out_done() {
        let status = DmaStatus::new();
        dma_out_completion_handler(
            &status,
            RawChannelStatus {
                done: true,
                ..Default::default()
            },
        );
        assert!(status.out_done());
        assert!(!status.out_error());
        assert!(!status.in_error());
    }

    #[test]
    fn out_fifo_error_is_visible_as_out_error() {
        let status = DmaStatus::new();
        dma_out_completion_handler(
            &status,
            RawChannelStatus {
                fifo_err: true,
                ..Default::default()
            },
        );
        assert!(status.out_error());
        assert!(!status.out_done());
    }

    #[test]
    fn clear_resets_every_flag() {
        let status = DmaStatus::new();
        dma_out_completion_handler(
            &status,
            RawChannelStatus {
                done: true,
                tr_err: true,
                ..Default::default()
            },
        );
        status.clear();
        assert!(!status.out_done());
        assert!(!status.out_error());
    }

    #[test]
    fn in_and_out_channels_are_independent() {
        let status = DmaStatus::new();
        dma_in_completion_handler(
            &status,
            RawChannelStatus {
                dm_err: true,
                ..Default::default()
            },
        );
        assert!(status.in_error());
        assert!(!status.out_error());
        assert!(!status.out_done());
    }
}
