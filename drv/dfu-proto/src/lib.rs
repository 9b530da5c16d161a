// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire types shared between the DFU crypto broker and its peer tasks
//! (`dfuusb`, `dfuflash`, `dfusmart`, `pin`).
//!
//! Every type here is `#[repr(C)]` plus `FromBytes`/`AsBytes`/`Unaligned` so
//! that the layout is byte-exact across tasks built from this crate. Nothing
//! in this crate touches hardware or IPC directly; it is the pure data model.

#![cfg_attr(not(test), no_std)]

use num_derive::{FromPrimitive, ToPrimitive};
use zerocopy::{AsBytes, FromBytes, FromZeros, Unaligned};

/// Discriminator carried as the Hubris IPC operation code. This is the
/// `magic` of the envelope: every message the broker sends or receives is
/// tagged with exactly one of these.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum Magic {
    TaskStateCmd = 1,
    TaskStateResp = 2,
    CryptoInjectCmd = 3,
    CryptoInjectResp = 4,
    AuthStatePassed = 5,
    DataRdDmaReq = 6,
    DataWrDmaReq = 7,
    DataWrDmaAck = 8,
    DfuHeaderSend = 9,
    DfuHeaderValid = 10,
    DfuHeaderInvalid = 11,
    DfuDwnloadFinished = 12,
    DfuWriteFinished = 13,
    RebootRequest = 14,
    Invalid = 15,
}

impl From<Magic> for u16 {
    fn from(m: Magic) -> Self {
        m as u16
    }
}

/// The envelope's `state` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum SyncState {
    Wait = 0,
    Ready = 1,
    Acknowledge = 2,
    Done = 3,
}

/// Maximum payload size carried by [`SyncCommandData`]. Sized to hold a
/// `master_key_hash` (32 bytes), the widest payload in the protocol.
pub const MAX_PAYLOAD: usize = 32;

/// The small envelope variant: a magic, a state, and a 16-bit word
/// (`data.u16[0]` in the original protocol, used to carry chunk sizes).
#[derive(Copy, Clone, Debug, FromBytes, FromZeros, AsBytes, Unaligned)]
#[repr(C)]
pub struct SyncCommand {
    pub magic: u16,
    pub state: u8,
    _reserved: u8,
    payload: [u8; 2],
}

impl SyncCommand {
    pub fn new(magic: Magic, state: SyncState) -> Self {
        Self {
            magic: magic as u16,
            state: state as u8,
            _reserved: 0,
            payload: [0; 2],
        }
    }

    pub fn with_chunk_size(magic: Magic, state: SyncState, chunk_size: u16) -> Self {
        let mut cmd = Self::new(magic, state);
        cmd.set_chunk_size(chunk_size);
        cmd
    }

    pub fn chunk_size(&self) -> u16 {
        u16::from_le_bytes(self.payload)
    }

    pub fn set_chunk_size(&mut self, size: u16) {
        self.payload = size.to_le_bytes();
    }
}

/// The large envelope variant, extending [`SyncCommand`] with a full
/// `MAX_PAYLOAD`-byte payload (e.g. a `master_key_hash`).
#[derive(Copy, Clone, Debug, FromBytes, FromZeros, AsBytes, Unaligned)]
#[repr(C)]
pub struct SyncCommandData {
    pub magic: u16,
    pub state: u8,
    _reserved: u8,
    payload: [u8; MAX_PAYLOAD],
}

impl SyncCommandData {
    pub fn new(magic: Magic, state: SyncState) -> Self {
        Self {
            magic: magic as u16,
            state: state as u8,
            _reserved: 0,
            payload: [0; MAX_PAYLOAD],
        }
    }

    pub fn chunk_size(&self) -> u16 {
        u16::from_le_bytes([self.payload[0], self.payload[1]])
    }

    pub fn set_chunk_size(&mut self, size: u16) {
        let b = size.to_le_bytes();
        self.payload[0] = b[0];
        self.payload[1] = b[1];
    }

    pub fn key_hash(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.payload[..32]);
        out
    }

    pub fn set_key_hash(&mut self, hash: [u8; 32]) {
        self.payload[..32].copy_from_slice(&hash);
    }

    pub fn into_small(self) -> SyncCommand {
        let mut small = SyncCommand::new(
            num_traits::FromPrimitive::from_u16(self.magic)
                .unwrap_or(Magic::Invalid),
            num_traits::FromPrimitive::from_u8(self.state)
                .unwrap_or(SyncState::Wait),
        );
        small.payload.copy_from_slice(&self.payload[..2]);
        small
    }
}

/// Shared-memory descriptor advertised by a peer during startup Phase 6.
#[derive(Copy, Clone, Debug, FromBytes, FromZeros, AsBytes, Unaligned)]
#[repr(C)]
pub struct ShmInfo {
    pub address: u32,
    pub size: u16,
    _reserved: u16,
}

impl ShmInfo {
    pub fn new(address: u32, size: u16) -> Self {
        Self {
            address,
            size,
            _reserved: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_command_round_trips_chunk_size() {
        let cmd = SyncCommand::with_chunk_size(
            Magic::DataWrDmaReq,
            SyncState::Ready,
            512,
        );
        assert_eq!(cmd.chunk_size(), 512);
        assert_eq!(cmd.magic, Magic::DataWrDmaReq as u16);
    }

    #[test]
    fn sync_command_data_round_trips_key_hash() {
        let mut cmd = SyncCommandData::new(Magic::CryptoInjectResp, SyncState::Done);
        let hash = [0x42u8; 32];
        cmd.set_key_hash(hash);
        assert_eq!(cmd.key_hash(), hash);
    }

    #[test]
    fn envelope_sizes_are_wire_stable() {
        assert_eq!(core::mem::size_of::<SyncCommand>(), 6);
        assert_eq!(core::mem::size_of::<SyncCommandData>(), 4 + MAX_PAYLOAD);
        assert_eq!(core::mem::size_of::<ShmInfo>(), 8);
    }

    #[test]
    fn into_small_preserves_chunk_size_word() {
        let mut big = SyncCommandData::new(Magic::DfuHeaderValid, SyncState::Done);
        big.set_chunk_size(4096);
        let small = big.into_small();
        assert_eq!(small.chunk_size(), 4096);
        assert_eq!(small.magic, Magic::DfuHeaderValid as u16);
    }
}
