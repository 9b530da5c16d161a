// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The DFU crypto broker task.
//!
//! Mediates IPC between the USB DFU receiver (`dfuusb`), the flash writer
//! (`dfuflash`), the key/authentication manager (`dfusmart`), and the
//! PIN/UI task (`pin`), while driving the on-chip AES-CTR engine over DMA
//! for every write chunk. See `startup`, `dispatch`, and `write_path` for
//! the three phases of the task's life: six-phase handshake, steady-state
//! message routing, and the crypto core itself.

#![no_std]
#![no_main]

mod config;
mod dispatch;
mod errors;
mod fault;
mod shm;
mod startup;
mod write_path;

use drv_dfu_proto::Magic;
use errors::Fault;
use ringbuf::*;

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    PeersResolved,
    HwEarlyInitDone,
    AllPeersReady,
    KeyInjected,
    AuthConfirmed,
    RuntimeSignaled,
    ShmExchangeDone,
    Dispatch(Magic),
    Reinjecting,
    DmaRetry(u32),
    Fault(Fault),
    Halted,
    None,
}

ringbuf!(Trace, 64, Trace::None);

#[export_name = "main"]
fn main() -> ! {
    let startup = match startup::Startup::new() {
        Ok(s) => s,
        Err(_) => fault::halt_and_yield(),
    };
    let startup = startup.early_init().await_readiness();
    let startup = match startup.inject_key() {
        Ok(s) => s,
        Err(_) => fault::halt_and_yield(),
    };
    let startup = match startup.start_runtime() {
        Ok(s) => s,
        Err(_) => fault::halt_and_yield(),
    };

    dispatch::run(startup)
}
