//! The six-phase startup handshake. Expressed as a typestate sequence: a
//! `Startup<Phase>` value can only be advanced by consuming it and
//! producing the next phase's marker, so `dispatch::run` can only be
//! called with a `Startup<Runtime>` obtained by actually completing every
//! phase -- the same "can't use it until it's proven ready" spirit as
//! `TaskSlot::get_task_id` panicking on an unbound slot, but made a
//! compile-time property instead of a runtime one.

use crate::errors::StartupError;
use crate::shm::ShmRegistry;
use crate::Trace;
use core::marker::PhantomData;
use dfu_session::{Readiness, Session};
use drv_dfu_aes_ctr::{AesCtrEngine, DmaDescriptor};
use drv_dfu_proto::{Magic, SyncCommand, SyncCommandData, SyncState};
use ringbuf::*;
use userlib::*;

task_slot!(SMART, dfusmart);
task_slot!(USB, dfuusb);
task_slot!(FLASH, dfuflash);
task_slot!(PIN, pin);

/// The four peer task ids, resolved once in Phase 1.
#[derive(Copy, Clone, Debug)]
pub struct Peers {
    pub smart: TaskId,
    pub usb: TaskId,
    pub flash: TaskId,
    pub pin: TaskId,
}

fn resolve(slot: &TaskSlot) -> Result<TaskId, StartupError> {
    if slot.get_task_index() == TaskId::UNBOUND.0 {
        Err(StartupError::PeerResolutionFailed)
    } else {
        Ok(slot.get_task_id())
    }
}

pub mod phase {
    pub struct Init;
    pub struct HwReady;
    pub struct PeersReady;
    pub struct Keyed;
    pub struct Runtime;
}

/// Typestate-sequenced startup. `P` is a zero-sized phase marker; only
/// `Startup<phase::Runtime>` can be handed to `dispatch::run`.
pub struct Startup<P> {
    pub peers: Peers,
    pub engine: AesCtrEngine,
    pub in_desc: DmaDescriptor,
    pub out_desc: DmaDescriptor,
    pub shm: ShmRegistry,
    pub session: Session,
    _phase: PhantomData<P>,
}

impl Startup<phase::Init> {
    /// Phase 1: resolve every peer's task id.
    pub fn new() -> Result<Self, StartupError> {
        let peers = Peers {
            smart: resolve(&SMART)?,
            usb: resolve(&USB)?,
            flash: resolve(&FLASH)?,
            pin: resolve(&PIN)?,
        };
        ringbuf_entry_root!(Trace::PeersResolved);

        // SAFETY: this is the only place in the task that constructs an
        // `AesCtrEngine`, and it happens once, before any peer can reach
        // the register through us.
        let engine = unsafe { AesCtrEngine::new() };

        Ok(Startup {
            peers,
            engine,
            in_desc: DmaDescriptor(0),
            out_desc: DmaDescriptor(0),
            shm: ShmRegistry::new(),
            session: Session::new(),
            _phase: PhantomData,
        })
    }

    /// Phase 2: reserve DMA descriptors and declare init done to the kernel.
    pub fn early_init(mut self) -> Startup<phase::HwReady> {
        let (in_desc, out_desc) = self.engine.early_init();
        ringbuf_entry_root!(Trace::HwEarlyInitDone);
        Startup {
            peers: self.peers,
            engine: self.engine,
            in_desc,
            out_desc,
            shm: self.shm,
            session: self.session,
            _phase: PhantomData,
        }
    }
}

impl Startup<phase::HwReady> {
    /// Phase 3: rendezvous with `dfusmart`/`dfuusb`/`dfuflash` in any order.
    pub fn await_readiness(self) -> Startup<phase::PeersReady> {
        let mut readiness = Readiness::new();
        let mut buffer = [0u8; core::mem::size_of::<SyncCommand>()];
        while !readiness.all_ready() {
            hl::recv_without_notification(&mut buffer, |op: u16, msg: hl::Message<'_>| {
                let magic = num_traits::FromPrimitive::from_u16(op);
                if magic != Some(Magic::TaskStateCmd) {
                    return Err(1u32);
                }
                let (cmd, caller) = msg.fixed::<SyncCommand, SyncCommand>().ok_or(1u32)?;
                if cmd.state != SyncState::Ready as u8 {
                    return Err(1u32);
                }
                let sender = caller.task_id();
                if sender == self.peers.smart {
                    readiness.mark_smart_ready();
                } else if sender == self.peers.usb {
                    readiness.mark_usb_ready();
                } else if sender == self.peers.flash {
                    readiness.mark_flash_ready();
                } else {
                    return Err(1u32);
                }
                caller.reply(SyncCommand::new(Magic::TaskStateResp, SyncState::Acknowledge));
                Ok(())
            });
        }
        ringbuf_entry_root!(Trace::AllPeersReady);
        Startup {
            peers: self.peers,
            engine: self.engine,
            in_desc: self.in_desc,
            out_desc: self.out_desc,
            shm: self.shm,
            session: self.session,
            _phase: PhantomData,
        }
    }
}

impl Startup<phase::PeersReady> {
    /// Phase 4: inject the session key with `dfusmart`, wire the DMA
    /// completion handlers, and wait for PIN/auth confirmation.
    pub fn inject_key(mut self) -> Result<Startup<phase::Keyed>, StartupError> {
        let inject = SyncCommand::new(Magic::CryptoInjectCmd, SyncState::Ready);
        let resp: SyncCommand = call(self.peers.smart, Magic::CryptoInjectCmd as u16, &inject)
            .map_err(|_| StartupError::KeyInjectionRejected)?;
        if resp.state != SyncState::Done as u8 {
            return Err(StartupError::KeyInjectionRejected);
        }

        self.engine.dma_init(self.in_desc, self.out_desc);
        ringbuf_entry_root!(Trace::KeyInjected);

        let auth = SyncCommand::new(Magic::AuthStatePassed, SyncState::Wait);
        let auth_resp: SyncCommand =
            call(self.peers.pin, Magic::AuthStatePassed as u16, &auth)
                .map_err(|_| StartupError::KeyInjectionRejected)?;
        if auth_resp.state != SyncState::Acknowledge as u8 {
            return Err(StartupError::KeyInjectionRejected);
        }
        ringbuf_entry_root!(Trace::AuthConfirmed);

        Ok(Startup {
            peers: self.peers,
            engine: self.engine,
            in_desc: self.in_desc,
            out_desc: self.out_desc,
            shm: self.shm,
            session: self.session,
            _phase: PhantomData,
        })
    }
}

impl Startup<phase::Keyed> {
    /// Phase 5 + 6: tell usb/flash runtime has started, then collect their
    /// shared-memory descriptors (each pair may arrive in either order).
    pub fn start_runtime(mut self) -> Result<Startup<phase::Runtime>, StartupError> {
        for target in [self.peers.usb, self.peers.flash] {
            let req = SyncCommand::new(Magic::TaskStateCmd, SyncState::Ready);
            let resp: SyncCommand = call(target, Magic::TaskStateCmd as u16, &req)
                .map_err(|_| StartupError::ShmExchangeIncomplete)?;
            if resp.state != SyncState::Ready as u8 {
                return Err(StartupError::ShmExchangeIncomplete);
            }
        }
        ringbuf_entry_root!(Trace::RuntimeSignaled);

        let mut buffer = [0u8; core::mem::size_of::<SyncCommandData>()];
        while !self.shm.is_complete() {
            hl::recv_without_notification(&mut buffer, |op: u16, msg: hl::Message<'_>| {
                use drv_dfu_proto::ShmInfo;
                let magic = num_traits::FromPrimitive::from_u16(op);
                if magic != Some(Magic::TaskStateResp) {
                    return Err(1u32);
                }
                let (info, caller) = msg.fixed::<ShmInfo, ()>().ok_or(1u32)?;
                let sender = caller.task_id();
                if sender == self.peers.usb {
                    self.shm.set_usb(*info);
                } else if sender == self.peers.flash {
                    self.shm.set_flash(*info);
                } else {
                    return Err(1u32);
                }
                caller.reply(());
                Ok(())
            });
        }
        ringbuf_entry_root!(Trace::ShmExchangeDone);

        Ok(Startup {
            peers: self.peers,
            engine: self.engine,
            in_desc: self.in_desc,
            out_desc: self.out_desc,
            shm: self.shm,
            session: self.session,
            _phase: PhantomData,
        })
    }
}

/// Blocking round-trip send with a typed response, mirroring `hl::send`
/// but over a raw `u16` op code (this task doesn't use the `Call` trait
/// since every message on this protocol shares one envelope shape keyed
/// by runtime `Magic`, not by distinct Rust types per operation).
pub fn call<M: zerocopy::AsBytes, R: zerocopy::FromBytes>(
    target: TaskId,
    op: u16,
    message: &M,
) -> Result<R, u32> {
    use core::mem::MaybeUninit;
    let mut response: MaybeUninit<R> = MaybeUninit::uninit();
    let rslice = unsafe {
        core::slice::from_raw_parts_mut(
            response.as_mut_ptr() as *mut u8,
            core::mem::size_of::<R>(),
        )
    };
    let (code, rlen) = sys_send(target, op, message.as_bytes(), rslice, &[]);
    if code == 0 && rlen == core::mem::size_of::<R>() {
        Ok(unsafe { response.assume_init() })
    } else if code != 0 {
        Err(code)
    } else {
        Err(1)
    }
}
