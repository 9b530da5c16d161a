//! The runtime dispatch loop: blocking receive-from-any, routed by
//! `magic`, with strict per-magic sender authorization.

use crate::errors::{DispatchError, Fault};
use crate::fault::request_reboot;
use crate::shm::ShmRegistry;
use crate::startup::{Peers, Startup};
use crate::Trace;
use dfu_session::Session;
use drv_dfu_aes_ctr::{AesCtrEngine, DmaDescriptor, DmaStatus};
use drv_dfu_proto::{Magic, ShmInfo, SyncCommand, SyncCommandData, SyncState};
use ringbuf::*;
use userlib::*;
use zerocopy::AsBytes;

/// Union of every fixed-size envelope this task ever parses out of a
/// message buffer. Sized to the largest variant (`SyncCommandData`).
const BUFFER_LEN: usize = core::mem::size_of::<SyncCommandData>();

pub fn run(startup: Startup<crate::startup::phase::Runtime>) -> ! {
    let Startup {
        peers,
        mut engine,
        in_desc,
        out_desc,
        shm,
        mut session,
        ..
    } = startup;

    let dma_status = DmaStatus::new();
    let mut buffer = [0u8; BUFFER_LEN];
    // `dfuusb`'s `DFU_HEADER_SEND` call is held open (never replied to)
    // until `dfusmart` answers with its own, independent
    // `DFU_HEADER_VALID`/`DFU_HEADER_INVALID` message -- see the
    // `DfuHeaderSend`/`DfuHeaderValid`/`DfuHeaderInvalid` arms below.
    let mut pending_header: Option<TaskId> = None;

    loop {
        let rm = sys_recv_open(&mut buffer, 0);
        if rm.sender == TaskId::KERNEL {
            // Stray notification outside the write path's own recv window;
            // nothing to do but keep looping.
            continue;
        }

        let result = handle_one(
            &peers,
            &mut engine,
            in_desc,
            out_desc,
            &dma_status,
            &shm,
            &mut session,
            &mut pending_header,
            rm.sender,
            rm.operation,
            &buffer[..rm.message_len],
        );

        if let Err(fault) = result {
            request_reboot(peers.smart, fault);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_one(
    peers: &Peers,
    engine: &mut AesCtrEngine,
    in_desc: DmaDescriptor,
    out_desc: DmaDescriptor,
    dma_status: &DmaStatus,
    shm: &ShmRegistry,
    session: &mut Session,
    pending_header: &mut Option<TaskId>,
    sender: TaskId,
    operation: u32,
    body: &[u8],
) -> Result<(), Fault> {
    let magic: Option<Magic> = num_traits::FromPrimitive::from_u32(operation);
    let magic = match magic {
        Some(m) => m,
        None => {
            reply_invalid(sender);
            return Ok(());
        }
    };

    ringbuf_entry_root!(Trace::Dispatch(magic));

    match magic {
        Magic::DataRdDmaReq => {
            require_sender(sender, peers.usb)?;
            let cmd = parse::<SyncCommand>(body)?;
            let ack: SyncCommand = crate::startup::call(peers.flash, Magic::DataRdDmaReq as u16, cmd)
                .map_err(|_| DispatchError::WriteFailed)?;
            reply(sender, &ack);
            Ok(())
        }
        Magic::DataWrDmaReq => {
            require_sender(sender, peers.usb)?;
            let cmd = parse::<SyncCommand>(body)?;
            let chunk_size = cmd.chunk_size();
            let (usb_shm, flash_shm) = shm_pair(shm)?;
            let ack = crate::write_path::run(
                peers, engine, in_desc, out_desc, dma_status, session, usb_shm, flash_shm,
                chunk_size,
            )
            .map_err(Fault::from)?;
            reply(sender, &ack);
            Ok(())
        }
        Magic::DfuHeaderSend => {
            require_sender(sender, peers.usb)?;
            *session = Session::new();
            let cmd = parse::<SyncCommand>(body)?;
            // Hold `sender`'s call open: it is answered later, when
            // `dfusmart` delivers its verdict as a second, independent
            // message rather than as this call's own reply.
            *pending_header = Some(sender);
            let forwarded: Result<SyncCommand, u32> =
                crate::startup::call(peers.smart, Magic::DfuHeaderSend as u16, cmd);
            if forwarded.is_err() {
                *pending_header = None;
                return Err(Fault::Dispatch(DispatchError::WriteFailed));
            }
            Ok(())
        }
        Magic::DfuHeaderValid => {
            require_sender(sender, peers.smart)?;
            let cmd = parse::<SyncCommand>(body)?;
            let usb_caller = pending_header
                .take()
                .ok_or(Fault::Dispatch(DispatchError::NoPendingHeader))?;
            let (usb_shm, flash_shm) = shm_pair(shm)?;
            let geometry = dfu_session::ChunkGeometry {
                usb_chunk_size: usb_shm.size,
                flash_chunk_size: flash_shm.size,
                crypto_chunk_size: cmd.chunk_size(),
            };
            session
                .accept_header(geometry, usb_shm.size, flash_shm.size)
                .map_err(DispatchError::from)?;
            reply(usb_caller, cmd);
            reply(sender, cmd);
            Ok(())
        }
        Magic::DfuHeaderInvalid => {
            require_sender(sender, peers.smart)?;
            let cmd = parse::<SyncCommand>(body)?;
            let usb_caller = pending_header
                .take()
                .ok_or(Fault::Dispatch(DispatchError::NoPendingHeader))?;
            reply(usb_caller, cmd);
            reply(sender, cmd);
            Ok(())
        }
        Magic::DfuDwnloadFinished => {
            require_sender(sender, peers.usb)?;
            let cmd = parse::<SyncCommand>(body)?;
            let ack: SyncCommand =
                crate::startup::call(peers.flash, Magic::DfuDwnloadFinished as u16, cmd)
                    .map_err(|_| DispatchError::WriteFailed)?;
            reply(sender, &ack);
            Ok(())
        }
        Magic::DfuWriteFinished => {
            require_sender(sender, peers.flash)?;
            let cmd = parse::<SyncCommand>(body)?;
            let ack: SyncCommand =
                crate::startup::call(peers.smart, Magic::DfuWriteFinished as u16, cmd)
                    .map_err(|_| DispatchError::WriteFailed)?;
            reply(sender, &ack);
            Ok(())
        }
        Magic::RebootRequest => {
            // Any sender may request a reboot; this is itself the fatal
            // path, so route it straight through `Fault` rather than
            // replying at all.
            Err(Fault::Dispatch(DispatchError::WriteFailed))
        }
        Magic::TaskStateCmd
        | Magic::TaskStateResp
        | Magic::CryptoInjectCmd
        | Magic::CryptoInjectResp
        | Magic::AuthStatePassed
        | Magic::DataWrDmaAck
        | Magic::Invalid => {
            reply_invalid(sender);
            Ok(())
        }
    }
}

fn require_sender(actual: TaskId, expected: TaskId) -> Result<(), Fault> {
    if actual == expected {
        Ok(())
    } else {
        Err(Fault::Dispatch(DispatchError::Unauthorized))
    }
}

fn shm_pair(shm: &ShmRegistry) -> Result<(ShmInfo, ShmInfo), Fault> {
    match (shm.usb(), shm.flash()) {
        (Some(usb), Some(flash)) => Ok((usb, flash)),
        _ => Err(Fault::Dispatch(DispatchError::NoActiveHeader)),
    }
}

fn parse<M: zerocopy::FromBytes>(body: &[u8]) -> Result<&M, Fault> {
    if body.len() != core::mem::size_of::<M>() {
        return Err(Fault::Dispatch(DispatchError::BadMessageSize));
    }
    zerocopy::LayoutVerified::<_, M>::new(body)
        .map(|lv| lv.into_ref())
        .ok_or(Fault::Dispatch(DispatchError::BadMessageSize))
}

fn reply<R: zerocopy::AsBytes>(sender: TaskId, message: &R) {
    sys_reply(sender, 0, message.as_bytes());
}

fn reply_invalid(sender: TaskId) {
    let invalid = SyncCommand::new(Magic::Invalid, SyncState::Wait);
    sys_reply(sender, 0, invalid.as_bytes());
}
