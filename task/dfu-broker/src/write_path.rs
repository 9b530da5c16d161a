//! The DMA-driven AES-CTR write path: the crypto core of the task.
//! Invoked once per `DATA_WR_DMA_REQ` from `dfuusb`.

use crate::config::{BLOCK_LEN, DMA_IRQ_MASK, DMA_OUT_DONE_MASK, DMA_OUT_ERR_MASK, TIMER_MASK};
use crate::errors::WritePathError;
use crate::startup::{call, Peers};
use crate::Trace;
use dfu_session::{aligned_length, DmaRetry, RetryOutcome, Session};
use drv_dfu_aes_ctr::{AesCtrEngine, CipherMode, DmaDescriptor, DmaStatus, Direction, KeyVariant};
use drv_dfu_proto::{Magic, ShmInfo, SyncCommand, SyncState};
use ringbuf::*;
use userlib::*;

const ZERO_IV: [u8; 16] = [0; 16];

/// Runs steps 1-10 of the write path for one `chunk_size`-byte request. On
/// success, `session` has already been advanced by `chunk_size` and the
/// returned envelope is the `DATA_WR_DMA_ACK` the caller must reply to usb
/// with.
#[allow(clippy::too_many_arguments)]
pub fn run(
    peers: &Peers,
    engine: &mut AesCtrEngine,
    in_desc: DmaDescriptor,
    out_desc: DmaDescriptor,
    dma_status: &DmaStatus,
    session: &mut Session,
    usb_shm: ShmInfo,
    flash_shm: ShmInfo,
    chunk_size: u16,
) -> Result<SyncCommand, WritePathError> {
    let first_chunk = session.total_bytes_read() == 0;

    // Step 1: reinjection boundary.
    if session.needs_reinjection() {
        ringbuf_entry_root!(Trace::Reinjecting);
        let inject = SyncCommand::new(Magic::CryptoInjectCmd, SyncState::Ready);
        let resp: SyncCommand = call(peers.smart, Magic::CryptoInjectCmd as u16, &inject)
            .map_err(|_| WritePathError::PeerIpcFailed)?;
        if resp.state != SyncState::Done as u8 {
            return Err(WritePathError::PeerIpcFailed);
        }
    }

    // Step 2: (re)configure the engine for the first chunk of the session
    // or immediately after a reinjection.
    if first_chunk || session.needs_reinjection() {
        engine.configure(KeyVariant::Aes128, &ZERO_IV, CipherMode::Ctr, Direction::Decrypt);
    }

    // Step 3: pad up to a whole number of AES blocks.
    let aligned = aligned_length(chunk_size);

    // Step 4: bounds check against both shared-memory regions (see
    // DESIGN.md for why both, not just USB, are checked here).
    if chunk_size == 0 || aligned > usb_shm.size || aligned > flash_shm.size {
        return Err(WritePathError::ChunkTooLarge);
    }
    debug_assert_eq!(aligned as usize % BLOCK_LEN, 0);

    // Step 5: snapshot the IV so a retry can restore CTR continuity.
    let iv_snapshot = engine.read_iv();

    // Step 6: transfer with bounded retry.
    let mut retry = DmaRetry::new();
    loop {
        dma_status.clear();
        engine.start_dma(usb_shm.address, flash_shm.address, aligned, in_desc, out_desc);
        match wait_for_completion(dma_status) {
            Ok(()) => break,
            Err(()) => {
                ringbuf_entry_root!(Trace::DmaRetry(retry.attempts()));
                engine.flush_fifos();
                match retry.record_failure() {
                    RetryOutcome::Retry => {
                        // 6a: restore the pre-transfer IV before retrying.
                        engine.configure(KeyVariant::Aes128, &iv_snapshot, CipherMode::Ctr, Direction::Decrypt);
                    }
                    RetryOutcome::Exhausted => {
                        return Err(WritePathError::RetriesExhausted);
                    }
                }
            }
        }
    }

    // Step 7: drain.
    engine.flush_fifos();
    engine.wait_fifos_empty();

    // Step 8: push to flash and await its ack.
    let push = SyncCommand::with_chunk_size(Magic::DataWrDmaReq, SyncState::Ready, chunk_size);
    let _ack: SyncCommand = call(peers.flash, Magic::DataWrDmaReq as u16, &push)
        .map_err(|_| WritePathError::PeerIpcFailed)?;

    // Step 10: advance the non-aligned byte counter.
    session.record_write(chunk_size);

    // Step 9 (ack to usb) is the reply to usb's still-pending DATA_WR_DMA_REQ
    // call; the caller (dispatch) owns that `Caller`/sender handle and sends
    // this value back via `sys_reply`, since we can't satisfy usb's pending
    // send with a fresh outbound send of our own.
    Ok(SyncCommand::with_chunk_size(Magic::DataWrDmaAck, SyncState::Done, chunk_size))
}

/// Busy-waits (via blocking notification receive) for the output DMA
/// channel to finish, bounded by the watchdog timeout.
/// Returns `Err(())` on either a hardware fault or a watchdog timeout;
/// either way the caller retries from the top of step 6.
fn wait_for_completion(status: &DmaStatus) -> Result<(), ()> {
    let start = sys_get_timer().now;
    sys_set_timer(
        Some(start + crate::config::DMA_WATCHDOG_TICKS),
        DMA_IRQ_MASK | TIMER_MASK,
    );
    loop {
        let rm = sys_recv_closed(&mut [], DMA_IRQ_MASK | TIMER_MASK, TaskId::KERNEL);
        let Ok(rm) = rm else {
            return Err(());
        };
        let bits = rm.operation;
        if bits & DMA_OUT_DONE_MASK != 0 {
            use drv_dfu_aes_ctr::{dma_out_completion_handler, RawChannelStatus};
            dma_out_completion_handler(
                status,
                RawChannelStatus {
                    done: true,
                    ..Default::default()
                },
            );
        }
        if bits & DMA_OUT_ERR_MASK != 0 {
            use drv_dfu_aes_ctr::{dma_out_completion_handler, RawChannelStatus};
            dma_out_completion_handler(
                status,
                RawChannelStatus {
                    fifo_err: true,
                    ..Default::default()
                },
            );
        }

        if status.out_error() {
            sys_set_timer(None, 0);
            return Err(());
        }
        if status.out_done() {
            sys_set_timer(None, 0);
            return Ok(());
        }
        let now = sys_get_timer().now;
        if now.saturating_sub(start) > crate::config::DMA_WATCHDOG_TICKS {
            sys_set_timer(None, 0);
            return Err(());
        }
    }
}
