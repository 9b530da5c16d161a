//! Runtime-fatal escalation. A `Fault` is never recovered from: this
//! task's only response is to ask `dfusmart` to reboot the
//! system, then park itself forever. `dfusmart` is authoritative over the
//! actual reboot decision and may refuse, in which case this task simply
//! stays parked.

use crate::errors::Fault;
use crate::Trace;
use drv_dfu_proto::{Magic, SyncCommand, SyncState};
use ringbuf::*;
use userlib::*;
use zerocopy::AsBytes;

/// Number of best-effort attempts to deliver `REBOOT_REQUEST` before
/// giving up and parking anyway. There is nowhere further to escalate to.
const MAX_REBOOT_ATTEMPTS: u32 = 3;

/// Sends `REBOOT_REQUEST` to `dfusmart`, then parks this task forever.
/// Never returns.
pub fn request_reboot(smart: TaskId, fault: Fault) -> ! {
    ringbuf_entry_root!(Trace::Fault(fault));

    let req = SyncCommand::new(Magic::RebootRequest, SyncState::Wait);
    for _ in 0..MAX_REBOOT_ATTEMPTS {
        let mut response = [0u8; core::mem::size_of::<SyncCommand>()];
        let (code, _) = sys_send(smart, Magic::RebootRequest as u16, req.as_bytes(), &mut response, &[]);
        if code == 0 {
            break;
        }
    }

    halt_and_yield()
}

/// Parks this task forever by repeatedly yielding to the kernel. Used both
/// after a reboot request has been sent and for unrecoverable startup
/// failures, which yield without ever requesting a reboot.
pub fn halt_and_yield() -> ! {
    ringbuf_entry_root!(Trace::Halted);
    loop {
        let _ = sys_recv_closed(&mut [], 0, TaskId::KERNEL);
    }
}
