//! Error types funneled through the task. Startup errors are fatal (the
//! task can't usefully run without a peer set and a keyed engine, so it
//! panics and lets the supervisor restart it, same as a failed
//! `task_slot!` resolution would); dispatch and write-path errors become
//! IPC response codes, never panics -- a malformed or out-of-sequence
//! request from a peer must not be able to take the broker down.

use dfu_session::SessionError;

/// Failures during the six-phase startup sequence. These are never
/// recovered from; `main` unwraps them, which panics the task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StartupError {
    PeerResolutionFailed,
    KeyInjectionRejected,
    ShmExchangeIncomplete,
}

/// Response codes returned to a peer over IPC when a request is rejected.
/// Every variant maps to a nonzero `u32`; `0` is reserved for success by
/// convention (see `userlib::hl::Caller::reply_fail`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum DispatchError {
    /// The message body was the wrong size for its magic.
    BadMessageSize = 1,
    /// This magic is not authorized from this sender in the task's current
    /// state.
    Unauthorized = 2,
    /// The header failed one of session invariants 1 or 3.
    InvalidHeader = 3,
    /// A write was requested with no header negotiated yet.
    NoActiveHeader = 4,
    /// `DFU_HEADER_VALID`/`DFU_HEADER_INVALID` arrived from `dfusmart` with
    /// no `DFU_HEADER_SEND` call from `dfuusb` pending to answer.
    NoPendingHeader = 5,
    /// The DMA write path exhausted its retry budget.
    WriteFailed = 6,
}

impl From<DispatchError> for u32 {
    fn from(e: DispatchError) -> u32 {
        e as u32
    }
}

impl From<SessionError> for DispatchError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::ZeroChunkSize
            | SessionError::TransportChunkMismatch
            | SessionError::CryptoChunkNotAMultiple
            | SessionError::ExceedsUsbShm
            | SessionError::ExceedsFlashShm => DispatchError::InvalidHeader,
        }
    }
}

/// Failures specific to the DMA write path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WritePathError {
    /// The padded chunk doesn't fit the advertised shared-memory regions.
    ChunkTooLarge,
    /// `MAX_DMA_RETRIES` consecutive attempts all faulted or timed out.
    RetriesExhausted,
    /// `dfusmart` or `dfuflash` failed to ack a synchronous round-trip.
    PeerIpcFailed,
}

/// Every runtime-fatal condition this task can hit once it has left
/// startup, funneled to one type so `dispatch::run` has a single thing to
/// hand to `fault::request_reboot`: a reboot request to `dfusmart`
/// followed by parking forever.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fault {
    /// A header, write, or peer round-trip failed in a way treated as
    /// fatal rather than recoverable -- this includes a known magic
    /// arriving from a sender not authorized to send it, in any task
    /// state: fail-fast applies uniformly across magics via
    /// `DispatchError::Unauthorized`.
    Dispatch(DispatchError),
    WritePath(WritePathError),
}

impl From<DispatchError> for Fault {
    fn from(e: DispatchError) -> Self {
        Fault::Dispatch(e)
    }
}

impl From<WritePathError> for Fault {
    fn from(e: WritePathError) -> Self {
        Fault::WritePath(e)
    }
}
