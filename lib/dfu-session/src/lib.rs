// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pure, hardware-free state machines for the DFU crypto broker: the
//! session counters and invariants, the key-reinjection decision,
//! transport-chunk padding, and the DMA retry loop's attempt counting.
//! Kept free of IPC and registers so it can be exercised with ordinary
//! host unit tests; `task-dfu-broker` is the only consumer.

#![cfg_attr(not(test), no_std)]

mod padding;
mod readiness;
mod retry;
mod session;

pub use padding::aligned_length;
pub use readiness::Readiness;
pub use retry::{DmaRetry, RetryOutcome, MAX_DMA_RETRIES};
pub use session::{ChunkGeometry, Session, SessionError};
