//! Session-wide counters and the invariants that gate every write (spec
//! §3). One `Session` lives for the lifetime of a single DFU download; the
//! broker resets it only by restarting the task.

use crate::padding::aligned_length;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionError {
    /// Invariant 1: `usb_chunk_size` and `flash_chunk_size` must agree.
    TransportChunkMismatch,
    /// Invariant 1: `crypto_chunk_size` must be a multiple of the transport
    /// chunk size, and at least as large.
    CryptoChunkNotAMultiple,
    /// A chunk size of zero is never valid.
    ZeroChunkSize,
    /// Invariant 3: the (padded) chunk must fit the USB shared-memory
    /// region.
    ExceedsUsbShm,
    /// Invariant 3: the (padded) chunk must fit the flash shared-memory
    /// region.
    ExceedsFlashShm,
}

/// Header fields negotiated once at the start of a download, via
/// `DFU_HEADER_SEND`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkGeometry {
    pub usb_chunk_size: u16,
    pub flash_chunk_size: u16,
    pub crypto_chunk_size: u16,
}

impl ChunkGeometry {
    /// Validates invariant 1. Does not know about shared-memory sizes; call
    /// [`Session::accept_header`] for the full check including invariant 3.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.usb_chunk_size == 0 || self.flash_chunk_size == 0 || self.crypto_chunk_size == 0 {
            return Err(SessionError::ZeroChunkSize);
        }
        if self.usb_chunk_size != self.flash_chunk_size {
            return Err(SessionError::TransportChunkMismatch);
        }
        if self.crypto_chunk_size < self.usb_chunk_size
            || self.crypto_chunk_size % self.usb_chunk_size != 0
        {
            return Err(SessionError::CryptoChunkNotAMultiple);
        }
        Ok(())
    }
}

/// Running state of one DFU download.
#[derive(Copy, Clone, Debug, Default)]
pub struct Session {
    geometry: Option<ChunkGeometry>,
    total_bytes_read: u32,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            geometry: None,
            total_bytes_read: 0,
        }
    }

    /// Handles `DFU_HEADER_SEND`: validates invariant 1 and invariant 3
    /// (the padded crypto chunk must fit both shared-memory regions), and
    /// if both hold, latches the geometry for the rest of the session.
    pub fn accept_header(
        &mut self,
        geometry: ChunkGeometry,
        usb_shm_size: u16,
        flash_shm_size: u16,
    ) -> Result<(), SessionError> {
        geometry.validate()?;
        let aligned = aligned_length(geometry.crypto_chunk_size);
        if aligned > usb_shm_size {
            return Err(SessionError::ExceedsUsbShm);
        }
        if aligned > flash_shm_size {
            return Err(SessionError::ExceedsFlashShm);
        }
        self.geometry = Some(geometry);
        self.total_bytes_read = 0;
        Ok(())
    }

    pub fn geometry(&self) -> Option<ChunkGeometry> {
        self.geometry
    }

    pub fn total_bytes_read(&self) -> u32 {
        self.total_bytes_read
    }

    /// Invariant 4: the key is reinjected immediately before the write that
    /// *starts* a new crypto-chunk boundary -- i.e. before any write when
    /// `total_bytes_read` is a nonzero multiple of `crypto_chunk_size`.
    /// The very first write of a session (`total_bytes_read == 0`) never
    /// reinjects: the key was already injected once during startup Phase 4.
    pub fn needs_reinjection(&self) -> bool {
        match self.geometry {
            Some(g) => {
                self.total_bytes_read > 0 && self.total_bytes_read % g.crypto_chunk_size as u32 == 0
            }
            None => false,
        }
    }

    /// Records a completed write of `chunk_size` plaintext bytes (spec
    /// §4.4 step 8). `chunk_size` is the unpadded transport chunk size,
    /// not the DMA-aligned length.
    pub fn record_write(&mut self, chunk_size: u16) {
        self.total_bytes_read += u32::from(chunk_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(usb: u16, flash: u16, crypto: u16) -> ChunkGeometry {
        ChunkGeometry {
            usb_chunk_size: usb,
            flash_chunk_size: flash,
            crypto_chunk_size: crypto,
        }
    }

    #[test]
    fn zero_chunk_size_fails_fast() {
        assert_eq!(
            geometry(0, 512, 4096).validate(),
            Err(SessionError::ZeroChunkSize)
        );
    }

    #[test]
    fn mismatched_transport_sizes_are_rejected() {
        assert_eq!(
            geometry(512, 256, 4096).validate(),
            Err(SessionError::TransportChunkMismatch)
        );
    }

    #[test]
    fn crypto_chunk_must_be_a_multiple_of_transport_chunk() {
        assert_eq!(
            geometry(512, 512, 700).validate(),
            Err(SessionError::CryptoChunkNotAMultiple)
        );
        assert_eq!(
            geometry(512, 512, 256).validate(),
            Err(SessionError::CryptoChunkNotAMultiple)
        );
    }

    #[test]
    fn well_formed_geometry_validates() {
        assert_eq!(geometry(512, 512, 4096).validate(), Ok(()));
    }

    #[test]
    fn header_rejected_when_it_overflows_shared_memory() {
        let mut session = Session::new();
        let g = geometry(512, 512, 4096);
        assert_eq!(
            session.accept_header(g, 2048, 4096),
            Err(SessionError::ExceedsUsbShm)
        );
        assert_eq!(
            session.accept_header(g, 4096, 2048),
            Err(SessionError::ExceedsFlashShm)
        );
    }

    #[test]
    fn first_write_of_a_session_never_reinjects() {
        let mut session = Session::new();
        session
            .accept_header(geometry(512, 512, 4096), 4096, 4096)
            .unwrap();
        assert!(!session.needs_reinjection());
    }

    #[test]
    fn reinjection_triggers_on_the_write_that_starts_the_next_crypto_chunk() {
        let mut session = Session::new();
        session
            .accept_header(geometry(512, 512, 1024), 1024, 1024)
            .unwrap();

        // Two 512-byte transport writes exactly fill one crypto chunk.
        assert!(!session.needs_reinjection());
        session.record_write(512);
        assert!(!session.needs_reinjection());
        session.record_write(512);
        // total_bytes_read == 1024 == crypto_chunk_size: the *next* write
        // must reinject, not this one that just completed.
        assert!(session.needs_reinjection());
    }

    #[test]
    fn eight_clean_512_byte_writes_reinject_every_other_chunk() {
        let mut session = Session::new();
        session
            .accept_header(geometry(512, 512, 1024), 1024, 1024)
            .unwrap();
        let mut reinjections = 0;
        for _ in 0..8 {
            if session.needs_reinjection() {
                reinjections += 1;
            }
            session.record_write(512);
        }
        assert_eq!(reinjections, 3);
        assert_eq!(session.total_bytes_read(), 4096);
    }

    #[test]
    fn unaligned_tail_chunk_still_advances_the_byte_counter_exactly() {
        let mut session = Session::new();
        session
            .accept_header(geometry(300, 300, 300), 512, 512)
            .unwrap();
        session.record_write(300);
        assert_eq!(session.total_bytes_read(), 300);
        assert!(session.needs_reinjection());
    }
}
