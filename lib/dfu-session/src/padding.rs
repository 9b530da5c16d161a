//! Chunk-length arithmetic for the AES-CTR write path: the hardware only
//! moves whole 16-byte blocks, so every chunk coming off the wire is
//! padded up before it's handed to DMA.

const BLOCK_LEN: u16 = 16;

/// Rounds `len` up to the next multiple of [`BLOCK_LEN`]. `0` stays `0`.
///
/// # Panics
/// Panics on overflow if `len` is within `BLOCK_LEN - 1` of `u16::MAX`; no
/// chunk size in this protocol ever approaches that, since chunk sizes are
/// themselves bounded by the shared-memory region sizes exchanged at
/// startup (at most a few kilobytes).
pub fn aligned_length(len: u16) -> u16 {
    let remainder = len % BLOCK_LEN;
    if remainder == 0 {
        len
    } else {
        len + (BLOCK_LEN - remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stays_zero() {
        assert_eq!(aligned_length(0), 0);
    }

    #[test]
    fn exact_multiple_is_unchanged() {
        assert_eq!(aligned_length(512), 512);
        assert_eq!(aligned_length(16), 16);
    }

    #[test]
    fn unaligned_tail_rounds_up() {
        assert_eq!(aligned_length(300), 304);
        assert_eq!(aligned_length(1), 16);
        assert_eq!(aligned_length(17), 32);
    }

    #[test]
    fn padding_never_shrinks_and_never_overshoots_by_a_block() {
        for len in 0..=2048u16 {
            let aligned = aligned_length(len);
            assert!(aligned >= len);
            assert!(aligned - len < BLOCK_LEN);
            assert_eq!(aligned % BLOCK_LEN, 0);
        }
    }
}
