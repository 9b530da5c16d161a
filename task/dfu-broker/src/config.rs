//! Compile-time constants. Grouped here the way `drv-stm32h7-update-server`
//! groups its flash key/timing constants near the top of its module, rather
//! than scattering magic numbers through the logic.

/// How long the write path waits for a single DMA attempt (success or
/// error notification) before declaring it hung and retrying anyway, in
/// kernel timer ticks.
pub const DMA_WATCHDOG_TICKS: u64 = 500;

/// AES block size in bytes; re-exported from the crypto driver so callers
/// in this crate don't need a second dependency edge just for a constant.
pub const BLOCK_LEN: usize = drv_dfu_aes_ctr::BLOCK_LEN;

/// Notification bit set when the input DMA channel completes normally.
pub const DMA_IN_DONE_MASK: u32 = 1 << 0;
/// Notification bit set when the input DMA channel faults.
pub const DMA_IN_ERR_MASK: u32 = 1 << 1;
/// Notification bit set when the output DMA channel completes normally.
pub const DMA_OUT_DONE_MASK: u32 = 1 << 2;
/// Notification bit set when the output DMA channel faults.
pub const DMA_OUT_ERR_MASK: u32 = 1 << 3;
/// Combined mask covering every DMA completion notification.
pub const DMA_IRQ_MASK: u32 =
    DMA_IN_DONE_MASK | DMA_IN_ERR_MASK | DMA_OUT_DONE_MASK | DMA_OUT_ERR_MASK;
/// Notification bit reserved for the write-path watchdog timer.
pub const TIMER_MASK: u32 = 1 << 4;
