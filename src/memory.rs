#[cfg(target_arch = "aarch64")]
use aarch64_cpu::asm::barrier;

// Cortex-A53 data cache line size
const CACHE_LINE_SIZE: usize = 64;

/// Cleans the data cache lines covering `[addr, addr + size)` to the Point of
/// Coherency so that a bus master (DMA, VideoCore) sees what the CPU wrote.
pub fn dcache_clean_va_range(addr: usize, size: usize) {
    for line in cache_lines(addr, size) {
        clean_line(line);
    }
    dma_write_barrier();
}

/// Orders the descriptor writes above before the MMIO write that starts the
/// bus master.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn dma_write_barrier() {
    barrier::dsb(barrier::SY);
    barrier::dmb(barrier::SY);
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn dma_write_barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn clean_line(addr: usize) {
    // SAFETY: DC CVAC only performs cache maintenance on the given VA
    unsafe {
        core::arch::asm!("dc cvac, {0}", in(reg) addr);
    }
}

// Host builds (unit tests) have coherent memory
#[cfg(not(target_arch = "aarch64"))]
#[inline]
fn clean_line(_addr: usize) {}

fn cache_lines(addr: usize, size: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(CACHE_LINE_SIZE - 1);
    let end = addr + size;
    (start..end).step_by(CACHE_LINE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_lines_cover_unaligned_range() {
        let lines: heapless::Vec<usize, 4> = cache_lines(0x1030, 0x60).collect();
        assert_eq!(lines.as_slice(), &[0x1000, 0x1040, 0x1080]);
    }
}
