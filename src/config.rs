//! Board parameters the drivers derive their limits from.

#[derive(Clone, Copy, Debug)]
pub struct BoardConfig {
    /// VPU core clock, feeds the mini UART
    pub core_clock_hz: u32,
    /// CM_PWMCTL.SRC value
    pub pwm_clock_src: u32,
    /// Rate of that source
    pub pwm_source_hz: u32,
    /// PWM range register: clock ticks per output sample
    pub pwm_range: u32,
    /// Highest sample rate the DAC accepts
    pub dac_max_freq: u32,
    /// DMA channel statically assigned to the PWM DAC
    pub dac_dma_channel: usize,
    pub uart_baud: u32,
}

impl BoardConfig {
    /// Rate at which the PWM block consumes samples for a divisor of 1
    pub const fn pwm_sample_clock_hz(&self) -> u32 {
        self.pwm_source_hz / self.pwm_range
    }
}

#[cfg(not(feature = "qemu"))]
pub const BOARD: BoardConfig = BoardConfig {
    core_clock_hz: 250_000_000,
    // PLLD
    pwm_clock_src: 6,
    pwm_source_hz: 500_000_000,
    pwm_range: 256,
    dac_max_freq: 96_000,
    dac_dma_channel: 5,
    uart_baud: 115_200,
};

// QEMU's raspi3b model doesn't emulate PLLD, run PWM off the oscillator
#[cfg(feature = "qemu")]
pub const BOARD: BoardConfig = BoardConfig {
    core_clock_hz: 250_000_000,
    // Oscillator
    pwm_clock_src: 1,
    pwm_source_hz: 19_200_000,
    pwm_range: 256,
    dac_max_freq: 48_000,
    dac_dma_channel: 5,
    uart_baud: 115_200,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dac_limit_is_reachable() {
        // A divisor of 1 must be able to produce the maximum sample rate
        assert!(BOARD.pwm_sample_clock_hz() >= BOARD.dac_max_freq);
    }
}
