pub mod dma;
pub mod gpio;
pub mod interrupt_controller;
pub mod pwm_dac;
pub mod uart_mini;

use crate::address::PERIPHERALS_PHYS;
use core::{marker::PhantomData, ops};

// Peripherals base address for BMC2837 / RPI3, as mapped in the kernel's
// high memory
pub(crate) const PERIPHERALS_BASE: usize = PERIPHERALS_PHYS.as_virtual().as_u64() as usize;

pub struct MMIORegisters<T> {
    base: usize,
    phantom: PhantomData<fn() -> T>,
}

impl<T> MMIORegisters<T> {
    // SAFETY: This is safe as long as there is a MMIO peripheral (or, in
    // tests, a block of memory laid out like one) behind the address
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            base,
            phantom: PhantomData,
        }
    }
}

impl<T> ops::Deref for MMIORegisters<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: See MMIORegisters::new()'s safety section
        unsafe { &*(self.base as *const _) }
    }
}
