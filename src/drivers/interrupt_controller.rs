// This is a driver for the interrupt controller included in BMC2837. Lines are
// addressed by their dispatch table index (see Irq::index()): 0-63 are the GPU
// lines, 64-71 the ARM basic lines.

use crate::drivers::{MMIORegisters, PERIPHERALS_BASE};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

// SAFETY: There should an interrupt controller behind that address as per BMC2837
const REGS: MMIORegisters<ICRegisters> =
    unsafe { MMIORegisters::<ICRegisters>::new(PERIPHERALS_BASE + 0xB000 + 0x200) };

const ARM_LINE_BASE: usize = 64;

register_structs! {
    #[allow(non_snake_case)]
    ICRegisters {
        (0x00 => IRQ_BASIC_PENDING: ReadOnly<u32>),
        (0x04 => IRQ_PENDING1: ReadOnly<u32>),
        (0x08 => IRQ_PENDING2: ReadOnly<u32>),
        (0x0c => FIQ_CONTROL: ReadWrite<u32>),
        (0x10 => ENABLE_IRQ1: ReadWrite<u32>),
        (0x14 => ENABLE_IRQ2: ReadWrite<u32>),
        (0x18 => ENABLE_IRQ_BASIC: ReadWrite<u32>),
        (0x1c => DISABLE_IRQ1: ReadWrite<u32>),
        (0x20 => DISABLE_IRQ2: ReadWrite<u32>),
        (0x24 => DISABLE_BASIC_IRQ: ReadWrite<u32>),
        (0x28 => @END),
    }
}

pub fn enable_line(line: usize) {
    match line {
        0..=31 => REGS.ENABLE_IRQ1.set(1 << line),
        32..=63 => REGS.ENABLE_IRQ2.set(1 << (line - 32)),
        _ => REGS.ENABLE_IRQ_BASIC.set(1 << (line - ARM_LINE_BASE)),
    }
}

pub fn disable_line(line: usize) {
    match line {
        0..=31 => REGS.DISABLE_IRQ1.set(1 << line),
        32..=63 => REGS.DISABLE_IRQ2.set(1 << (line - 32)),
        _ => REGS.DISABLE_BASIC_IRQ.set(1 << (line - ARM_LINE_BASE)),
    }
}

// The enable registers read back the current enable state
pub fn is_enabled(line: usize) -> bool {
    let (reg, bit) = match line {
        0..=31 => (REGS.ENABLE_IRQ1.get(), line),
        32..=63 => (REGS.ENABLE_IRQ2.get(), line - 32),
        _ => (REGS.ENABLE_IRQ_BASIC.get(), line - ARM_LINE_BASE),
    };
    reg & (1 << bit) != 0
}

/// Snapshot of every pending line, lowest index first.
pub fn pending() -> impl Iterator<Item = usize> {
    let gpu = (REGS.IRQ_PENDING2.get() as u64) << 32 | REGS.IRQ_PENDING1.get() as u64;
    // Only the bottom 8 bits of the basic register are ARM lines, the rest
    // are shortcuts into the GPU pending registers
    let arm = (REGS.IRQ_BASIC_PENDING.get() & 0xff) as u64;

    let gpu_lines = (0..64).filter(move |bit| gpu & (1 << bit) != 0);
    let arm_lines = (0..8)
        .filter(move |bit| arm & (1 << bit) != 0)
        .map(|bit| bit + ARM_LINE_BASE);
    gpu_lines.chain(arm_lines)
}
