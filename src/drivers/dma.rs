// Driver for the BCM2837 DMA controller, see BCM2835-ARM-Peripherals.pdf
// chapter 4. Channels 0-14 share one register block, channel 15 lives
// elsewhere and isn't supported.
//
// A transfer is described by a control block in memory that the controller
// fetches through its bus address. Every channel gets one statically
// allocated control block, so a channel runs one page at a time and the
// client re-arms it from the completion interrupt.

use crate::address::AddressVirtual;
use crate::drivers::MMIORegisters;
use crate::error::{Error, Result};
use crate::locking::SpinLock;
use crate::memory::{dcache_clean_va_range, dma_write_barrier};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{InMemoryRegister, ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

pub const NUM_CHANNELS: usize = 15;

// TXFR_LEN is 16 bits wide on the lite channels (7-14), use that limit for all
pub const DMA_MAX_TRANSFER_SIZE: usize = 0xFFFF;

register_bitfields! {
    u32,

    CS [
        ACTIVE                      OFFSET(0)  NUMBITS(1) [],
        END                         OFFSET(1)  NUMBITS(1) [],
        INT                         OFFSET(2)  NUMBITS(1) [],
        DREQ                        OFFSET(3)  NUMBITS(1) [],
        PAUSED                      OFFSET(4)  NUMBITS(1) [],
        ERROR                       OFFSET(8)  NUMBITS(1) [],
        PRIORITY                    OFFSET(16) NUMBITS(4) [],
        PANIC_PRIORITY              OFFSET(20) NUMBITS(4) [],
        WAIT_FOR_OUTSTANDING_WRITES OFFSET(28) NUMBITS(1) [],
        DISDEBUG                    OFFSET(29) NUMBITS(1) [],
        ABORT                       OFFSET(30) NUMBITS(1) [],
        RESET                       OFFSET(31) NUMBITS(1) [],
    ],

    TI [
        INTEN          OFFSET(0)  NUMBITS(1) [],
        TDMODE         OFFSET(1)  NUMBITS(1) [],
        WAIT_RESP      OFFSET(3)  NUMBITS(1) [],
        DEST_INC       OFFSET(4)  NUMBITS(1) [],
        DEST_WIDTH     OFFSET(5)  NUMBITS(1) [],
        DEST_DREQ      OFFSET(6)  NUMBITS(1) [],
        DEST_IGNORE    OFFSET(7)  NUMBITS(1) [],
        SRC_INC        OFFSET(8)  NUMBITS(1) [],
        SRC_WIDTH      OFFSET(9)  NUMBITS(1) [],
        SRC_DREQ       OFFSET(10) NUMBITS(1) [],
        SRC_IGNORE     OFFSET(11) NUMBITS(1) [],
        BURST_LENGTH   OFFSET(12) NUMBITS(4) [],
        PERMAP         OFFSET(16) NUMBITS(5) [],
        WAITS          OFFSET(21) NUMBITS(5) [],
        NO_WIDE_BURSTS OFFSET(26) NUMBITS(1) [],
    ],
}

register_structs! {
    #[allow(non_snake_case)]
    ChannelRegisters {
        (0x00 => CS: ReadWrite<u32, CS::Register>),
        (0x04 => CONBLK_AD: ReadWrite<u32>),
        (0x08 => TI: ReadOnly<u32, TI::Register>),
        (0x0c => SOURCE_AD: ReadOnly<u32>),
        (0x10 => DEST_AD: ReadOnly<u32>),
        (0x14 => TXFR_LEN: ReadOnly<u32>),
        (0x18 => STRIDE: ReadOnly<u32>),
        (0x1c => NEXTCONBK: ReadOnly<u32>),
        (0x20 => DEBUG: ReadWrite<u32>),
        (0x24 => _reserved0),
        (0x100 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    DmaRegisters {
        (0x000 => CHANNELS: [ChannelRegisters; NUM_CHANNELS]),
        (0xf00 => _reserved0),
        (0xfe0 => INT_STATUS: ReadOnly<u32>),
        (0xfe4 => _reserved1),
        (0xff0 => ENABLE: ReadWrite<u32>),
        (0xff4 => @END),
    }
}

/// One end of a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaAddress {
    /// Kernel virtual address of a buffer in normal memory
    Memory(usize),
    /// Bus address of a peripheral FIFO, paced by the peripheral's DREQ
    Peripheral(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaRequest {
    pub src: DmaAddress,
    pub dest: DmaAddress,
    /// Bytes to move
    pub len: usize,
    /// DREQ line pacing the peripheral end
    pub permap: u8,
}

/// Interface of the DMA controller as seen by peripheral drivers.
pub trait DmaEngine: Sync {
    /// Programs `channel` with `request` and starts it with its completion
    /// interrupt enabled.
    fn start_transfer(&self, channel: usize, request: &DmaRequest) -> Result<()>;

    fn is_active(&self, channel: usize) -> bool;

    /// Clears the channel's completion interrupt.
    fn acknowledge(&self, channel: usize);

    /// Aborts whatever the channel is doing.
    fn reset(&self, channel: usize);
}

#[repr(C, align(32))]
struct ControlBlock {
    ti: InMemoryRegister<u32, TI::Register>,
    source_ad: InMemoryRegister<u32>,
    dest_ad: InMemoryRegister<u32>,
    txfr_len: InMemoryRegister<u32>,
    stride: InMemoryRegister<u32>,
    nextconbk: InMemoryRegister<u32>,
    _reserved: [u32; 2],
}

impl ControlBlock {
    const fn new() -> Self {
        Self {
            ti: InMemoryRegister::new(0),
            source_ad: InMemoryRegister::new(0),
            dest_ad: InMemoryRegister::new(0),
            txfr_len: InMemoryRegister::new(0),
            stride: InMemoryRegister::new(0),
            nextconbk: InMemoryRegister::new(0),
            _reserved: [0; 2],
        }
    }
}

/// Translates a kernel virtual address into what the DMA controller sees.
pub type BusTranslation = fn(usize) -> Option<u32>;

pub fn kernel_bus_address(addr: usize) -> Option<u32> {
    AddressVirtual::try_new(addr as u64).map(|va| va.as_bus().as_u32())
}

pub struct Bcm2837Dma {
    regs: MMIORegisters<DmaRegisters>,
    blocks: SpinLock<[ControlBlock; NUM_CHANNELS]>,
    to_bus: BusTranslation,
}

impl Bcm2837Dma {
    /// # Safety
    ///
    /// There must be a DMA controller (or memory laid out like one) at `base`.
    pub const unsafe fn new(base: usize, to_bus: BusTranslation) -> Self {
        Self {
            regs: MMIORegisters::new(base),
            blocks: SpinLock::new([const { ControlBlock::new() }; NUM_CHANNELS]),
            to_bus,
        }
    }

    fn channel(&self, channel: usize) -> Result<&ChannelRegisters> {
        self.regs.CHANNELS.get(channel).ok_or(Error::Dma)
    }

    fn bus_address(&self, addr: DmaAddress) -> Result<u32> {
        match addr {
            DmaAddress::Memory(va) => (self.to_bus)(va).ok_or(Error::Dma),
            DmaAddress::Peripheral(bus) => Ok(bus),
        }
    }
}

fn transfer_info(request: &DmaRequest) -> u32 {
    // Memory ends walk the buffer, peripheral ends wait for the DREQ
    let src = match request.src {
        DmaAddress::Memory(_) => TI::SRC_INC::SET,
        DmaAddress::Peripheral(_) => TI::SRC_DREQ::SET,
    };
    let dest = match request.dest {
        DmaAddress::Memory(_) => TI::DEST_INC::SET,
        DmaAddress::Peripheral(_) => TI::DEST_DREQ::SET,
    };

    let ti: InMemoryRegister<u32, TI::Register> = InMemoryRegister::new(0);
    ti.write(
        TI::INTEN::SET
            + TI::WAIT_RESP::SET
            + TI::PERMAP.val(request.permap.into())
            + src
            + dest,
    );
    ti.get()
}

impl DmaEngine for Bcm2837Dma {
    fn start_transfer(&self, channel: usize, request: &DmaRequest) -> Result<()> {
        let regs = self.channel(channel)?;
        if request.len == 0 || request.len > DMA_MAX_TRANSFER_SIZE {
            return Err(Error::Dma);
        }
        if regs.CS.is_set(CS::ACTIVE) {
            return Err(Error::Busy);
        }

        let src = self.bus_address(request.src)?;
        let dest = self.bus_address(request.dest)?;

        let blocks = self.blocks.lock();
        let cb = &blocks[channel];
        let cb_addr = cb as *const ControlBlock as usize;
        let cb_bus = (self.to_bus)(cb_addr).ok_or(Error::Dma)?;

        cb.ti.set(transfer_info(request));
        cb.source_ad.set(src);
        cb.dest_ad.set(dest);
        cb.txfr_len.set(request.len as u32);
        cb.stride.set(0);
        cb.nextconbk.set(0);

        // The control block and source buffer live in normal cacheable
        // memory which is not coherent with the DMA controller
        dcache_clean_va_range(cb_addr, core::mem::size_of::<ControlBlock>());
        if let DmaAddress::Memory(va) = request.src {
            dcache_clean_va_range(va, request.len);
        }
        dma_write_barrier();

        self.regs.ENABLE.set(self.regs.ENABLE.get() | 1 << channel);
        regs.CONBLK_AD.set(cb_bus);
        regs.CS.write(
            CS::ACTIVE::SET
                + CS::PRIORITY.val(8)
                + CS::PANIC_PRIORITY.val(15)
                + CS::WAIT_FOR_OUTSTANDING_WRITES::SET,
        );
        Ok(())
    }

    fn is_active(&self, channel: usize) -> bool {
        self.channel(channel)
            .is_ok_and(|regs| regs.CS.is_set(CS::ACTIVE))
    }

    fn acknowledge(&self, channel: usize) {
        if let Ok(regs) = self.channel(channel) {
            // INT and END are write-1-to-clear
            regs.CS.write(CS::INT::SET + CS::END::SET);
        }
    }

    fn reset(&self, channel: usize) {
        if let Ok(regs) = self.channel(channel) {
            regs.CS.write(CS::RESET::SET);
        }
    }
}
