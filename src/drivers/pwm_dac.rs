// The BCM2837 has no DAC. Audio-rate output is done by the PWM block in
// mark/space mode, low-pass filtered on the board: each 32-bit word written
// to the PWM FIFO is the mark length of one output sample, and the range
// register sets the sample period in PWM clock ticks. See
// BCM2835-ARM-Peripherals.pdf chapter 9.
//
// In DMA mode the FIFO is fed by a DMA channel paced by the PWM DREQ and
// asynchronous writes go through the transfer engine. In direct mode the
// current sample is written straight to DAT1/DAT2 and there is no write path.

use crate::config::BoardConfig;
use crate::device::{Attr, AttrField, AttrFlags, Device, Info, InfoFlags};
use crate::drivers::dma::{DmaAddress, DmaEngine, DmaRequest, DMA_MAX_TRANSFER_SIZE};
use crate::drivers::MMIORegisters;
use crate::engine::{
    configure, Action, CallbackValidator, ClockLimits, Direction, EventFlags, Peripheral,
    PeripheralClock, PinMux, PortTable, TransferBackend, TransferPage, TransferRequest,
};
use crate::error::{Error, Result};
use crate::irq::{InterruptSource, IrqHandler, IrqReturn};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

pub const DAC_PORTS: usize = 1;

// FIF1 as seen from the DMA controller
const PWM_FIFO_BUS: u32 = 0x7E20_C018;
const DREQ_PWM: u8 = 5;
const WORD_SIZE: usize = 4;
const CM_PASSWD: u32 = 0x5A;
// CM_PWMDIV.DIVI is 12 bits wide
const DIVISOR_MAX: u32 = (1 << 12) - 1;

register_bitfields! {
    u32,

    CTL [
        PWEN1 OFFSET(0)  NUMBITS(1) [],
        MODE1 OFFSET(1)  NUMBITS(1) [],
        RPTL1 OFFSET(2)  NUMBITS(1) [],
        SBIT1 OFFSET(3)  NUMBITS(1) [],
        POLA1 OFFSET(4)  NUMBITS(1) [],
        USEF1 OFFSET(5)  NUMBITS(1) [],
        CLRF1 OFFSET(6)  NUMBITS(1) [],
        MSEN1 OFFSET(7)  NUMBITS(1) [],
        PWEN2 OFFSET(8)  NUMBITS(1) [],
        MODE2 OFFSET(9)  NUMBITS(1) [],
        RPTL2 OFFSET(10) NUMBITS(1) [],
        SBIT2 OFFSET(11) NUMBITS(1) [],
        POLA2 OFFSET(12) NUMBITS(1) [],
        USEF2 OFFSET(13) NUMBITS(1) [],
        MSEN2 OFFSET(15) NUMBITS(1) [],
    ],

    DMAC [
        DREQ  OFFSET(0)  NUMBITS(8) [],
        PANIC OFFSET(8)  NUMBITS(8) [],
        ENAB  OFFSET(31) NUMBITS(1) [],
    ],

    CM_CTL [
        SRC    OFFSET(0)  NUMBITS(4) [],
        ENAB   OFFSET(4)  NUMBITS(1) [],
        KILL   OFFSET(5)  NUMBITS(1) [],
        BUSY   OFFSET(7)  NUMBITS(1) [],
        PASSWD OFFSET(24) NUMBITS(8) [],
    ],

    CM_DIV [
        DIVF   OFFSET(0)  NUMBITS(12) [],
        DIVI   OFFSET(12) NUMBITS(12) [],
        PASSWD OFFSET(24) NUMBITS(8) [],
    ],
}

register_structs! {
    #[allow(non_snake_case)]
    PwmRegisters {
        (0x00 => CTL: ReadWrite<u32, CTL::Register>),
        (0x04 => STA: ReadWrite<u32>),
        (0x08 => DMAC: ReadWrite<u32, DMAC::Register>),
        (0x0c => _reserved0),
        (0x10 => RNG1: ReadWrite<u32>),
        (0x14 => DAT1: ReadWrite<u32>),
        (0x18 => FIF1: WriteOnly<u32>),
        (0x1c => _reserved1),
        (0x20 => RNG2: ReadWrite<u32>),
        (0x24 => DAT2: ReadWrite<u32>),
        (0x28 => @END),
    }
}

// CM_PWMCTL / CM_PWMDIV inside the clock manager
register_structs! {
    #[allow(non_snake_case)]
    ClockRegisters {
        (0x00 => CTL: ReadWrite<u32, CM_CTL::Register>),
        (0x04 => DIV: ReadWrite<u32, CM_DIV::Register>),
        (0x08 => @END),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PwmMode {
    /// Samples are written one at a time through `set`
    Direct,
    /// Buffers are streamed into the FIFO by DMA
    Dma,
}

/// Everything the DAC is wired to.
pub struct DacResources {
    pub pwm_base: usize,
    pub clock_base: usize,
    pub dma: &'static dyn DmaEngine,
    pub irq: &'static dyn InterruptSource,
    pub pins: &'static dyn PinMux,
    pub validator: &'static dyn CallbackValidator,
}

pub struct PwmDac {
    pwm: MMIORegisters<PwmRegisters>,
    clock: MMIORegisters<ClockRegisters>,
    dma: &'static dyn DmaEngine,
    irq: &'static dyn InterruptSource,
    pins: &'static dyn PinMux,
    validator: &'static dyn CallbackValidator,
    mode: PwmMode,
    config: BoardConfig,
    ports: PortTable<DAC_PORTS>,
}

impl PwmDac {
    /// # Safety
    ///
    /// `resources.pwm_base` and `resources.clock_base` must point at the PWM
    /// block and at CM_PWMCTL (or memory laid out like them).
    pub const unsafe fn new(resources: DacResources, mode: PwmMode, config: BoardConfig) -> Self {
        Self {
            pwm: MMIORegisters::new(resources.pwm_base),
            clock: MMIORegisters::new(resources.clock_base),
            dma: resources.dma,
            irq: resources.irq,
            pins: resources.pins,
            validator: resources.validator,
            mode,
            config,
            ports: PortTable::new(),
        }
    }

    fn channel(&self) -> usize {
        self.config.dac_dma_channel
    }

    fn power_on(&self) {
        self.pwm.CTL.write(CTL::CLRF1::SET);
        self.pwm.RNG1.set(self.config.pwm_range);
        self.pwm.RNG2.set(self.config.pwm_range);
        self.pwm.DAT1.set(0);
        self.pwm.DAT2.set(0);
    }

    fn power_off(&self) {
        self.pwm.CTL.set(0);
        self.pwm.DMAC.set(0);
        self.stop_clock();
        self.pins.release_all(Peripheral::Pwm);
    }

    fn stop_clock(&self) {
        self.clock.CTL.write(
            CM_CTL::PASSWD.val(CM_PASSWD) + CM_CTL::SRC.val(self.config.pwm_clock_src),
        );
        while self.clock.CTL.is_set(CM_CTL::BUSY) {
            // Wait for the clock generator to stop before touching DIV
        }
    }

    // Output channels in mark/space mode, optionally fed from the FIFO
    fn enable_channels(&self, enabled_mask: u32, use_fifo: bool) {
        let channels = AttrFlags::from_bits_truncate(enabled_mask);
        let mut value = CTL::PWEN1::CLEAR;
        if channels.contains(AttrFlags::CHANNEL_0) {
            value = value + CTL::PWEN1::SET + CTL::MSEN1::SET + CTL::USEF1.val(use_fifo.into());
        }
        if channels.contains(AttrFlags::CHANNEL_1) {
            value = value + CTL::PWEN2::SET + CTL::MSEN2::SET + CTL::USEF2.val(use_fifo.into());
        }
        self.pwm.CTL.modify(value);
    }
}

impl PeripheralClock for PwmDac {
    fn limits(&self) -> ClockLimits {
        ClockLimits {
            max_freq: self.config.dac_max_freq,
            clock_hz: self.config.pwm_sample_clock_hz(),
            divisor_max: DIVISOR_MAX,
        }
    }

    fn set_divisor(&self, divisor: u32) {
        self.stop_clock();
        self.clock
            .DIV
            .write(CM_DIV::PASSWD.val(CM_PASSWD) + CM_DIV::DIVI.val(divisor));
        self.clock.CTL.write(
            CM_CTL::PASSWD.val(CM_PASSWD)
                + CM_CTL::SRC.val(self.config.pwm_clock_src)
                + CM_CTL::ENAB::SET,
        );
    }
}

impl TransferBackend for PwmDac {
    fn word_size(&self) -> usize {
        WORD_SIZE
    }

    fn max_page_words(&self) -> usize {
        DMA_MAX_TRANSFER_SIZE / WORD_SIZE
    }

    fn is_busy(&self) -> bool {
        self.mode == PwmMode::Dma && self.dma.is_active(self.channel())
    }

    fn start_page(&self, page: &TransferPage) -> Result<()> {
        if self.mode != PwmMode::Dma || page.direction != Direction::Write {
            return Err(Error::Unsupported);
        }
        self.dma.start_transfer(
            self.channel(),
            &DmaRequest {
                src: DmaAddress::Memory(page.addr),
                dest: DmaAddress::Peripheral(PWM_FIFO_BUS),
                len: page.bytes(),
                permap: DREQ_PWM,
            },
        )
    }

    fn start(&self, _direction: Direction, enabled_mask: u32) {
        self.pwm
            .DMAC
            .write(DMAC::ENAB::SET + DMAC::DREQ.val(7) + DMAC::PANIC.val(7));
        self.enable_channels(enabled_mask, true);
    }

    fn stop(&self) {
        self.pwm.CTL.modify(CTL::PWEN1::CLEAR + CTL::PWEN2::CLEAR);
        self.pwm.DMAC.modify(DMAC::ENAB::CLEAR);
        // A cancelled page would otherwise keep the channel active and block
        // the next submission until it drains, or complete into it
        self.dma.reset(self.channel());
        self.dma.acknowledge(self.channel());
    }

    fn irq(&self) -> &dyn InterruptSource {
        self.irq
    }
}

impl IrqHandler for PwmDac {
    fn handle_irq(&self) -> IrqReturn {
        self.dma.acknowledge(self.channel());
        self.ports.complete(0, self)
    }
}

impl Device for PwmDac {
    fn open(&self, port: usize) -> Result<()> {
        if self.ports.acquire(port, self)? {
            self.power_on();
        }
        Ok(())
    }

    fn close(&self, port: usize) -> Result<()> {
        if self.ports.release(port, self)? {
            self.power_off();
        }
        Ok(())
    }

    fn get_info(&self, port: usize) -> Result<Info> {
        self.ports.ensure_open(port, self)?;
        let (o_flags, o_events) = match self.mode {
            PwmMode::Direct => (InfoFlags::SAMPLE_ACCESS, EventFlags::empty()),
            PwmMode::Dma => (
                InfoFlags::ASYNC_WRITE | InfoFlags::DMA | InfoFlags::SAMPLE_ACCESS,
                EventFlags::WRITE_COMPLETE | EventFlags::CANCELED,
            ),
        };
        Ok(Info {
            o_flags,
            o_events,
            resolution: (u32::BITS - (self.config.pwm_range - 1).leading_zeros()) as u8,
            freq: self.config.dac_max_freq,
        })
    }

    fn set_attr(&self, port: usize, attr: &mut Attr) -> Result<()> {
        self.ports.ensure_open(port, self)?;
        if attr.o_flags.bits() & !AttrFlags::all().bits() != 0 {
            return Err(Error::InvalidAttribute(AttrField::Flags));
        }

        let applied = configure(attr, self, self.pins, Peripheral::Pwm)?;
        // No channel named means the first one
        let channels = if attr.o_flags.is_empty() {
            AttrFlags::CHANNEL_0
        } else {
            attr.o_flags
        };
        self.ports.set_enabled_mask(port, self, channels.bits())?;

        log::debug!(
            "PWM DAC: {} Hz, divisor {}, channels {channels:?}",
            applied.freq,
            applied.divisor
        );
        Ok(())
    }

    fn set_action(&self, port: usize, action: &Action) -> Result<()> {
        let handler = action.validate(self.validator)?;
        self.ports.set_action(port, self, handler)
    }

    fn write(&self, port: usize, request: &TransferRequest) -> Result<usize> {
        if self.mode != PwmMode::Dma {
            return Err(Error::Unsupported);
        }
        self.ports.submit_write(port, self, request, self.validator)
    }

    fn get(&self, port: usize) -> Result<u32> {
        self.ports.ensure_open(port, self)?;
        Ok(self.pwm.DAT1.get())
    }

    fn set(&self, port: usize, value: u32) -> Result<()> {
        let state = self.ports.state(port, self)?;
        if !state.is_open() {
            return Err(Error::NoDevice);
        }
        if state.is_busy() {
            return Err(Error::Busy);
        }
        if value > self.config.pwm_range {
            return Err(Error::InvalidArgument);
        }

        self.pwm.DAT1.set(value);
        self.pwm.DAT2.set(value);
        self.enable_channels(state.enabled_mask(), false);
        Ok(())
    }
}
