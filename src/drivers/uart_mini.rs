// As per BMC2837 section 2.2 the mini UART is NOT a 16550 compatible UART
// However as far as possible the first 8 control and status registers are laid
// out like a 16550 UART and the UART core is build to emulate 16550 behaviour.
//
// Transmission is interrupt driven: a write is handed to the transfer engine
// one FIFO's worth at a time and every "transmit holding register empty"
// interrupt refills it. Received characters are echoed back from the same
// interrupt line.

use crate::config::BoardConfig;
use crate::device::{Attr, AttrField, Device, Info, InfoFlags};
use crate::drivers::MMIORegisters;
use crate::engine::{
    configure, Action, CallbackValidator, ClockLimits, Direction, EventFlags, Peripheral,
    PeripheralClock, PinMux, PortTable, TransferBackend, TransferPage, TransferRequest,
};
use crate::error::{Error, Result};
use crate::irq::{InterruptSource, IrqHandler, IrqReturn};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{Aliased, ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

pub const UART_PORTS: usize = 1;
const TX_FIFO_DEPTH: usize = 8;
// AUX_MU_BAUD holds divisor - 1
const DIVISOR_MAX: u32 = 1 << 16;

register_bitfields! {
    u32,

    AUX_ENABLES [
        MINI_UART_ENABLE 0,
        SP1_ENABLE       1,
        SP2_ENABLE       2,
    ],

    AUX_MU_IER [
        ENABLE_RX_IRQ 0,
        ENABLE_TX_IRQ 1,
    ],

    AUX_MU_IIR_WRITE [
        CLEAR_RX_FIFO 1,
        CLEAR_TX_FIFO 2,
    ],

    AUX_MU_IIR_READ [
        IRQ_PENDING  OFFSET(0) NUMBITS(1) [],
        IRQ_ID       OFFSET(1) NUMBITS(2) [
            NO_IRQS = 0,
            TX_REGISTER_EMPTY = 1,
            RX_VALID = 2,
        ],
        FIFO_ENABLED OFFSET(6) NUMBITS(2) [],
    ],

    AUX_MU_LCR [
        DATA_SIZE OFFSET(0) NUMBITS(2) [
            SEVEN_BITS = 0,
            EIGHT_BITS = 3,
        ],
        BREAK     OFFSET(6) NUMBITS(1) [],
        DLAB      OFFSET(7) NUMBITS(1) [],
    ],

    AUX_MU_LSR [
        DATA_READY 0,
        RX_OVERRUN 1,
        TX_READY   5,
        TX_IDLE    6,
    ],

    AUX_MU_CNTL [
        RX_ENABLE          OFFSET(0) NUMBITS(1) [],
        TX_ENABLE          OFFSET(1) NUMBITS(1) [],
        RX_AUTOFLOW_ENABLE OFFSET(2) NUMBITS(1) [],
        TX_AUTOFLOW_ENABLE OFFSET(3) NUMBITS(1) [],
    ],

    AUX_MU_STAT [
        RX_SYMBOL_AVAILABLE OFFSET(0)  NUMBITS(1) [],
        TX_SPACE_AVAILABLE  OFFSET(1)  NUMBITS(1) [],
        RX_IDLE             OFFSET(2)  NUMBITS(1) [],
        TX_IDLE             OFFSET(3)  NUMBITS(1) [],
        RX_OVERRUN          OFFSET(4)  NUMBITS(1) [],
        TX_FIFO_FULL        OFFSET(5)  NUMBITS(1) [],
        TX_FIFO_EMPTY       OFFSET(8)  NUMBITS(1) [],
        TX_DONE             OFFSET(9)  NUMBITS(1) [],
        RX_FIFO_FILL_LVL    OFFSET(16) NUMBITS(4) [],
        TX_FIFO_FILL_LVL    OFFSET(24) NUMBITS(4) [],
    ],
}

register_structs! {
    #[allow(non_snake_case)]
    AuxRegisters {
        (0x000 => AUX_IRQ: ReadOnly<u32>),
        (0x004 => AUX_ENABLES: ReadWrite<u32, AUX_ENABLES::Register>),
        (0x008 => _reserved0),
        (0x040 => AUX_MU_IO_DATA: ReadWrite<u8>),
        (0x041 => _reserved1),
        (0x044 => AUX_MU_IER: ReadWrite<u32, AUX_MU_IER::Register>),
        (0x048 => AUX_MU_IIR: Aliased<u32, AUX_MU_IIR_READ::Register, AUX_MU_IIR_WRITE::Register>),
        (0x04c => AUX_MU_LCR: ReadWrite<u32, AUX_MU_LCR::Register>),
        (0x050 => AUX_MU_MCR: ReadWrite<u32>),
        (0x054 => AUX_MU_LSR: ReadOnly<u32, AUX_MU_LSR::Register>),
        (0x058 => AUX_MU_MSR: ReadOnly<u32>),
        (0x05c => AUX_MU_SCRATCH: ReadWrite<u32>),
        (0x060 => AUX_MU_CNTL: ReadWrite<u32, AUX_MU_CNTL::Register>),
        (0x064 => AUX_MU_STAT: ReadOnly<u32, AUX_MU_STAT::Register>),
        (0x068 => AUX_MU_BAUD: ReadWrite<u16>),
        (0x06a => _reserved2),
        (0x06c => @END),
    }
}

pub struct MiniUart {
    regs: MMIORegisters<AuxRegisters>,
    pins: &'static dyn PinMux,
    validator: &'static dyn CallbackValidator,
    config: BoardConfig,
    ports: PortTable<UART_PORTS>,
}

impl MiniUart {
    /// # Safety
    ///
    /// There must be an AUX block (or memory laid out like one) at `base`.
    pub const unsafe fn new(
        base: usize,
        pins: &'static dyn PinMux,
        validator: &'static dyn CallbackValidator,
        config: BoardConfig,
    ) -> Self {
        Self {
            regs: MMIORegisters::new(base),
            pins,
            validator,
            config,
            ports: PortTable::new(),
        }
    }

    /// Configure UART for 8N1 (1 start bit, 8 data bits, no parity, 1 stop bit)
    fn power_on(&self) {
        // The enable bit must be set first, otherwise we cannot even access the
        // rest of the registers.
        self.regs
            .AUX_ENABLES
            .modify(AUX_ENABLES::MINI_UART_ENABLE::SET);

        self.regs
            .AUX_MU_CNTL
            .write(AUX_MU_CNTL::RX_ENABLE::CLEAR + AUX_MU_CNTL::TX_ENABLE::CLEAR);
        while !self.regs.AUX_MU_STAT.is_set(AUX_MU_STAT::RX_IDLE) {
            // Wait until receiver is idle before proceeding
        }

        self.regs
            .AUX_MU_LCR
            .write(AUX_MU_LCR::DATA_SIZE::EIGHT_BITS);
        self.set_divisor(self.limits().divisor_for(self.config.uart_baud));

        // TX interrupts are only enabled while a write is in flight
        self.regs.AUX_MU_IER.write(AUX_MU_IER::ENABLE_RX_IRQ::SET);

        // Setup is complete, enable RX/TX
        self.regs
            .AUX_MU_CNTL
            .modify(AUX_MU_CNTL::RX_ENABLE::SET + AUX_MU_CNTL::TX_ENABLE::SET);
    }

    fn power_off(&self) {
        self.regs.AUX_MU_IER.set(0);
        self.regs.AUX_MU_CNTL.set(0);
        self.regs
            .AUX_ENABLES
            .modify(AUX_ENABLES::MINI_UART_ENABLE::CLEAR);
        self.pins.release_all(Peripheral::MiniUart);
    }

    pub fn put_char(&self, c: char) {
        while !self.regs.AUX_MU_LSR.is_set(AUX_MU_LSR::TX_READY) {
            // Wait until we can transmit
        }
        self.regs.AUX_MU_IO_DATA.set(c as u8);
    }

    pub fn get_char(&self) -> char {
        self.regs.AUX_MU_IO_DATA.get() as char
    }

    fn process_rx_irq(&self) {
        let c = self.get_char();
        self.put_char(c);
        if c == '\r' {
            self.put_char('\n');
        }
    }
}

// Only the transmit half is a port interrupt source, RX stays enabled
impl InterruptSource for MiniUart {
    fn mask(&self) -> bool {
        let was_enabled = self.regs.AUX_MU_IER.is_set(AUX_MU_IER::ENABLE_TX_IRQ);
        self.regs.AUX_MU_IER.modify(AUX_MU_IER::ENABLE_TX_IRQ::CLEAR);
        was_enabled
    }

    fn unmask(&self) {
        self.regs.AUX_MU_IER.modify(AUX_MU_IER::ENABLE_TX_IRQ::SET);
    }
}

impl PeripheralClock for MiniUart {
    // baudrate = (clock_freq) / (8 * (aux_mu_baud + 1))
    fn limits(&self) -> ClockLimits {
        let clock_hz = self.config.core_clock_hz / 8;
        ClockLimits {
            max_freq: clock_hz,
            clock_hz,
            divisor_max: DIVISOR_MAX,
        }
    }

    fn set_divisor(&self, divisor: u32) {
        self.regs.AUX_MU_BAUD.set((divisor - 1) as u16);
    }
}

impl TransferBackend for MiniUart {
    fn word_size(&self) -> usize {
        1
    }

    fn max_page_words(&self) -> usize {
        TX_FIFO_DEPTH
    }

    // There's no transfer engine to be busy, the port cursor is the only
    // indicator
    fn is_busy(&self) -> bool {
        false
    }

    fn start_page(&self, page: &TransferPage) -> Result<()> {
        if page.direction != Direction::Write {
            return Err(Error::Unsupported);
        }
        // SAFETY: The page lies within a buffer the submitter guaranteed to
        // keep alive until completion, see TransferRequest::new()
        let bytes = unsafe { core::slice::from_raw_parts(page.addr as *const u8, page.bytes()) };
        for &byte in bytes {
            self.put_char(byte as char);
        }
        Ok(())
    }

    fn start(&self, _direction: Direction, _enabled_mask: u32) {
        self.regs
            .AUX_MU_CNTL
            .modify(AUX_MU_CNTL::TX_ENABLE::SET);
    }

    fn stop(&self) {
        self.regs.AUX_MU_IER.modify(AUX_MU_IER::ENABLE_TX_IRQ::CLEAR);
    }

    fn irq(&self) -> &dyn InterruptSource {
        self
    }
}

impl IrqHandler for MiniUart {
    fn handle_irq(&self) -> IrqReturn {
        match self.regs.AUX_MU_IIR.read_as_enum(AUX_MU_IIR_READ::IRQ_ID) {
            Some(AUX_MU_IIR_READ::IRQ_ID::Value::RX_VALID) => self.process_rx_irq(),
            Some(AUX_MU_IIR_READ::IRQ_ID::Value::TX_REGISTER_EMPTY) => {
                if self.ports.complete(0, self) == IrqReturn::Done {
                    // An empty FIFO keeps interrupting until TX is masked
                    self.stop();
                }
            }
            _ => {}
        }
        // The receiver still needs the line
        IrqReturn::Keep
    }
}

impl Device for MiniUart {
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
        Ok(Info {
            o_flags: InfoFlags::ASYNC_WRITE,
            o_events: EventFlags::WRITE_COMPLETE | EventFlags::CANCELED,
            resolution: 8,
            freq: self.limits().max_freq,
        })
    }

    /// `attr.freq` is the baud rate.
    fn set_attr(&self, port: usize, attr: &mut Attr) -> Result<()> {
        self.ports.ensure_open(port, self)?;
        if !attr.o_flags.is_empty() {
            return Err(Error::InvalidAttribute(AttrField::Flags));
        }
        let applied = configure(attr, self, self.pins, Peripheral::MiniUart)?;
        log::debug!("Mini UART: {} baud, divisor {}", applied.freq, applied.divisor);
        Ok(())
    }

    fn set_action(&self, port: usize, action: &Action) -> Result<()> {
        let handler = action.validate(self.validator)?;
        self.ports.set_action(port, self, handler)
    }

    fn write(&self, port: usize, request: &TransferRequest) -> Result<usize> {
        self.ports.submit_write(port, self, request, self.validator)
    }
}
