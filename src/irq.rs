use crate::drivers::interrupt_controller;
use crate::error::{Error, Result};
use crate::locking::SpinLock;
use aarch64_cpu::registers::DAIF;
use tock_registers::interfaces::ReadWriteable;

// 64 GPU lines followed by the 8 ARM basic lines
pub const NUM_IRQS: usize = 72;
const ARM_IRQ_BASE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Irq {
    Arm(ArmIrq),
    Gpu(GpuIrq),
}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmIrq {
    Timer = 0,
    Mailbox = 1,
    Doorbell0 = 2,
    Doorbell1 = 3,
    GpuHalted0 = 4,
    GpuHalted1 = 5,
    AccessErrorType1 = 6,
    AccessErrorType0 = 7,
}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuIrq {
    SystemTimer1 = 1,
    SystemTimer3 = 3,
    Usb = 9,
    Dma0 = 16,
    Dma1 = 17,
    Dma2 = 18,
    Dma3 = 19,
    Dma4 = 20,
    Dma5 = 21,
    Dma6 = 22,
    Dma7 = 23,
    Dma8 = 24,
    Dma9 = 25,
    Dma10 = 26,
    Dma11 = 27,
    Dma12 = 28,
    Aux = 29,
    I2cSpiSlv = 43,
    Pwa0 = 45,
    Pwa1 = 46,
    Smi = 48,
    Gpio0 = 49,
    Gpio1 = 50,
    Gpio2 = 51,
    Gpio3 = 52,
    I2c = 53,
    Spi = 54,
    Pcm = 55,
    Uart = 57,
}

impl Irq {
    /// Position of the line in the dispatch table
    pub const fn index(&self) -> usize {
        match self {
            Irq::Gpu(irq) => *irq as usize,
            Irq::Arm(irq) => ARM_IRQ_BASE + *irq as usize,
        }
    }
}

/// Something that can stop a device's interrupt from being delivered: a line
/// at the interrupt controller, or an enable bit inside the peripheral.
pub trait InterruptSource: Sync {
    /// Masks the source and returns whether it was unmasked before.
    fn mask(&self) -> bool;
    fn unmask(&self);
}

/// An interrupt line at the BCM2837 interrupt controller.
pub struct IrqLine {
    irq: Irq,
}

impl IrqLine {
    pub const fn new(irq: Irq) -> Self {
        Self { irq }
    }
}

impl InterruptSource for IrqLine {
    fn mask(&self) -> bool {
        let was_enabled = interrupt_controller::is_enabled(self.irq.index());
        interrupt_controller::disable_line(self.irq.index());
        was_enabled
    }

    fn unmask(&self) {
        interrupt_controller::enable_line(self.irq.index());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    /// More interrupts are expected, leave the line enabled
    Keep,
    /// Nothing is pending on the device anymore, the line can be masked
    Done,
}

pub trait IrqHandler: Sync {
    fn handle_irq(&self) -> IrqReturn;
}

pub struct IrqTable {
    handlers: SpinLock<[Option<&'static dyn IrqHandler>; NUM_IRQS]>,
}

impl IrqTable {
    pub const fn new() -> Self {
        Self {
            handlers: SpinLock::new([None; NUM_IRQS]),
        }
    }

    pub fn register(&self, irq: Irq, handler: &'static dyn IrqHandler) -> Result<()> {
        let mut handlers = self.handlers.lock();
        let slot = &mut handlers[irq.index()];
        match slot {
            Some(current) if !core::ptr::addr_eq(*current, handler) => Err(Error::Busy),
            _ => {
                *slot = Some(handler);
                Ok(())
            }
        }
    }

    /// Runs the handler registered for the line. `None` means the line has no
    /// handler and should be masked.
    pub fn dispatch(&self, index: usize) -> Option<IrqReturn> {
        // Copy the handler out so that it runs without the table lock held
        let handler = *self.handlers.lock().get(index)?;
        handler.map(|h| h.handle_irq())
    }
}

static IRQ_TABLE: IrqTable = IrqTable::new();

pub fn register_handler(irq: Irq, handler: &'static dyn IrqHandler) -> Result<()> {
    IRQ_TABLE.register(irq, handler)
}

/// Called from the EL1 IRQ vector. Services every pending line once.
pub fn handle_pending() {
    for index in interrupt_controller::pending() {
        match IRQ_TABLE.dispatch(index) {
            Some(IrqReturn::Keep) => {}
            Some(IrqReturn::Done) => interrupt_controller::disable_line(index),
            None => {
                log::warn!("Spurious IRQ on line {index}, masking it");
                interrupt_controller::disable_line(index);
            }
        }
    }
}

#[inline]
pub fn enable_irq(irq: Irq) {
    interrupt_controller::enable_line(irq.index());
}

#[inline]
pub fn enable_interrupts() {
    DAIF.modify(DAIF::D::Unmasked + DAIF::A::Unmasked + DAIF::I::Unmasked + DAIF::F::Unmasked);
}
