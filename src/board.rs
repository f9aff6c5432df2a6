//! Wires the drivers to the RPi3's peripherals and publishes them as devices.
//!
//! The kernel's EL1 IRQ vector is expected to call [`irq::handle_pending`].

use crate::config::BOARD;
use crate::device::{Attr, Device, DeviceEntry, DeviceTable, PinAssignment};
use crate::drivers::dma::{kernel_bus_address, Bcm2837Dma};
use crate::drivers::gpio::GpioMux;
use crate::drivers::pwm_dac::{DacResources, PwmDac, PwmMode};
use crate::drivers::uart_mini::MiniUart;
use crate::drivers::PERIPHERALS_BASE;
use crate::engine::AddressSpaceValidator;
use crate::error::Result;
use crate::irq::{self, GpuIrq, Irq, IrqLine};
use crate::logging;
use log::LevelFilter;

pub const MAX_DEVICES: usize = 4;

// The DMA controller raises one GPU line per channel
const DAC_IRQ_LINE: Irq = Irq::Gpu(GpuIrq::Dma5);
const _: () = assert!(BOARD.dac_dma_channel == 5);

const UART_IRQ_LINE: Irq = Irq::Gpu(GpuIrq::Aux);
const UART_TX_PIN: u8 = 14;
const UART_RX_PIN: u8 = 15;

static VALIDATOR: AddressSpaceValidator = AddressSpaceValidator;

// SAFETY: Addresses as per BCM2837 chapters 4, 6 and 9
static GPIO_MUX: GpioMux = unsafe { GpioMux::new(PERIPHERALS_BASE + 0x20_0000) };
static DMA: Bcm2837Dma = unsafe { Bcm2837Dma::new(PERIPHERALS_BASE + 0x7000, kernel_bus_address) };

static DAC_IRQ: IrqLine = IrqLine::new(DAC_IRQ_LINE);

// SAFETY: PWM block and its clock manager (CM_PWMCTL/CM_PWMDIV)
static PWM_DAC: PwmDac = unsafe {
    PwmDac::new(
        DacResources {
            pwm_base: PERIPHERALS_BASE + 0x20_C000,
            clock_base: PERIPHERALS_BASE + 0x10_10A0,
            dma: &DMA,
            irq: &DAC_IRQ,
            pins: &GPIO_MUX,
            validator: &VALIDATOR,
        },
        PwmMode::Dma,
        BOARD,
    )
};

// SAFETY: AUX block, see BCM2837 section 2.1
static UART: MiniUart =
    unsafe { MiniUart::new(PERIPHERALS_BASE + 0x21_5000, &GPIO_MUX, &VALIDATOR, BOARD) };

/// Brings the drivers up and returns the device table. The mini UART is
/// opened on GPIO 14/15 and stays open; the DAC is only powered while
/// someone holds it open.
pub fn init(level: LevelFilter) -> Result<DeviceTable<MAX_DEVICES>> {
    logging::init(level);

    irq::register_handler(DAC_IRQ_LINE, &PWM_DAC)?;
    irq::register_handler(UART_IRQ_LINE, &UART)?;

    let mut devices = DeviceTable::new();
    devices.register(DeviceEntry::new("dac0", &PWM_DAC, 0))?;
    devices.register(DeviceEntry::new("uart0", &UART, 0))?;

    UART.open(0)?;
    let mut attr = Attr::new(BOARD.uart_baud);
    attr.pin_assignment[0] = PinAssignment::new(0, UART_TX_PIN);
    attr.pin_assignment[1] = PinAssignment::new(0, UART_RX_PIN);
    UART.set_attr(0, &mut attr)?;

    // The DAC's line is unmasked by its first submission
    irq::enable_irq(UART_IRQ_LINE);
    irq::enable_interrupts();

    log::info!("Board up: mini UART at {} baud", attr.freq);
    Ok(devices)
}
