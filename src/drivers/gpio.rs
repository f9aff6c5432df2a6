use crate::device::PinAssignment;
use crate::drivers::MMIORegisters;
use crate::engine::{Peripheral, PinMux};
use crate::error::{Error, Result};
use crate::locking::SpinLock;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadWrite, WriteOnly};

pub const NUM_GPIO_PINS: usize = 54;

#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

register_structs! {
    #[allow(non_snake_case)]
    GPIORegisters {
        (0x000 => GPFSEL: [ReadWrite<u32>; 6]),
        (0x018 => _reserved0),
        (0x01c => GPSET0: WriteOnly<u32>),
        (0x020 => GPSET1: WriteOnly<u32>),
        (0x024 => _reserved1),
        (0x028 => GPCLR0: WriteOnly<u32>),
        (0x02c => GPCLR1: WriteOnly<u32>),
        (0x030 => _reserved2),
        (0x0b4 => @END),
    }
}

// Function select for a pin that carries the peripheral's signal, see
// BCM2837 section 6.2 "Alternative Function Assignments"
fn function_for(pin: u8, peripheral: Peripheral) -> Option<PinMode> {
    match (peripheral, pin) {
        // PWM0 / PWM1
        (Peripheral::Pwm, 12 | 13 | 40 | 41 | 45) => Some(PinMode::Alt0),
        (Peripheral::Pwm, 18 | 19) => Some(PinMode::Alt5),
        // TXD1 / RXD1
        (Peripheral::MiniUart, 14 | 15 | 32 | 33 | 40 | 41) => Some(PinMode::Alt5),
        _ => None,
    }
}

/// The GPIO function select block plus a record of which peripheral owns
/// each pin.
pub struct GpioMux {
    regs: MMIORegisters<GPIORegisters>,
    owners: SpinLock<[Option<Peripheral>; NUM_GPIO_PINS]>,
}

impl GpioMux {
    /// # Safety
    ///
    /// There must be a GPIO block (or memory laid out like one) at `base`.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            regs: MMIORegisters::new(base),
            owners: SpinLock::new([None; NUM_GPIO_PINS]),
        }
    }

    // Callers hold the owners lock, which also serialises GPFSEL updates
    fn select_mode(&self, pin: u8, mode: PinMode) {
        // Used to pick a register from GPFSEL0 to GPFSEL5
        let reg_index = pin as usize / 10;
        // Used to pick a field from FSEL0 to FSEL9 inside a GPFSELX register
        let field_index = pin as usize % 10;
        let gpfselx = &self.regs.GPFSEL[reg_index];

        let mut value = gpfselx.get();
        // Clear FSELx
        value &= !(0b111 << (field_index * 3));
        // Set the mode
        value |= (mode as u32) << (field_index * 3);
        gpfselx.set(value);
    }
}

impl PinMux for GpioMux {
    fn claim(&self, pins: &[PinAssignment], peripheral: Peripheral) -> Result<()> {
        let mut owners = self.owners.lock();

        // Check everything before touching a single register
        let mut modes = heapless::Vec::<(u8, PinMode), NUM_GPIO_PINS>::new();
        for assignment in pins {
            let pin = assignment.pin;
            let claimable = assignment.port == 0
                && owners
                    .get(pin as usize)
                    .is_some_and(|owner| owner.map_or(true, |o| o == peripheral));
            let mode = function_for(pin, peripheral).filter(|_| claimable);
            let Some(mode) = mode else {
                log::warn!("{peripheral:?}: can't claim pin {}.{pin}", assignment.port);
                return Err(Error::PinClaim { pin });
            };
            modes.push((pin, mode)).map_err(|_| Error::InvalidArgument)?;
        }

        for (pin, mode) in modes {
            owners[pin as usize] = Some(peripheral);
            self.select_mode(pin, mode);
        }
        Ok(())
    }

    fn release_all(&self, peripheral: Peripheral) {
        let mut owners = self.owners.lock();
        for pin in 0..NUM_GPIO_PINS {
            if owners[pin] == Some(peripheral) {
                owners[pin] = None;
                self.select_mode(pin as u8, PinMode::Input);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegs;

    fn owner(mux: &GpioMux, pin: u8) -> Option<Peripheral> {
        mux.owners.lock()[pin as usize]
    }

    fn fsel(regs: &FakeRegs, pin: u8) -> u32 {
        let word = regs.word(pin as usize / 10 * 4);
        (word >> (pin as usize % 10 * 3)) & 0b111
    }

    #[test]
    fn test_claim_selects_alternate_function() {
        let regs = FakeRegs::new();
        // SAFETY: FakeRegs is large enough for the GPIO block
        let mux = unsafe { GpioMux::new(regs.base()) };

        mux.claim(&[PinAssignment::new(0, 18), PinAssignment::new(0, 13)], Peripheral::Pwm)
            .unwrap();

        assert_eq!(fsel(&regs, 18), PinMode::Alt5 as u32);
        assert_eq!(fsel(&regs, 13), PinMode::Alt0 as u32);
        assert_eq!(owner(&mux, 18), Some(Peripheral::Pwm));
    }

    #[test]
    fn test_pin_owned_by_other_function_is_refused() {
        let regs = FakeRegs::new();
        // SAFETY: See above
        let mux = unsafe { GpioMux::new(regs.base()) };

        mux.claim(&[PinAssignment::new(0, 40)], Peripheral::MiniUart).unwrap();
        let err = mux
            .claim(&[PinAssignment::new(0, 41), PinAssignment::new(0, 40)], Peripheral::Pwm)
            .unwrap_err();

        assert_eq!(err, Error::PinClaim { pin: 40 });
        // Nothing from the failed claim was applied
        assert_eq!(owner(&mux, 41), None);
        assert_eq!(fsel(&regs, 41), PinMode::Input as u32);
    }

    #[test]
    fn test_pin_without_function_is_refused() {
        let regs = FakeRegs::new();
        // SAFETY: See above
        let mux = unsafe { GpioMux::new(regs.base()) };

        assert_eq!(
            mux.claim(&[PinAssignment::new(0, 2)], Peripheral::Pwm),
            Err(Error::PinClaim { pin: 2 })
        );
        assert_eq!(
            mux.claim(&[PinAssignment::new(1, 18)], Peripheral::Pwm),
            Err(Error::PinClaim { pin: 18 })
        );
        assert_eq!(
            mux.claim(&[PinAssignment::new(0, 60)], Peripheral::Pwm),
            Err(Error::PinClaim { pin: 60 })
        );
    }

    #[test]
    fn test_release_returns_pins_to_input() {
        let regs = FakeRegs::new();
        // SAFETY: See above
        let mux = unsafe { GpioMux::new(regs.base()) };

        mux.claim(&[PinAssignment::new(0, 14), PinAssignment::new(0, 15)], Peripheral::MiniUart)
            .unwrap();
        mux.claim(&[PinAssignment::new(0, 18)], Peripheral::Pwm).unwrap();
        mux.release_all(Peripheral::MiniUart);

        assert_eq!(owner(&mux, 14), None);
        assert_eq!(fsel(&regs, 14), PinMode::Input as u32);
        assert_eq!(fsel(&regs, 15), PinMode::Input as u32);
        assert_eq!(owner(&mux, 18), Some(Peripheral::Pwm));
    }

    #[test]
    fn test_reclaim_by_same_function_is_allowed() {
        let regs = FakeRegs::new();
        // SAFETY: See above
        let mux = unsafe { GpioMux::new(regs.base()) };

        mux.claim(&[PinAssignment::new(0, 18)], Peripheral::Pwm).unwrap();
        mux.claim(&[PinAssignment::new(0, 18)], Peripheral::Pwm).unwrap();
        assert_eq!(fsel(&regs, 18), PinMode::Alt5 as u32);
    }
}
