use crate::device::{Attr, AttrField, PinAssignment, ATTR_PINS};
use crate::error::{Error, Result};

/// The signal function a pin is handed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peripheral {
    Pwm,
    MiniUart,
}

/// Pin function ownership. `claim` either binds every pin in the list to the
/// peripheral or none of them.
pub trait PinMux: Sync {
    fn claim(&self, pins: &[PinAssignment], peripheral: Peripheral) -> Result<()>;

    /// Returns every pin owned by `peripheral` to a plain input.
    fn release_all(&self, peripheral: Peripheral);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockLimits {
    /// Highest output frequency the device supports
    pub max_freq: u32,
    /// Rate of the clock feeding the divisor
    pub clock_hz: u32,
    /// Largest value the divisor register holds
    pub divisor_max: u32,
}

/// A clock with a programmable integer divisor in front of a peripheral.
pub trait PeripheralClock: Sync {
    fn limits(&self) -> ClockLimits;
    fn set_divisor(&self, divisor: u32);
}

/// What [`configure`] ended up programming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Applied {
    pub freq: u32,
    pub divisor: u32,
}

impl ClockLimits {
    /// Divisor closest to `clock_hz / freq`, kept within what the register
    /// can represent.
    pub fn divisor_for(&self, freq: u32) -> u32 {
        let freq = u64::from(freq.max(1));
        let divisor = (u64::from(self.clock_hz) + freq / 2) / freq;
        divisor.clamp(1, u64::from(self.divisor_max.max(1))) as u32
    }
}

/// Validates `attr` and programs pins and clock from it. A frequency above
/// the device maximum is clamped and the clamped value is written back into
/// `attr`.
pub fn configure(
    attr: &mut Attr,
    clock: &dyn PeripheralClock,
    pins: &dyn PinMux,
    peripheral: Peripheral,
) -> Result<Applied> {
    let limits = clock.limits();
    if attr.freq == 0 {
        return Err(Error::InvalidAttribute(AttrField::Freq));
    }
    if attr.freq > limits.max_freq {
        log::debug!("{peripheral:?}: clamping {} Hz to {} Hz", attr.freq, limits.max_freq);
        attr.freq = limits.max_freq;
    }

    let requested: heapless::Vec<PinAssignment, ATTR_PINS> = attr
        .pin_assignment
        .iter()
        .copied()
        .filter(|pin| !pin.is_none())
        .collect();
    pins.claim(&requested, peripheral)?;

    let divisor = limits.divisor_for(attr.freq);
    clock.set_divisor(divisor);

    Ok(Applied {
        freq: attr.freq,
        divisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClock, MockPinMux};

    fn attr(freq: u32, pins: &[(u8, u8)]) -> Attr {
        let mut attr = Attr::new(freq);
        for (slot, &(port, pin)) in attr.pin_assignment.iter_mut().zip(pins) {
            *slot = PinAssignment::new(port, pin);
        }
        attr
    }

    fn dac_limits() -> ClockLimits {
        ClockLimits {
            max_freq: 96_000,
            clock_hz: 1_953_125,
            divisor_max: 4095,
        }
    }

    #[test]
    fn test_zero_frequency_names_freq_field() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        let mut attr = attr(0, &[(0, 18)]);

        let err = configure(&mut attr, &clock, &pins, Peripheral::Pwm).unwrap_err();

        assert_eq!(err, Error::InvalidAttribute(AttrField::Freq));
        assert_eq!(
            err.as_return_code(),
            -1 - core::mem::offset_of!(Attr, freq) as isize
        );
        assert!(pins.claimed().is_empty());
        assert_eq!(clock.divisor(), None);
    }

    #[test]
    fn test_frequency_above_max_is_clamped() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        let mut attr = attr(100_000, &[]);

        let applied = configure(&mut attr, &clock, &pins, Peripheral::Pwm).unwrap();

        assert_eq!(applied.freq, 96_000);
        assert_eq!(attr.freq, 96_000);
        assert_eq!(applied.divisor, 20);
        assert_eq!(clock.divisor(), Some(20));
    }

    #[test]
    fn test_max_plus_one_applies_max() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        let mut attr = attr(96_001, &[]);

        assert_eq!(
            configure(&mut attr, &clock, &pins, Peripheral::Pwm).unwrap().freq,
            96_000
        );
    }

    #[test]
    fn test_divisor_rounds_and_clamps() {
        let limits = ClockLimits {
            max_freq: u32::MAX,
            clock_hz: 1000,
            divisor_max: 100,
        };
        // 1000 / 400 = 2.5 rounds up, 1000 / 401 = 2.49 rounds down
        assert_eq!(limits.divisor_for(400), 3);
        assert_eq!(limits.divisor_for(401), 2);
        // Faster than the source clock still divides by at least 1
        assert_eq!(limits.divisor_for(5000), 1);
        assert_eq!(limits.divisor_for(1), 100);
    }

    #[test]
    fn test_pin_claim_failure_is_reported() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        pins.reserve(19);
        let mut attr = attr(48_000, &[(0, 18), (0, 19)]);

        let err = configure(&mut attr, &clock, &pins, Peripheral::Pwm).unwrap_err();

        assert_eq!(err, Error::PinClaim { pin: 19 });
        assert_eq!(clock.divisor(), None);
    }

    #[test]
    fn test_unassigned_pins_are_skipped() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        let mut attr = attr(48_000, &[(0, 18)]);

        configure(&mut attr, &clock, &pins, Peripheral::Pwm).unwrap();

        assert_eq!(pins.claimed(), [(PinAssignment::new(0, 18), Peripheral::Pwm)]);
    }

    #[test]
    fn test_configure_is_idempotent() {
        let clock = MockClock::new(dac_limits());
        let pins = MockPinMux::new();
        let mut first = attr(44_100, &[(0, 18)]);
        let mut second = first;

        let a = configure(&mut first, &clock, &pins, Peripheral::Pwm).unwrap();
        let b = configure(&mut second, &clock, &pins, Peripheral::Pwm).unwrap();

        assert_eq!(a, b);
        assert_eq!(first, second);
        assert_eq!(clock.divisor(), Some(a.divisor));
        assert_eq!(pins.claimed().len(), 1);
    }
}
